//! Viewpoint graph: candidate camera poses connected by feasible motions.
//!
//! - [`ViewpointGraph`] - node/edge storage with stable indices
//! - [`Components`] - cached connected components
//! - [`MotionValidator`] - straight-line motion feasibility and cost
//! - [`GraphBuilder`] - screening, scoring, sampling and connecting

mod builder;
mod components;
mod motion;
mod viewpoint_graph;

pub use builder::{
  AddOutcome, ConnectStats, GraphBuilder, GraphConfig, GrowStats, RejectReason, RejectionCounts,
};
pub use components::Components;
pub use motion::{MotionCheck, MotionValidator};
pub use viewpoint_graph::{NodeIndex, ViewpointEdge, ViewpointGraph, ViewpointNode};
