//! viewpoint_planner - Viewpoint planning for 3D reconstruction capture
//!
//! Given a volumetric occupancy model of a scene, this crate samples camera
//! viewpoints, estimates how much new information each one would observe by
//! raycasting the volume, links viewpoints through collision-free motions and
//! selects an ordered, budget-limited path that maximizes the information
//! gathered.
//!
//! # Features
//!
//! - **Raycasting**: pixel-grid frustum sampling against a sparse octree with
//!   unknown space treated as an obstacle
//! - **Viewpoint graph**: seeded sampling, feasibility screening and
//!   k-nearest-neighbour motion edges
//! - **Path optimization**: greedy insertion under cost/node budgets with
//!   2-opt and exchange refinement, multi-branch paths, TSP re-ordering
//! - **Planner worker**: one background thread with a bounded request queue,
//!   cooperative pause/resume/cancel and completion notifications
//! - **Persistence**: versioned JSON graph/path files, pose list and COLMAP
//!   exports
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use viewpoint_planner::{OccupancyMap, PlannerConfig, PlannerWorker, Request, ViewpointPlanner};
//!
//! let volume = Arc::new(OccupancyMap::load(Path::new("scene.json"))?);
//! let planner = ViewpointPlanner::new(volume, PlannerConfig::default())?;
//! let worker = PlannerWorker::spawn(planner)?;
//!
//! worker.submit(Request::GrowGraph { count: 500, region: None, seed: 7 })?;
//! worker.submit(Request::BuildMotions)?;
//! worker.submit(Request::BuildPath(Default::default()))?;
//! ```

pub mod camera;
pub mod control;
pub mod error;
pub mod graph;
pub mod information;
pub mod metrics;
pub mod octree;
pub mod path;
pub mod persistence;
pub mod planner;
pub mod raycast;
pub mod viewpoint;
pub mod worker;

#[cfg(test)]
mod test_utils;

// Re-export commonly used items
pub use camera::{PinholeCamera, PixelRect, Pose};
pub use control::{Checkpoint, Interrupted, Unattended};
pub use error::{PlannerError, Result};
pub use graph::{GraphBuilder, GraphConfig, NodeIndex, ViewpointGraph};
pub use information::{CoverageState, VoxelWithInformationSet};
pub use octree::{DAabb3, OccupancyConfig, OccupancyMap, OccupancyVolume, VoxelKey};
pub use path::{PathBudget, PathConfig, PathRequest, PathResult, ViewpointPath};
pub use planner::{ExportFormat, PlannerConfig, ResetScope, ViewpointPlanner};
pub use raycast::{RaycastConfig, RaycastMode};
pub use viewpoint::Viewpoint;
pub use worker::{Completion, OperationKind, Outcome, PlannerWorker, Request, RequestId, WorkerConfig, WorkerState};
