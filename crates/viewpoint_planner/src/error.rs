//! Error taxonomy for planner operations.
//!
//! Infeasible inputs (a pose inside an obstacle, a motion that collides) are
//! reported as outcome values, not errors. `PlannerError` covers precondition
//! violations, persistence failures and misuse of the worker queue.

use thiserror::Error;

use crate::control::Interrupted;

#[derive(Debug, Error)]
pub enum PlannerError {
  #[error("occupancy volume is empty")]
  EmptyVolume,

  #[error("viewpoint graph is empty")]
  EmptyGraph,

  #[error("no viewpoint at index {0}")]
  UnknownNode(usize),

  #[error("viewpoint index {0} is already in use")]
  DuplicateNode(usize),

  #[error("no connected component {0}")]
  UnknownComponent(usize),

  #[error("invalid camera: {0}")]
  InvalidCamera(String),

  #[error("pixel rectangle x [{x_start}, {x_end}) y [{y_start}, {y_end}) does not fit a {width}x{height} image")]
  InvalidPixelRect {
    x_start: u32,
    x_end: u32,
    y_start: u32,
    y_end: u32,
    width: u32,
    height: u32,
  },

  #[error("unsupported {kind} file version {found} (expected {expected})")]
  UnsupportedVersion {
    kind: &'static str,
    found: u32,
    expected: u32,
  },

  #[error("request queue is full")]
  QueueFull,

  #[error("planner worker has shut down")]
  WorkerShutdown,

  #[error("custom request was dropped before it produced a value")]
  CustomRequestDropped,

  #[error(transparent)]
  Interrupted(#[from] Interrupted),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = PlannerError> = std::result::Result<T, E>;
