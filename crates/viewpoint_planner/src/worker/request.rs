//! Requests, completions and one-shot handles exchanged with the worker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::camera::{PixelRect, Pose};
use crate::error::{PlannerError, Result};
use crate::graph::{ConnectStats, GrowStats};
use crate::octree::{DAabb3, OccupancyVolume};
use crate::path::{MatchableStats, PathRequest, PathResult};
use crate::planner::{PoseMatch, ResetScope, ViewpointPlanner};
use crate::raycast::RaycastMode;
use crate::viewpoint::Viewpoint;

/// Unique identifier of a submitted request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
  pub(crate) fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    Self(COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  pub fn get(&self) -> u64 {
    self.0
  }
}

impl fmt::Display for RequestId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
  GrowGraph,
  BuildMotions,
  BuildPath,
  SolveTsp,
  Raycast,
  DumpMesh,
  MakeSparseMatchable,
  MatchPoses,
  Reset,
  CustomRequest,
}

/// Closure run on the worker with exclusive access to the planner.
pub type CustomWork<V> = Box<dyn FnOnce(&mut ViewpointPlanner<V>) + Send>;

/// One planning operation with its parameters.
pub enum Request<V: OccupancyVolume + ?Sized> {
  /// Sample `count` poses in `region` (configured region of interest or
  /// padded volume bounds when None).
  GrowGraph {
    count: usize,
    region: Option<DAabb3>,
    seed: u64,
  },
  BuildMotions,
  BuildPath(PathRequest),
  SolveTsp,
  Raycast {
    viewpoint: Viewpoint,
    rect: Option<PixelRect>,
    mode: RaycastMode,
  },
  DumpMesh {
    pose: Pose,
  },
  MakeSparseMatchable,
  MatchPoses {
    first: Pose,
    second: Pose,
  },
  Reset(ResetScope),
  Custom(CustomWork<V>),
}

impl<V: OccupancyVolume + ?Sized> Request<V> {
  pub fn kind(&self) -> OperationKind {
    match self {
      Request::GrowGraph { .. } => OperationKind::GrowGraph,
      Request::BuildMotions => OperationKind::BuildMotions,
      Request::BuildPath(_) => OperationKind::BuildPath,
      Request::SolveTsp => OperationKind::SolveTsp,
      Request::Raycast { .. } => OperationKind::Raycast,
      Request::DumpMesh { .. } => OperationKind::DumpMesh,
      Request::MakeSparseMatchable => OperationKind::MakeSparseMatchable,
      Request::MatchPoses { .. } => OperationKind::MatchPoses,
      Request::Reset(_) => OperationKind::Reset,
      Request::Custom(_) => OperationKind::CustomRequest,
    }
  }
}

impl<V: OccupancyVolume + ?Sized> fmt::Debug for Request<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Request::GrowGraph { count, region, seed } => f
        .debug_struct("GrowGraph")
        .field("count", count)
        .field("region", region)
        .field("seed", seed)
        .finish(),
      Request::BuildPath(request) => f.debug_tuple("BuildPath").field(request).finish(),
      Request::Raycast { rect, mode, .. } => f
        .debug_struct("Raycast")
        .field("rect", rect)
        .field("mode", mode)
        .finish_non_exhaustive(),
      Request::Reset(scope) => f.debug_tuple("Reset").field(scope).finish(),
      other => write!(f, "{:?}", other.kind()),
    }
  }
}

/// Per-operation result payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
  GraphGrown(GrowStats),
  MotionsBuilt(ConnectStats),
  PathBuilt(PathResult),
  TspSolved(PathResult),
  Raycast { hits: usize, information: f64 },
  MeshDumped { samples: usize },
  SparseMatchable(MatchableStats),
  PosesMatched(PoseMatch),
  Reset(ResetScope),
  Custom,
}

impl Outcome {
  /// The operation stopped early and kept its partial result.
  pub fn was_interrupted(&self) -> bool {
    match self {
      Outcome::GraphGrown(stats) => stats.interrupted,
      Outcome::MotionsBuilt(stats) => stats.interrupted,
      Outcome::PathBuilt(result) | Outcome::TspSolved(result) => result.interrupted,
      Outcome::SparseMatchable(stats) => stats.interrupted,
      _ => false,
    }
  }
}

/// Completion notification for one request.
#[derive(Debug)]
pub struct Completion {
  pub id: RequestId,
  pub kind: OperationKind,
  pub outcome: Result<Outcome>,
  pub elapsed_us: u64,
}

impl Completion {
  pub fn is_ok(&self) -> bool {
    self.outcome.is_ok()
  }

  /// Cancelled or shut down, whether the operation failed or kept a
  /// partial result.
  pub fn was_interrupted(&self) -> bool {
    match &self.outcome {
      Ok(outcome) => outcome.was_interrupted(),
      Err(err) => matches!(err, PlannerError::Interrupted(_)),
    }
  }
}

/// One-shot result of a custom request. Fulfilled at most once.
#[derive(Debug)]
pub struct CustomRequestHandle<T> {
  id: RequestId,
  receiver: Receiver<T>,
}

impl<T> CustomRequestHandle<T> {
  pub(crate) fn new(id: RequestId, receiver: Receiver<T>) -> Self {
    Self { id, receiver }
  }

  pub fn id(&self) -> RequestId {
    self.id
  }

  /// Block until the closure has run. Fails when the request was cancelled
  /// or the worker shut down before running it.
  pub fn wait(self) -> Result<T> {
    self.receiver.recv().map_err(|_| PlannerError::CustomRequestDropped)
  }

  /// Like [`wait`](Self::wait), giving the handle back on timeout.
  pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
    match self.receiver.recv_timeout(timeout) {
      Ok(value) => Ok(Ok(value)),
      Err(RecvTimeoutError::Disconnected) => Ok(Err(PlannerError::CustomRequestDropped)),
      Err(RecvTimeoutError::Timeout) => Err(self),
    }
  }
}
