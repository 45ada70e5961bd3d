//! Incremental construction of the viewpoint graph.
//!
//! Candidate poses are screened (region, obstacles, clearance, camera),
//! scored with a stateless raycast and inserted. New nodes are connected to
//! their nearest neighbours through motions that pass [`MotionValidator`].
//! A node without any feasible connection stays as an isolated vertex.

use std::sync::Arc;

use glam::DVec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{MotionValidator, NodeIndex, ViewpointGraph};
use crate::camera::{PinholeCamera, PixelRect, Pose};
use crate::control::{Checkpoint, Unattended};
use crate::error::{PlannerError, Result};
use crate::information::{CoverageState, InformationAggregator, ViewpointInformation};
use crate::octree::{DAabb3, OccupancyVolume};
use crate::raycast::{RaycastConfig, RaycastMode, Raycaster};
use crate::viewpoint::Viewpoint;

/// Graph construction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
  /// Viewpoints outside these bounds are rejected. Unbounded when None.
  pub region_of_interest: Option<DAabb3>,
  /// Point sampled viewpoints look at. Defaults to the volume center.
  pub look_target: Option<DVec3>,
  /// Random offset (world units, per axis) applied to the look target.
  pub look_jitter: f64,
  /// Free space required around viewpoints and along motions.
  pub clearance: f64,
  /// Viewpoints scoring below this are rejected.
  pub min_information: f64,
  /// Connection attempts per new node.
  pub neighbor_count: usize,
  pub max_edge_length: f64,
  /// Radians.
  pub max_turn_angle: f64,
  /// Maximum rise over horizontal run when moving upwards.
  pub max_ascent_slope: Option<f64>,
  /// Motion cost weight per unit length.
  pub alpha: f64,
  /// Motion cost weight per radian of rotation.
  pub beta: f64,
  pub scoring_mode: RaycastMode,
}

impl GraphConfig {
  pub fn with_region_of_interest(mut self, region: DAabb3) -> Self {
    self.region_of_interest = Some(region);
    self
  }

  pub fn with_look_target(mut self, target: DVec3) -> Self {
    self.look_target = Some(target);
    self
  }

  pub fn with_clearance(mut self, clearance: f64) -> Self {
    self.clearance = clearance;
    self
  }

  pub fn with_min_information(mut self, min_information: f64) -> Self {
    self.min_information = min_information;
    self
  }

  pub fn with_max_edge_length(mut self, max_edge_length: f64) -> Self {
    self.max_edge_length = max_edge_length;
    self
  }

  pub fn with_max_ascent_slope(mut self, slope: f64) -> Self {
    self.max_ascent_slope = Some(slope);
    self
  }

  pub fn with_cost_weights(mut self, alpha: f64, beta: f64) -> Self {
    self.alpha = alpha;
    self.beta = beta;
    self
  }
}

impl Default for GraphConfig {
  fn default() -> Self {
    Self {
      region_of_interest: None,
      look_target: None,
      look_jitter: 0.5,
      clearance: 0.25,
      min_information: 0.0,
      neighbor_count: 8,
      max_edge_length: 5.0,
      max_turn_angle: std::f64::consts::PI,
      max_ascent_slope: None,
      alpha: 1.0,
      beta: 0.5,
      scoring_mode: RaycastMode::Default,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
  OutsideRegion,
  InsideObstacle,
  InsufficientClearance,
  DegenerateCamera,
  InsufficientInformation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AddOutcome {
  Accepted { index: NodeIndex, information: f64 },
  Rejected(RejectReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RejectionCounts {
  pub outside_region: usize,
  pub inside_obstacle: usize,
  pub insufficient_clearance: usize,
  pub degenerate_camera: usize,
  pub insufficient_information: usize,
}

impl RejectionCounts {
  pub fn record(&mut self, reason: RejectReason) {
    let slot = match reason {
      RejectReason::OutsideRegion => &mut self.outside_region,
      RejectReason::InsideObstacle => &mut self.inside_obstacle,
      RejectReason::InsufficientClearance => &mut self.insufficient_clearance,
      RejectReason::DegenerateCamera => &mut self.degenerate_camera,
      RejectReason::InsufficientInformation => &mut self.insufficient_information,
    };
    *slot += 1;
  }

  pub fn total(&self) -> usize {
    self.outside_region
      + self.inside_obstacle
      + self.insufficient_clearance
      + self.degenerate_camera
      + self.insufficient_information
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectStats {
  pub candidates: usize,
  pub edges_added: usize,
  pub already_connected: usize,
  pub infeasible: usize,
  pub interrupted: bool,
}

impl ConnectStats {
  fn merge(&mut self, other: &ConnectStats) {
    self.candidates += other.candidates;
    self.edges_added += other.edges_added;
    self.already_connected += other.already_connected;
    self.infeasible += other.infeasible;
    self.interrupted |= other.interrupted;
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GrowStats {
  pub sampled: usize,
  pub accepted: usize,
  pub rejected: RejectionCounts,
  pub connections: ConnectStats,
  /// Accepted nodes left without any edge.
  pub isolated: usize,
  pub interrupted: bool,
}

pub struct GraphBuilder<'a, V: ?Sized> {
  volume: &'a V,
  config: &'a GraphConfig,
  raycast: &'a RaycastConfig,
  camera: &'a Arc<PinholeCamera>,
}

impl<'a, V: OccupancyVolume + ?Sized> GraphBuilder<'a, V> {
  pub fn new(
    volume: &'a V,
    config: &'a GraphConfig,
    raycast: &'a RaycastConfig,
    camera: &'a Arc<PinholeCamera>,
  ) -> Self {
    Self {
      volume,
      config,
      raycast,
      camera,
    }
  }

  pub fn validator(&self) -> MotionValidator<'a, V> {
    MotionValidator::new(self.volume, self.config)
  }

  /// Stateless information score of the full frame at `pose`.
  pub fn evaluate(&self, pose: &Pose) -> ViewpointInformation {
    let camera: &PinholeCamera = self.camera;
    let output = Raycaster::new(self.volume, self.raycast)
      .cast(
        pose,
        camera,
        &PixelRect::full(camera),
        self.config.scoring_mode,
        &Unattended,
      )
      .unwrap_or_default();
    InformationAggregator::new(self.config.scoring_mode).evaluate(&output.hits, &CoverageState::new())
  }

  /// Why `pose` cannot become a viewpoint, if anything.
  pub fn screen(&self, pose: &Pose) -> Option<RejectReason> {
    if !self.camera.is_valid() {
      return Some(RejectReason::DegenerateCamera);
    }
    if let Some(region) = &self.config.region_of_interest {
      if !region.contains_point(pose.position) {
        return Some(RejectReason::OutsideRegion);
      }
    }
    if let Some((_, cell)) = self.volume.leaf_at(pose.position) {
      if self.volume.blocks_ray(&cell) {
        return Some(RejectReason::InsideObstacle);
      }
    }
    if self.config.clearance > 0.0 {
      let region = DAabb3::from_center_half_extents(pose.position, DVec3::splat(self.config.clearance));
      if !self.volume.is_region_free(&region) {
        return Some(RejectReason::InsufficientClearance);
      }
    }
    None
  }

  /// Screen, score and insert a pose. Does not connect it.
  pub fn add_viewpoint(&self, graph: &mut ViewpointGraph, pose: Pose) -> AddOutcome {
    if let Some(reason) = self.screen(&pose) {
      return AddOutcome::Rejected(reason);
    }
    let information = self.evaluate(&pose);
    if information.total < self.config.min_information {
      return AddOutcome::Rejected(RejectReason::InsufficientInformation);
    }
    let total = information.total;
    let index = graph.add_node(Viewpoint::new(pose, Arc::clone(self.camera)), information);
    AddOutcome::Accepted {
      index,
      information: total,
    }
  }

  /// Try edges from `index` to its nearest neighbours.
  pub fn connect(&self, graph: &mut ViewpointGraph, index: NodeIndex) -> Result<ConnectStats> {
    let pose = *graph.try_node(index)?.pose();
    let validator = self.validator();
    let neighbors = graph.nearest_neighbors(
      pose.position,
      self.config.neighbor_count,
      self.config.max_edge_length,
      Some(index),
    );

    let mut stats = ConnectStats::default();
    for (other, _) in neighbors {
      stats.candidates += 1;
      if graph.has_edge(index, other) {
        stats.already_connected += 1;
        continue;
      }
      let other_pose = *graph.try_node(other)?.pose();
      let forward = validator.check(&pose, &other_pose);
      let backward = validator.check(&other_pose, &pose);
      if !forward.is_feasible() && !backward.is_feasible() {
        stats.infeasible += 1;
        continue;
      }
      let cost = validator.cost(&pose, &other_pose);
      if graph.add_edge(index, other, cost, forward.is_feasible(), backward.is_feasible())? {
        stats.edges_added += 1;
      }
    }
    Ok(stats)
  }

  /// Connect every node (BuildMotions). Existing edges are kept.
  #[tracing::instrument(skip_all, name = "graph::connect_all")]
  pub fn connect_all(&self, graph: &mut ViewpointGraph, checkpoint: &dyn Checkpoint) -> Result<ConnectStats> {
    if graph.is_empty() {
      return Err(PlannerError::EmptyGraph);
    }
    let indices: Vec<NodeIndex> = graph.node_indices().collect();
    let mut stats = ConnectStats::default();
    for index in indices {
      if checkpoint.checkpoint().is_err() {
        stats.interrupted = true;
        break;
      }
      let node_stats = self.connect(graph, index)?;
      stats.merge(&node_stats);
    }
    info!(
      edges_added = stats.edges_added,
      infeasible = stats.infeasible,
      interrupted = stats.interrupted,
      "motions built"
    );
    Ok(stats)
  }

  /// Sample `count` poses inside `region` (seeded), looking towards the
  /// look target, then add and connect each.
  #[tracing::instrument(skip_all, name = "graph::grow", fields(count = count, seed = seed))]
  pub fn grow(
    &self,
    graph: &mut ViewpointGraph,
    count: usize,
    region: &DAabb3,
    seed: u64,
    checkpoint: &dyn Checkpoint,
  ) -> Result<GrowStats> {
    let bounds = self.volume.bounds().ok_or(PlannerError::EmptyVolume)?;
    let target = self.config.look_target.unwrap_or_else(|| bounds.center());
    let jitter = self.config.look_jitter;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut stats = GrowStats::default();
    for _ in 0..count {
      if checkpoint.checkpoint().is_err() {
        stats.interrupted = true;
        break;
      }

      let unit = DVec3::new(rng.random(), rng.random(), rng.random());
      let position = region.min + region.size() * unit;
      let offset = DVec3::new(
        rng.random_range(-1.0..=1.0),
        rng.random_range(-1.0..=1.0),
        rng.random_range(-1.0..=1.0),
      ) * jitter;
      let pose = Pose::look_at(position, target + offset, DVec3::Z);
      stats.sampled += 1;

      match self.add_viewpoint(graph, pose) {
        AddOutcome::Accepted { index, information } => {
          stats.accepted += 1;
          let connections = self.connect(graph, index)?;
          stats.connections.merge(&connections);
          if graph.node(index).is_some_and(|node| node.degree() == 0) {
            stats.isolated += 1;
          }
          debug!(index, information, edges = connections.edges_added, "viewpoint accepted");
        }
        AddOutcome::Rejected(reason) => {
          stats.rejected.record(reason);
          debug!(?reason, "viewpoint rejected");
        }
      }
    }

    info!(
      sampled = stats.sampled,
      accepted = stats.accepted,
      rejected = stats.rejected.total(),
      isolated = stats.isolated,
      graph_size = graph.len(),
      "graph grown"
    );
    Ok(stats)
  }
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod builder_test;
