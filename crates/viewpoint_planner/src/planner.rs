//! ViewpointPlanner - session state and the synchronous planning operations.
//!
//! Holds the shared read-only volume, the viewpoint graph, the current path
//! with its coverage state, and the results of the last raycast, surface
//! dump and pose match. Every long operation takes a [`Checkpoint`]; the
//! worker passes its pause/cancel hook, synchronous callers pass
//! [`Unattended`](crate::control::Unattended).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span};

use crate::camera::{PinholeCamera, PixelRect, Pose};
use crate::control::Checkpoint;
use crate::error::{PlannerError, Result};
use crate::graph::{ConnectStats, GraphBuilder, GraphConfig, GrowStats, NodeIndex, RejectionCounts, ViewpointGraph};
use crate::information::{CoverageState, InformationAggregator, ViewpointInformation};
use crate::octree::{DAabb3, OccupancyVolume};
use crate::path::{
  make_sparse_matchable, MatchableStats, MotionTable, PathConfig, PathOptimizer, PathRequest, PathResult,
  ViewpointPath,
};
use crate::persistence::{self, ColmapExport};
use crate::raycast::{PixelHit, RaycastConfig, RaycastMode, Raycaster, SurfaceDump};
use crate::viewpoint::Viewpoint;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
  pub camera: PinholeCamera,
  pub raycast: RaycastConfig,
  pub graph: GraphConfig,
  pub path: PathConfig,
}

impl PlannerConfig {
  pub fn with_camera(mut self, camera: PinholeCamera) -> Self {
    self.camera = camera;
    self
  }

  pub fn with_raycast(mut self, raycast: RaycastConfig) -> Self {
    self.raycast = raycast;
    self
  }

  pub fn with_graph(mut self, graph: GraphConfig) -> Self {
    self.graph = graph;
    self
  }

  pub fn with_path(mut self, path: PathConfig) -> Self {
    self.path = path;
    self
  }
}

/// Result of an explicit raycast request.
#[derive(Clone, Debug, PartialEq)]
pub struct RaycastResult {
  pub viewpoint: Viewpoint,
  pub rect: PixelRect,
  pub mode: RaycastMode,
  pub hits: Vec<PixelHit>,
  pub rays_cast: usize,
  pub information: ViewpointInformation,
}

/// Comparison of what two poses see.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseMatch {
  pub shared_voxels: usize,
  /// Jaccard overlap of the visible voxel sets.
  pub overlap: f64,
  pub information: [f64; 2],
  pub distance: f64,
  pub angle: f64,
  /// Second pose in the camera frame of the first.
  pub relative: Pose,
}

/// Counters accumulated over the session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlannerStats {
  pub grow_runs: usize,
  pub sampled: usize,
  pub rejected: RejectionCounts,
  pub isolated: usize,
  pub last_grow: Option<GrowStats>,
  pub last_connect: Option<ConnectStats>,
  pub last_matchable: Option<MatchableStats>,
}

/// Which part of the session state a reset clears.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetScope {
  /// Graph, path and coverage.
  Graph,
  /// Path and coverage only.
  Path,
}

/// Path export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
  Text,
  Json,
  /// Writes a directory with the three COLMAP model files.
  Colmap,
}

pub struct ViewpointPlanner<V: OccupancyVolume + ?Sized> {
  volume: Arc<V>,
  config: PlannerConfig,
  camera: Arc<PinholeCamera>,
  graph: ViewpointGraph,
  path: ViewpointPath,
  coverage: CoverageState,
  last_raycast: Option<RaycastResult>,
  last_surface: Option<SurfaceDump>,
  last_match: Option<PoseMatch>,
  stats: PlannerStats,
}

impl<V: OccupancyVolume + ?Sized> ViewpointPlanner<V> {
  pub fn new(volume: Arc<V>, config: PlannerConfig) -> Result<Self> {
    config.camera.validate()?;
    let camera = Arc::new(config.camera);
    Ok(Self {
      volume,
      config,
      camera,
      graph: ViewpointGraph::new(),
      path: ViewpointPath::new(),
      coverage: CoverageState::new(),
      last_raycast: None,
      last_surface: None,
      last_match: None,
      stats: PlannerStats::default(),
    })
  }

  pub fn volume(&self) -> &Arc<V> {
    &self.volume
  }

  pub fn config(&self) -> &PlannerConfig {
    &self.config
  }

  /// Replace the configuration. Existing viewpoints keep their camera.
  pub fn set_config(&mut self, config: PlannerConfig) -> Result<()> {
    config.camera.validate()?;
    if config.camera != *self.camera {
      self.camera = Arc::new(config.camera);
    }
    self.config = config;
    Ok(())
  }

  pub fn camera(&self) -> &Arc<PinholeCamera> {
    &self.camera
  }

  pub fn graph(&self) -> &ViewpointGraph {
    &self.graph
  }

  pub fn path(&self) -> &ViewpointPath {
    &self.path
  }

  pub fn coverage(&self) -> &CoverageState {
    &self.coverage
  }

  pub fn last_raycast(&self) -> Option<&RaycastResult> {
    self.last_raycast.as_ref()
  }

  pub fn last_surface(&self) -> Option<&SurfaceDump> {
    self.last_surface.as_ref()
  }

  pub fn last_match(&self) -> Option<&PoseMatch> {
    self.last_match.as_ref()
  }

  pub fn stats(&self) -> &PlannerStats {
    &self.stats
  }

  /// Copy for running an operation outside the lock. The volume is shared.
  pub fn snapshot(&self) -> Self {
    Self {
      volume: Arc::clone(&self.volume),
      config: self.config.clone(),
      camera: Arc::clone(&self.camera),
      graph: self.graph.clone(),
      path: self.path.clone(),
      coverage: self.coverage.clone(),
      last_raycast: self.last_raycast.clone(),
      last_surface: self.last_surface.clone(),
      last_match: self.last_match.clone(),
      stats: self.stats.clone(),
    }
  }

  /// Take over the results of `working`. Configuration set in the meantime
  /// is kept.
  pub fn publish(&mut self, working: Self) {
    self.graph = working.graph;
    self.path = working.path;
    self.coverage = working.coverage;
    self.last_raycast = working.last_raycast;
    self.last_surface = working.last_surface;
    self.last_match = working.last_match;
    self.stats = working.stats;
  }

  fn builder(&self) -> GraphBuilder<'_, V> {
    GraphBuilder::new(&*self.volume, &self.config.graph, &self.config.raycast, &self.camera)
  }

  /// Volume queries need at least one cell to look at.
  fn require_volume(&self) -> Result<()> {
    if self.volume.is_empty() {
      return Err(PlannerError::EmptyVolume);
    }
    Ok(())
  }

  /// Sampling region: the explicit one, else the configured region of
  /// interest, else the volume bounds grown by one edge length.
  fn sampling_region(&self, region: Option<DAabb3>) -> Result<DAabb3> {
    if let Some(region) = region.or(self.config.graph.region_of_interest) {
      return Ok(region);
    }
    let bounds = self.volume.bounds().ok_or(PlannerError::EmptyVolume)?;
    Ok(bounds.expanded(self.config.graph.max_edge_length))
  }

  pub fn grow_graph(
    &mut self,
    count: usize,
    region: Option<DAabb3>,
    seed: u64,
    checkpoint: &dyn Checkpoint,
  ) -> Result<GrowStats> {
    self.require_volume()?;
    let region = self.sampling_region(region)?;
    let mut graph = std::mem::take(&mut self.graph);
    let result = self.builder().grow(&mut graph, count, &region, seed, checkpoint);
    self.graph = graph;
    let stats = result?;

    self.stats.grow_runs += 1;
    self.stats.sampled += stats.sampled;
    self.stats.isolated += stats.isolated;
    let rejected = &mut self.stats.rejected;
    rejected.outside_region += stats.rejected.outside_region;
    rejected.inside_obstacle += stats.rejected.inside_obstacle;
    rejected.insufficient_clearance += stats.rejected.insufficient_clearance;
    rejected.degenerate_camera += stats.rejected.degenerate_camera;
    rejected.insufficient_information += stats.rejected.insufficient_information;
    self.stats.last_grow = Some(stats);
    Ok(stats)
  }

  pub fn build_motions(&mut self, checkpoint: &dyn Checkpoint) -> Result<ConnectStats> {
    let mut graph = std::mem::take(&mut self.graph);
    let result = self.builder().connect_all(&mut graph, checkpoint);
    self.graph = graph;
    let stats = result?;
    self.stats.last_connect = Some(stats);
    Ok(stats)
  }

  /// Build a new path. The previous path and its coverage are discarded.
  pub fn build_path(&mut self, request: &PathRequest, checkpoint: &dyn Checkpoint) -> Result<PathResult> {
    let mut coverage = CoverageState::new();
    let result = PathOptimizer::new(&self.graph, &self.config.path).build_path(request, &mut coverage, checkpoint)?;
    self.path = result.path.clone();
    self.coverage = coverage;
    Ok(result)
  }

  pub fn solve_tsp(&mut self, checkpoint: &dyn Checkpoint) -> Result<PathResult> {
    let mut coverage = self.coverage.clone();
    let result =
      PathOptimizer::new(&self.graph, &self.config.path).solve_tsp(&self.path, &mut coverage, checkpoint)?;
    self.path = result.path.clone();
    self.coverage = coverage;
    Ok(result)
  }

  pub fn make_sparse_matchable(&mut self, checkpoint: &dyn Checkpoint) -> Result<MatchableStats> {
    let stats = make_sparse_matchable(&self.graph, &mut self.path, &self.config.path, checkpoint);
    for node in self.path.nodes().filter_map(|index| self.graph.node(index)) {
      self.coverage.claim(node.voxels());
    }
    self.stats.last_matchable = Some(stats);
    Ok(stats)
  }

  /// Raycast `viewpoint` inside `rect` (full frame when None). With
  /// [`RaycastMode::WithCurrentInformation`] the information is discounted
  /// by the current path coverage.
  pub fn raycast(
    &mut self,
    viewpoint: Viewpoint,
    rect: Option<PixelRect>,
    mode: RaycastMode,
    checkpoint: &dyn Checkpoint,
  ) -> Result<&RaycastResult> {
    self.require_volume()?;
    let camera = viewpoint.camera();
    camera.validate()?;
    let rect = rect.unwrap_or_else(|| PixelRect::full(camera));
    rect.validate(camera)?;

    let output = Raycaster::new(&*self.volume, &self.config.raycast).cast(
      viewpoint.pose(),
      camera,
      &rect,
      mode,
      checkpoint,
    )?;
    let information = InformationAggregator::new(mode).evaluate(&output.hits, &self.coverage);
    Ok(self.last_raycast.insert(RaycastResult {
      viewpoint,
      rect,
      mode,
      hits: output.hits,
      rays_cast: output.rays_cast,
      information,
    }))
  }

  /// Visible surface from `pose` with the planner camera.
  pub fn dump_mesh(&mut self, pose: Pose, checkpoint: &dyn Checkpoint) -> Result<&SurfaceDump> {
    self.require_volume()?;
    let output = Raycaster::new(&*self.volume, &self.config.raycast).cast(
      &pose,
      &self.camera,
      &PixelRect::full(&self.camera),
      RaycastMode::Default,
      checkpoint,
    )?;
    Ok(self.last_surface.insert(SurfaceDump::from_hits(pose, &output.hits)))
  }

  pub fn match_poses(&mut self, first: Pose, second: Pose, checkpoint: &dyn Checkpoint) -> Result<&PoseMatch> {
    let _span = info_span!("planner::match_poses").entered();
    self.require_volume()?;
    let [a, b] = [first, second].map(|pose| self.visible_information(&pose, checkpoint));
    let (a, b) = (a?, b?);
    Ok(self.last_match.insert(PoseMatch {
      shared_voxels: a.voxels.shared_count(&b.voxels),
      overlap: a.voxels.overlap_ratio(&b.voxels),
      information: [a.total, b.total],
      distance: first.distance_to(&second),
      angle: first.angle_to(&second),
      relative: first.relative_to(&second),
    }))
  }

  fn visible_information(&self, pose: &Pose, checkpoint: &dyn Checkpoint) -> Result<ViewpointInformation> {
    let output = Raycaster::new(&*self.volume, &self.config.raycast).cast(
      pose,
      &self.camera,
      &PixelRect::full(&self.camera),
      RaycastMode::Default,
      checkpoint,
    )?;
    Ok(InformationAggregator::new(RaycastMode::Default).evaluate(&output.hits, &CoverageState::new()))
  }

  pub fn reset(&mut self, scope: ResetScope) {
    if scope == ResetScope::Graph {
      self.graph.clear();
    }
    self.path = ViewpointPath::new();
    self.coverage.clear();
    info!(?scope, "planner reset");
  }

  /// Remove a viewpoint and drop it from the path.
  pub fn remove_viewpoint(&mut self, index: NodeIndex) -> Result<()> {
    self.graph.remove_node(index)?;
    if self.path.contains(index) {
      for branch in &mut self.path.branches {
        let nodes: Vec<NodeIndex> = branch.nodes().iter().copied().filter(|node| *node != index).collect();
        branch.set_nodes(nodes);
      }
      self.refresh_path();
    }
    Ok(())
  }

  /// Renumber the graph densely and rewrite the path to match.
  pub fn compact_graph(&mut self) -> Vec<Option<NodeIndex>> {
    let mapping = self.graph.compact();
    for branch in &mut self.path.branches {
      let nodes = branch
        .nodes()
        .iter()
        .filter_map(|node| mapping.get(*node).copied().flatten())
        .collect();
      branch.set_nodes(nodes);
    }
    self.refresh_path();
    mapping
  }

  fn refresh_path(&mut self) {
    let nodes: Vec<NodeIndex> = self.path.nodes().collect();
    let motions = MotionTable::build(&self.graph, &nodes);
    self.path.refresh(&self.graph, &motions);
  }

  pub fn save_graph(&self, file: &Path) -> Result<()> {
    persistence::save_graph_file(&self.graph, file)
  }

  /// Replace the graph. The path is cleared since its indices may not match.
  pub fn load_graph(&mut self, file: &Path) -> Result<()> {
    self.graph = persistence::load_graph_file(file)?;
    self.reset(ResetScope::Path);
    Ok(())
  }

  pub fn save_path(&self, file: &Path) -> Result<()> {
    persistence::save_path_file(&self.path, file)
  }

  /// Load a path for the current graph and claim its coverage.
  pub fn load_path(&mut self, file: &Path) -> Result<()> {
    self.path = persistence::load_path_file(file, &self.graph)?;
    self.refresh_path();
    self.coverage.clear();
    for node in self.path.nodes().filter_map(|index| self.graph.node(index)) {
      self.coverage.claim(node.voxels());
    }
    Ok(())
  }

  pub fn export_path(&self, format: ExportFormat, target: &Path) -> Result<()> {
    match format {
      ExportFormat::Text | ExportFormat::Json => {
        let mut writer = BufWriter::new(File::create(target)?);
        if format == ExportFormat::Text {
          persistence::export_path_text(&self.graph, &self.path, &mut writer)?;
        } else {
          persistence::export_path_json(&self.graph, &self.path, &mut writer)?;
        }
        writer.flush()?;
      }
      ExportFormat::Colmap => ColmapExport::from_path(&self.graph, &self.path)?.save(target)?,
    }
    info!(?format, path = %target.display(), stops = self.path.node_count(), "path exported");
    Ok(())
  }
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod planner_test;
