//! Read-only volume contract consumed by the planner.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{DAabb3, OccupancyConfig, VoxelKey};
use crate::information::information_weight;
use crate::raycast::{self, RayHit};

/// Per-cell occupancy data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelCell {
  /// Occupancy probability in [0, 1].
  pub occupancy: f32,
  pub observation_count: u32,
  /// Information weight (>= 0) credited to a viewpoint that sees this cell.
  pub weight: f32,
}

impl VoxelCell {
  /// Cell with a weight derived from occupancy and observation count.
  pub fn new(occupancy: f32, observation_count: u32) -> Self {
    let occupancy = occupancy.clamp(0.0, 1.0);
    Self {
      occupancy,
      observation_count,
      weight: information_weight(occupancy, observation_count),
    }
  }

  pub fn with_weight(mut self, weight: f32) -> Self {
    self.weight = weight.max(0.0);
    self
  }

  /// Never observed. Blocks rays.
  pub fn unknown() -> Self {
    Self::new(0.5, 0)
  }

  pub fn occupied(observation_count: u32) -> Self {
    Self::new(0.9, observation_count)
  }

  pub fn free(observation_count: u32) -> Self {
    Self::new(0.1, observation_count)
  }

  #[inline]
  pub fn is_unknown(&self) -> bool {
    self.observation_count == 0
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellState {
  Free,
  Occupied,
  Unknown,
}

/// Sparse hierarchical occupancy grid, shared read-only across threads.
///
/// Cells absent from the volume are empty space. Stored cells never overlap:
/// at most one stored key contains any given point.
pub trait OccupancyVolume: Send + Sync {
  fn config(&self) -> &OccupancyConfig;

  /// Metric bounds of all stored cells, None when empty.
  fn bounds(&self) -> Option<DAabb3>;

  /// Cell stored under exactly this key.
  fn cell(&self, key: &VoxelKey) -> Option<VoxelCell>;

  /// Stored cell containing `key`: the key itself or its nearest stored
  /// ancestor.
  fn leaf_containing(&self, key: &VoxelKey) -> Option<(VoxelKey, VoxelCell)>;

  fn cell_count(&self) -> usize;

  /// Visit every stored cell. Order is unspecified.
  fn for_each_cell(&self, visit: &mut dyn FnMut(&VoxelKey, &VoxelCell));

  fn is_empty(&self) -> bool {
    self.cell_count() == 0
  }

  fn classify(&self, cell: &VoxelCell) -> CellState {
    if cell.is_unknown() {
      CellState::Unknown
    } else if cell.occupancy >= self.config().occupancy_threshold {
      CellState::Occupied
    } else {
      CellState::Free
    }
  }

  /// Occupied and unknown cells stop rays.
  #[inline]
  fn blocks_ray(&self, cell: &VoxelCell) -> bool {
    self.classify(cell) != CellState::Free
  }

  #[inline]
  fn cell_bounds(&self, key: &VoxelKey) -> DAabb3 {
    self.config().get_cell_bounds(key)
  }

  /// Stored cell containing a world-space point.
  fn leaf_at(&self, point: DVec3) -> Option<(VoxelKey, VoxelCell)> {
    self.leaf_containing(&self.config().key_at(point, 0))
  }

  /// First occupied or unknown cell along the ray within `max_range`.
  fn cast_ray(&self, origin: DVec3, direction: DVec3, max_range: f64) -> Option<RayHit> {
    raycast::first_hit(self, origin, direction, max_range)
  }

  /// Every stored cell pierced by the ray within `max_range`, nearest first.
  fn cells_along_ray(&self, origin: DVec3, direction: DVec3, max_range: f64) -> Vec<RayHit> {
    let mut hits = Vec::new();
    raycast::traverse(self, origin, direction, max_range, |hit| {
      hits.push(hit);
      true
    });
    hits
  }

  /// True when no blocking cell intersects `region` (at LOD 0 granularity).
  fn is_region_free(&self, region: &DAabb3) -> bool {
    let config = self.config();
    let lo = config.key_at(region.min, 0);
    let hi = config.key_at(region.max, 0);
    for x in lo.x..=hi.x {
      for y in lo.y..=hi.y {
        for z in lo.z..=hi.z {
          if let Some((_, cell)) = self.leaf_containing(&VoxelKey::new(x, y, z, 0)) {
            if self.blocks_ray(&cell) {
              return false;
            }
          }
        }
      }
    }
    true
  }
}
