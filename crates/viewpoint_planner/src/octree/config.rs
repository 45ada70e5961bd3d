//! OccupancyConfig - world coordinate mapping for volume cells.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{DAabb3, VoxelKey};

/// Coordinate mapping and classification thresholds for an occupancy volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyConfig {
  /// Edge length of an LOD 0 cell in world units.
  pub resolution: f64,

  /// World-space position of the minimum corner of cell (0, 0, 0).
  pub origin: DVec3,

  /// Coarsest LOD level a cell may be stored at.
  pub max_lod: i32,

  /// A cell is occupied iff its occupancy is at least this value.
  pub occupancy_threshold: f32,
}

impl OccupancyConfig {
  pub fn with_resolution(mut self, resolution: f64) -> Self {
    self.resolution = resolution;
    self
  }

  pub fn with_origin(mut self, origin: DVec3) -> Self {
    self.origin = origin;
    self
  }

  pub fn with_max_lod(mut self, max_lod: i32) -> Self {
    self.max_lod = max_lod;
    self
  }

  pub fn with_occupancy_threshold(mut self, threshold: f32) -> Self {
    self.occupancy_threshold = threshold;
    self
  }

  /// Calculate cell size at given LOD.
  /// cell_size = resolution * 2^LOD
  #[inline]
  pub fn get_cell_size(&self, lod: i32) -> f64 {
    self.resolution * (1u64 << lod.clamp(0, 62)) as f64
  }

  /// Get world-space minimum corner of a cell.
  #[inline]
  pub fn get_cell_min(&self, key: &VoxelKey) -> DVec3 {
    let cell_size = self.get_cell_size(key.lod);
    self.origin + DVec3::new(key.x as f64, key.y as f64, key.z as f64) * cell_size
  }

  /// Get world-space center of a cell.
  #[inline]
  pub fn get_cell_center(&self, key: &VoxelKey) -> DVec3 {
    let cell_size = self.get_cell_size(key.lod);
    self.get_cell_min(key) + DVec3::splat(cell_size * 0.5)
  }

  #[inline]
  pub fn get_cell_bounds(&self, key: &VoxelKey) -> DAabb3 {
    let min = self.get_cell_min(key);
    DAabb3::new(min, min + DVec3::splat(self.get_cell_size(key.lod)))
  }

  /// Key of the cell at `lod` containing `point`. Points on a shared face
  /// belong to the cell on the positive side.
  #[inline]
  pub fn key_at(&self, point: DVec3, lod: i32) -> VoxelKey {
    let grid = ((point - self.origin) / self.get_cell_size(lod)).floor();
    VoxelKey::new(grid.x as i32, grid.y as i32, grid.z as i32, lod)
  }
}

impl Default for OccupancyConfig {
  fn default() -> Self {
    Self {
      resolution: 0.2,
      origin: DVec3::ZERO,
      max_lod: 16,
      occupancy_threshold: 0.7,
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
