//! Raycasting a camera frustum against the occupancy volume.
//!
//! Rays are sampled on a pixel grid (every `pixel_stride` pixels) inside a
//! rectangular window of the image. Each ray stops at the first occupied or
//! unknown cell, or at `max_range`. Rays that leave the volume without a hit
//! contribute nothing.
//!
//! Rows are processed in sweeps of `rows_per_sweep`. Rows inside a sweep run
//! in parallel on rayon; the checkpoint is polled between sweeps, never
//! inside the per-ray loop. Output is always row-major regardless of thread
//! scheduling.

pub mod dda;
pub mod surface;

use glam::{DVec2, DVec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::{PinholeCamera, PixelRect, Pose};
use crate::control::{Checkpoint, Interrupted};
use crate::octree::{OccupancyVolume, VoxelCell, VoxelKey};

pub use dda::{first_hit, traverse, RayHit};
pub use surface::{SurfaceDump, SurfaceSample};

/// Voxel-center rays are grouped into sweeps of this many rays per row.
const CENTER_RAYS_PER_ROW: usize = 64;

/// How visibility and cell value are decided for a raycast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaycastMode {
  /// Per-pixel rays, stored cell weight.
  #[default]
  Default,
  /// Per-pixel rays, weight discounted by the current coverage state.
  WithCurrentInformation,
  /// One ray per candidate cell, aimed at the cell center.
  InformationVoxelCenter,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaycastConfig {
  /// Rays stop after this distance in world units.
  pub max_range: f64,
  /// Sample every n-th pixel in both image directions.
  pub pixel_stride: u32,
  /// Rows per cancellable sweep.
  pub rows_per_sweep: usize,
}

impl RaycastConfig {
  pub fn with_max_range(mut self, max_range: f64) -> Self {
    self.max_range = max_range;
    self
  }

  pub fn with_pixel_stride(mut self, pixel_stride: u32) -> Self {
    self.pixel_stride = pixel_stride;
    self
  }

  pub fn with_rows_per_sweep(mut self, rows_per_sweep: usize) -> Self {
    self.rows_per_sweep = rows_per_sweep;
    self
  }
}

impl Default for RaycastConfig {
  fn default() -> Self {
    Self {
      max_range: 50.0,
      pixel_stride: 4,
      rows_per_sweep: 16,
    }
  }
}

/// A ray hit tagged with the pixel it was cast through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelHit {
  /// Pixel (x, y).
  pub pixel: [u32; 2],
  pub hit: RayHit,
}

impl PixelHit {
  #[inline]
  pub fn key(&self) -> VoxelKey {
    self.hit.key
  }

  #[inline]
  pub fn cell(&self) -> &VoxelCell {
    &self.hit.cell
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RaycastOutput {
  pub hits: Vec<PixelHit>,
  pub rays_cast: usize,
}

/// Stateless frustum raycaster over a borrowed volume.
pub struct Raycaster<'a, V: ?Sized> {
  volume: &'a V,
  config: &'a RaycastConfig,
}

impl<'a, V: OccupancyVolume + ?Sized> Raycaster<'a, V> {
  pub fn new(volume: &'a V, config: &'a RaycastConfig) -> Self {
    Self { volume, config }
  }

  pub fn config(&self) -> &RaycastConfig {
    self.config
  }

  /// Cast the frustum of `camera` at `pose` restricted to `rect`.
  #[tracing::instrument(skip_all, name = "raycast::cast", fields(mode = ?mode))]
  pub fn cast(
    &self,
    pose: &Pose,
    camera: &PinholeCamera,
    rect: &PixelRect,
    mode: RaycastMode,
    checkpoint: &dyn Checkpoint,
  ) -> Result<RaycastOutput, Interrupted> {
    let output = match mode {
      RaycastMode::Default | RaycastMode::WithCurrentInformation => {
        self.cast_pixel_grid(pose, camera, rect, checkpoint)?
      }
      RaycastMode::InformationVoxelCenter => {
        self.cast_voxel_centers(pose, camera, rect, checkpoint)?
      }
    };
    debug!(rays = output.rays_cast, hits = output.hits.len(), "raycast finished");
    Ok(output)
  }

  fn cast_pixel_grid(
    &self,
    pose: &Pose,
    camera: &PinholeCamera,
    rect: &PixelRect,
    checkpoint: &dyn Checkpoint,
  ) -> Result<RaycastOutput, Interrupted> {
    let stride = self.config.pixel_stride.max(1) as usize;
    let rows: Vec<u32> = (rect.y_start..rect.y_end).step_by(stride).collect();
    let columns: Vec<u32> = (rect.x_start..rect.x_end).step_by(stride).collect();
    let max_range = self.config.max_range;

    let mut hits = Vec::new();
    for sweep in rows.chunks(self.config.rows_per_sweep.max(1)) {
      checkpoint.checkpoint()?;
      let sweep_hits: Vec<Vec<PixelHit>> = sweep
        .par_iter()
        .map(|&y| {
          columns
            .iter()
            .filter_map(|&x| {
              let direction = pose.direction_to_world(camera.pixel_center_ray(x, y));
              self
                .volume
                .cast_ray(pose.position, direction, max_range)
                .map(|hit| PixelHit { pixel: [x, y], hit })
            })
            .collect()
        })
        .collect();
      hits.extend(sweep_hits.into_iter().flatten());
    }

    Ok(RaycastOutput {
      hits,
      rays_cast: rows.len() * columns.len(),
    })
  }

  /// Cast one ray at the center of every blocking cell that projects into
  /// `rect`. A cell counts as visible when it is the first thing its own
  /// center ray hits.
  fn cast_voxel_centers(
    &self,
    pose: &Pose,
    camera: &PinholeCamera,
    rect: &PixelRect,
    checkpoint: &dyn Checkpoint,
  ) -> Result<RaycastOutput, Interrupted> {
    let volume = self.volume;
    let max_range = self.config.max_range;

    let mut candidates = Vec::new();
    volume.for_each_cell(&mut |key: &VoxelKey, cell: &VoxelCell| {
      if volume.blocks_ray(cell) {
        candidates.push(*key);
      }
    });
    candidates.sort_unstable();

    let targets: Vec<(VoxelKey, DVec3, DVec2)> = candidates
      .into_iter()
      .filter_map(|key| {
        let center = volume.cell_bounds(&key).center();
        let local = pose.world_to_camera(center);
        if local.length() > max_range {
          return None;
        }
        let pixel = camera.project(local)?;
        rect.contains(pixel).then_some((key, center, pixel))
      })
      .collect();

    let sweep_len = self.config.rows_per_sweep.max(1) * CENTER_RAYS_PER_ROW;
    let mut hits = Vec::new();
    for sweep in targets.chunks(sweep_len) {
      checkpoint.checkpoint()?;
      let visible: Vec<PixelHit> = sweep
        .par_iter()
        .filter_map(|(key, center, pixel)| {
          let offset = *center - pose.position;
          let reach = offset.length() + volume.config().get_cell_size(key.lod);
          let hit = volume.cast_ray(pose.position, offset, reach)?;
          (hit.key == *key).then_some(PixelHit {
            pixel: [pixel.x as u32, pixel.y as u32],
            hit,
          })
        })
        .collect();
      hits.extend(visible);
    }

    Ok(RaycastOutput {
      hits,
      rays_cast: targets.len(),
    })
  }
}
