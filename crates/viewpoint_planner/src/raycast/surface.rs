//! Per-cell surface samples reduced from a raycast, for external meshing.

use std::collections::BTreeMap;
use std::io::Write;

use glam::{DVec2, DVec3};

use super::PixelHit;
use crate::camera::Pose;
use crate::octree::VoxelKey;

/// Surface observation of one cell from one viewpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSample {
  /// Nearest entry point of any ray into the cell.
  pub point: DVec3,
  /// Mean entered-face normal, unit length.
  pub normal: DVec3,
  /// Distance from the camera to `point`.
  pub depth: f64,
  /// Pixel coordinate of the ray that produced `point`.
  pub screen: DVec2,
  /// Number of rays that hit the cell.
  pub ray_count: u32,
}

/// Normal / depth / screen-coordinate maps of the cells seen from a pose.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceDump {
  pub pose: Pose,
  pub samples: BTreeMap<VoxelKey, SurfaceSample>,
}

impl SurfaceDump {
  pub fn from_hits(pose: Pose, hits: &[PixelHit]) -> Self {
    let mut normal_sums: BTreeMap<VoxelKey, DVec3> = BTreeMap::new();
    let mut samples: BTreeMap<VoxelKey, SurfaceSample> = BTreeMap::new();

    for pixel_hit in hits {
      let hit = &pixel_hit.hit;
      let screen = DVec2::new(pixel_hit.pixel[0] as f64 + 0.5, pixel_hit.pixel[1] as f64 + 0.5);
      *normal_sums.entry(hit.key).or_insert(DVec3::ZERO) += hit.normal;
      samples
        .entry(hit.key)
        .and_modify(|sample| {
          sample.ray_count += 1;
          if hit.distance < sample.depth {
            sample.depth = hit.distance;
            sample.point = hit.point;
            sample.screen = screen;
          }
        })
        .or_insert(SurfaceSample {
          point: hit.point,
          normal: DVec3::ZERO,
          depth: hit.distance,
          screen,
          ray_count: 1,
        });
    }

    for (key, sample) in samples.iter_mut() {
      if let Some(sum) = normal_sums.get(key) {
        sample.normal = sum.normalize_or_zero();
      }
    }

    Self { pose, samples }
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  /// Oriented point list, one `x y z nx ny nz` line per cell.
  pub fn write_points<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
    for sample in self.samples.values() {
      let (p, n) = (sample.point, sample.normal);
      writeln!(writer, "{} {} {} {} {} {}", p.x, p.y, p.z, n.x, n.y, n.z)?;
    }
    Ok(())
  }
}
