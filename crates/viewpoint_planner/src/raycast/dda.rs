//! Grid traversal (3D DDA) at the finest cell resolution.
//!
//! The ray is clipped to the volume bounds, then stepped one LOD 0 cell at a
//! time. Each step resolves the stored leaf containing the current cell, so
//! coarse leaves are reported once, at the distance where the ray enters them.

use glam::DVec3;

use crate::octree::{OccupancyVolume, VoxelCell, VoxelKey};

/// A stored cell pierced by a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
  pub key: VoxelKey,
  pub cell: VoxelCell,
  /// Distance along the ray to the entry point.
  pub distance: f64,
  pub point: DVec3,
  /// Outward normal of the entered face. Approximate for the first cell when
  /// the ray starts inside the volume.
  pub normal: DVec3,
}

/// Visit stored cells along the ray, nearest first, until `visit` returns
/// false or the ray passes `max_range` or leaves the volume bounds.
pub fn traverse<V, F>(volume: &V, origin: DVec3, direction: DVec3, max_range: f64, mut visit: F)
where
  V: OccupancyVolume + ?Sized,
  F: FnMut(RayHit) -> bool,
{
  let dir = direction.normalize_or_zero();
  if dir == DVec3::ZERO || !(max_range > 0.0) {
    return;
  }
  let Some(bounds) = volume.bounds() else {
    return;
  };
  let Some((t_enter, t_exit)) = bounds.intersect_ray(origin, dir) else {
    return;
  };
  let t_start = t_enter.max(0.0);
  let t_end = t_exit.min(max_range);
  if t_start > t_end {
    return;
  }

  let config = volume.config();
  let resolution = config.resolution;
  let entry = origin + dir * t_start;
  let local = (entry - config.origin) / resolution;

  let mut cell = [
    local.x.floor() as i64,
    local.y.floor() as i64,
    local.z.floor() as i64,
  ];
  let mut step = [0i64; 3];
  let mut t_max = [f64::INFINITY; 3];
  let mut t_delta = [f64::INFINITY; 3];

  for axis in 0..3 {
    let d = dir[axis];
    if d == 0.0 {
      continue;
    }
    step[axis] = if d > 0.0 { 1 } else { -1 };
    t_delta[axis] = resolution / d.abs();
    let next_index = if d > 0.0 { cell[axis] + 1 } else { cell[axis] };
    let boundary = config.origin[axis] + next_index as f64 * resolution;
    t_max[axis] = t_start + (boundary - entry[axis]) / d;
  }

  let abs = dir.abs();
  let dominant = if abs.x >= abs.y && abs.x >= abs.z {
    0
  } else if abs.y >= abs.z {
    1
  } else {
    2
  };
  let mut normal = DVec3::ZERO;
  normal[dominant] = -(step[dominant] as f64);

  let mut t = t_start;
  let mut last_leaf: Option<VoxelKey> = None;
  loop {
    let key = VoxelKey::new(cell[0] as i32, cell[1] as i32, cell[2] as i32, 0);
    if let Some((leaf, data)) = volume.leaf_containing(&key) {
      if last_leaf != Some(leaf) {
        last_leaf = Some(leaf);
        let hit = RayHit {
          key: leaf,
          cell: data,
          distance: t,
          point: origin + dir * t,
          normal,
        };
        if !visit(hit) {
          return;
        }
      }
    }

    let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
      0
    } else if t_max[1] <= t_max[2] {
      1
    } else {
      2
    };
    if t_max[axis] > t_end {
      return;
    }
    t = t_max[axis];
    cell[axis] += step[axis];
    t_max[axis] += t_delta[axis];
    normal = DVec3::ZERO;
    normal[axis] = -(step[axis] as f64);
  }
}

/// First occupied or unknown cell along the ray.
pub fn first_hit<V>(volume: &V, origin: DVec3, direction: DVec3, max_range: f64) -> Option<RayHit>
where
  V: OccupancyVolume + ?Sized,
{
  let mut found = None;
  traverse(volume, origin, direction, max_range, |hit| {
    if volume.blocks_ray(&hit.cell) {
      found = Some(hit);
      false
    } else {
      true
    }
  });
  found
}
