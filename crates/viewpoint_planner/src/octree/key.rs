//! VoxelKey - weak, hashable reference to a volume cell.
//!
//! A key names a cell by its grid coordinates at its own LOD level. It owns
//! no volume memory; cell data is always looked back up through the volume.
//! Level 0 holds the resolution-sized cells and every level above doubles
//! the edge length.

use serde::{Deserialize, Serialize};

/// Cell address. Coordinates count cells of the key's own level, so
/// `(1, 0, 0, 2)` spans four resolution cells along X starting at index 4.
///
/// Keys order by (x, y, z, lod), which gives a stable iteration order for
/// sorted containers.
#[derive(
  Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
pub struct VoxelKey {
  pub x: i32,
  pub y: i32,
  pub z: i32,
  pub lod: i32,
}

impl VoxelKey {
  pub fn new(x: i32, y: i32, z: i32, lod: i32) -> Self {
    Self { x, y, z, lod }
  }

  /// The cell enclosing this one `lod - self.lod` levels up, or None when
  /// `lod` is finer than this key.
  ///
  /// Arithmetic shifts floor negative coordinates, so `-1` at level 0 lands
  /// in cell `-1` at every coarser level.
  pub fn ancestor_at(&self, lod: i32) -> Option<Self> {
    let shift = u32::try_from(lod - self.lod).ok()?;
    let up = |c: i32| c.checked_shr(shift).unwrap_or(if c < 0 { -1 } else { 0 });
    Some(Self::new(up(self.x), up(self.y), up(self.z), lod))
  }

  /// Whether `other` lies inside this key's cell (or is this key).
  pub fn contains(&self, other: &VoxelKey) -> bool {
    other.ancestor_at(self.lod) == Some(*self)
  }
}

#[cfg(test)]
#[path = "key_test.rs"]
mod key_test;
