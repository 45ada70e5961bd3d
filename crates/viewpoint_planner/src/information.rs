//! Information scoring: reducing raycast hits to a scalar score and a
//! reusable per-voxel set.
//!
//! Evaluation is either stateless (a pure score for one candidate) or
//! cumulative, where a [`CoverageState`] remembers what finalized selections
//! already claimed and later evaluations are discounted accordingly.

use std::collections::BTreeMap;

use crate::octree::VoxelKey;
use crate::raycast::{PixelHit, RaycastMode};

/// Information weight of a cell from its occupancy and observation count.
///
/// Mean of the occupancy entropy (bits) and a novelty term that decays with
/// the number of observations. Never-observed cells score 1.
pub fn information_weight(occupancy: f32, observation_count: u32) -> f32 {
  let p = occupancy.clamp(1e-6, 1.0 - 1e-6);
  let entropy = -(p * p.log2() + (1.0 - p) * (1.0 - p).log2());
  let novelty = 1.0 / (1.0 + observation_count as f32);
  (0.5 * (entropy + novelty)).clamp(0.0, 1.0)
}

/// Voxel -> information value. Re-inserting a key replaces its value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoxelWithInformationSet {
  entries: BTreeMap<VoxelKey, f32>,
}

impl VoxelWithInformationSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: VoxelKey, value: f32) -> Option<f32> {
    self.entries.insert(key, value)
  }

  pub fn get(&self, key: &VoxelKey) -> Option<f32> {
    self.entries.get(key).copied()
  }

  pub fn contains(&self, key: &VoxelKey) -> bool {
    self.entries.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entries in key order.
  pub fn iter(&self) -> impl Iterator<Item = (&VoxelKey, f32)> + '_ {
    self.entries.iter().map(|(key, value)| (key, *value))
  }

  pub fn keys(&self) -> impl Iterator<Item = &VoxelKey> + '_ {
    self.entries.keys()
  }

  pub fn total(&self) -> f64 {
    self.entries.values().map(|v| *v as f64).sum()
  }

  pub fn shared_count(&self, other: &Self) -> usize {
    let (small, large) = if self.len() <= other.len() {
      (self, other)
    } else {
      (other, self)
    };
    small.keys().filter(|key| large.contains(key)).count()
  }

  /// Jaccard overlap of the key sets, 0 when both are empty.
  pub fn overlap_ratio(&self, other: &Self) -> f64 {
    let shared = self.shared_count(other);
    let union = self.len() + other.len() - shared;
    if union == 0 {
      0.0
    } else {
      shared as f64 / union as f64
    }
  }

  /// Union keeping the larger value for shared keys.
  pub fn merge_max(&mut self, other: &Self) {
    for (key, value) in other.iter() {
      let entry = self.entries.entry(*key).or_insert(value);
      *entry = entry.max(value);
    }
  }
}

impl FromIterator<(VoxelKey, f32)> for VoxelWithInformationSet {
  fn from_iter<I: IntoIterator<Item = (VoxelKey, f32)>>(iter: I) -> Self {
    Self {
      entries: iter.into_iter().collect(),
    }
  }
}

/// Score of one viewpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewpointInformation {
  pub total: f64,
  pub voxels: VoxelWithInformationSet,
}

impl ViewpointInformation {
  pub fn from_voxels(voxels: VoxelWithInformationSet) -> Self {
    Self {
      total: voxels.total(),
      voxels,
    }
  }
}

/// Information already claimed by finalized selections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoverageState {
  claimed: BTreeMap<VoxelKey, f32>,
}

impl CoverageState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.claimed.len()
  }

  pub fn is_empty(&self) -> bool {
    self.claimed.is_empty()
  }

  pub fn clear(&mut self) {
    self.claimed.clear();
  }

  pub fn claimed(&self, key: &VoxelKey) -> f32 {
    self.claimed.get(key).copied().unwrap_or(0.0)
  }

  /// Value of `key` still available to a new observation.
  #[inline]
  pub fn remaining(&self, key: &VoxelKey, value: f32) -> f32 {
    (value - self.claimed(key)).max(0.0)
  }

  /// Information `voxels` would add on top of what is claimed.
  pub fn marginal(&self, voxels: &VoxelWithInformationSet) -> f64 {
    voxels
      .iter()
      .map(|(key, value)| self.remaining(key, value) as f64)
      .sum()
  }

  /// Record `voxels` as covered. Returns the information gained.
  pub fn claim(&mut self, voxels: &VoxelWithInformationSet) -> f64 {
    let mut gained = 0.0;
    for (key, value) in voxels.iter() {
      let entry = self.claimed.entry(*key).or_insert(0.0);
      if value > *entry {
        gained += (value - *entry) as f64;
        *entry = value;
      }
    }
    gained
  }
}

/// Reduces per-ray hits to viewpoint information under a [`RaycastMode`].
#[derive(Clone, Copy, Debug, Default)]
pub struct InformationAggregator {
  mode: RaycastMode,
}

impl InformationAggregator {
  pub fn new(mode: RaycastMode) -> Self {
    Self { mode }
  }

  pub fn mode(&self) -> RaycastMode {
    self.mode
  }

  /// Stateless evaluation. Each voxel counts once, valued by its first hit.
  pub fn evaluate(&self, hits: &[PixelHit], coverage: &CoverageState) -> ViewpointInformation {
    let mut voxels = VoxelWithInformationSet::new();
    for hit in hits {
      let key = hit.key();
      if voxels.contains(&key) {
        continue;
      }
      let weight = hit.cell().weight;
      let value = match self.mode {
        RaycastMode::WithCurrentInformation => coverage.remaining(&key, weight),
        RaycastMode::Default | RaycastMode::InformationVoxelCenter => weight,
      };
      voxels.insert(key, value);
    }
    ViewpointInformation::from_voxels(voxels)
  }

  /// Cumulative evaluation: score against `coverage`, then claim the raw
  /// cell weights of everything seen.
  pub fn accumulate(&self, hits: &[PixelHit], coverage: &mut CoverageState) -> ViewpointInformation {
    let info = self.evaluate(hits, coverage);
    let raw = match self.mode {
      RaycastMode::WithCurrentInformation => {
        InformationAggregator::new(RaycastMode::Default).evaluate(hits, coverage)
      }
      _ => info.clone(),
    };
    coverage.claim(&raw.voxels);
    info
  }
}

#[cfg(test)]
#[path = "information_test.rs"]
mod information_test;
