//! Motion feasibility and cost between two viewpoints.

use std::cmp::Ordering;

use glam::DVec3;

use super::GraphConfig;
use crate::camera::Pose;
use crate::octree::{DAabb3, OccupancyVolume};

/// Result of testing the straight motion from one pose to another.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MotionCheck {
  Feasible { cost: f64 },
  TooLong,
  TurnTooSharp,
  TooSteep,
  Blocked,
}

impl MotionCheck {
  #[inline]
  pub fn is_feasible(&self) -> bool {
    matches!(self, MotionCheck::Feasible { .. })
  }

  #[inline]
  pub fn cost(&self) -> Option<f64> {
    match self {
      MotionCheck::Feasible { cost } => Some(*cost),
      _ => None,
    }
  }
}

/// Straight-line motion test against the volume and kinematic limits.
///
/// Without an ascent limit the test is symmetric: `check(a, b)` and
/// `check(b, a)` always agree on feasibility.
pub struct MotionValidator<'a, V: ?Sized> {
  volume: &'a V,
  config: &'a GraphConfig,
}

impl<'a, V: OccupancyVolume + ?Sized> MotionValidator<'a, V> {
  pub fn new(volume: &'a V, config: &'a GraphConfig) -> Self {
    Self { volume, config }
  }

  /// `alpha * length + beta * turn_angle`.
  pub fn cost(&self, from: &Pose, to: &Pose) -> f64 {
    self.config.alpha * from.distance_to(to) + self.config.beta * from.angle_to(to)
  }

  pub fn check(&self, from: &Pose, to: &Pose) -> MotionCheck {
    let length = from.distance_to(to);
    if length > self.config.max_edge_length {
      return MotionCheck::TooLong;
    }
    if from.angle_to(to) > self.config.max_turn_angle {
      return MotionCheck::TurnTooSharp;
    }
    if let Some(max_slope) = self.config.max_ascent_slope {
      let rise = to.position.z - from.position.z;
      if rise > 0.0 {
        let run = from.position.truncate().distance(to.position.truncate());
        if run == 0.0 || rise / run > max_slope {
          return MotionCheck::TooSteep;
        }
      }
    }
    if !self.is_segment_clear(from.position, to.position) {
      return MotionCheck::Blocked;
    }
    MotionCheck::Feasible {
      cost: self.cost(from, to),
    }
  }

  /// No blocking cell on the segment and, with a positive clearance, none
  /// within `clearance` of sample points spaced half a cell apart.
  ///
  /// Endpoints are put in a canonical order first, so the answer does not
  /// depend on the direction of travel.
  pub fn is_segment_clear(&self, a: DVec3, b: DVec3) -> bool {
    let (p, q) = if lexicographic(a, b) == Ordering::Greater {
      (b, a)
    } else {
      (a, b)
    };
    let length = p.distance(q);
    if length > 0.0 && self.volume.cast_ray(p, q - p, length).is_some() {
      return false;
    }

    let clearance = self.config.clearance;
    if clearance <= 0.0 {
      return true;
    }
    let spacing = self.volume.config().resolution * 0.5;
    let samples = ((length / spacing).ceil() as usize).max(1);
    (0..=samples).all(|i| {
      let point = p.lerp(q, i as f64 / samples as f64);
      let region = DAabb3::from_center_half_extents(point, DVec3::splat(clearance));
      self.volume.is_region_free(&region)
    })
  }
}

fn lexicographic(a: DVec3, b: DVec3) -> Ordering {
  a.x
    .total_cmp(&b.x)
    .then(a.y.total_cmp(&b.y))
    .then(a.z.total_cmp(&b.z))
}
