//! Metric boxes: cell extents, volume bounds and sampling regions.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Closed box in world coordinates, stored as its two extreme corners.
///
/// Used for cell geometry, the metric extent of a volume and the
/// region-of-interest that constrains viewpoint sampling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DAabb3 {
	pub min: DVec3,
	pub max: DVec3,
}

impl DAabb3 {
	/// `min` must not exceed `max` on any axis (checked in debug builds).
	pub fn new(min: DVec3, max: DVec3) -> Self {
		debug_assert!(min.cmple(max).all(), "inverted box {min} .. {max}");
		Self { min, max }
	}

	/// Cube-like box around `center`; used for voxel cells and sampling shells.
	pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
		let half = half_extents.abs();
		Self::new(center - half, center + half)
	}

	/// Boundary points count as inside.
	#[inline]
	pub fn contains_point(&self, point: DVec3) -> bool {
		point.cmpge(self.min).all() && point.cmple(self.max).all()
	}

	#[inline]
	pub fn size(&self) -> DVec3 {
		self.max - self.min
	}

	#[inline]
	pub fn center(&self) -> DVec3 {
		self.min.lerp(self.max, 0.5)
	}

	#[inline]
	pub fn union(&self, other: &DAabb3) -> DAabb3 {
		Self::new(self.min.min(other.min), self.max.max(other.max))
	}

	/// Pads every face by `margin`. A negative margin shrinks the box and
	/// collapses an axis to its midpoint rather than inverting it.
	pub fn expanded(&self, margin: f64) -> DAabb3 {
		let center = self.center();
		let half = (self.size() * 0.5 + DVec3::splat(margin)).max(DVec3::ZERO);
		Self::new(center - half, center + half)
	}

	/// Parametric interval `(t_enter, t_exit)` of the line
	/// `origin + t * direction` inside the box.
	///
	/// `t_enter` is negative when `origin` lies inside. Axes with a zero
	/// direction component only constrain the origin.
	pub fn intersect_ray(&self, origin: DVec3, direction: DVec3) -> Option<(f64, f64)> {
		let mut interval = (f64::NEG_INFINITY, f64::INFINITY);

		for axis in 0..3 {
			let (start, step) = (origin[axis], direction[axis]);
			let (near, far) = (self.min[axis], self.max[axis]);

			if step == 0.0 {
				if !(near..=far).contains(&start) {
					return None;
				}
				continue;
			}

			let a = (near - start) / step;
			let b = (far - start) / step;
			interval.0 = interval.0.max(a.min(b));
			interval.1 = interval.1.min(a.max(b));
			if interval.0 > interval.1 {
				return None;
			}
		}

		Some(interval)
	}
}
