//! Camera model: rigid poses and pinhole intrinsics.
//!
//! Conventions follow the usual computer-vision frame: the camera looks along
//! its local +Z axis, +X points right in the image and +Y points down. A
//! [`Pose`] maps camera coordinates into world coordinates.

use glam::{DMat3, DQuat, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};

/// Rigid camera pose (camera-to-world).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
  pub position: DVec3,
  /// Unit quaternion rotating camera axes into world axes.
  pub orientation: DQuat,
}

impl Pose {
  pub const IDENTITY: Self = Self {
    position: DVec3::ZERO,
    orientation: DQuat::IDENTITY,
  };

  pub fn new(position: DVec3, orientation: DQuat) -> Self {
    Self {
      position,
      orientation: orientation.normalize(),
    }
  }

  /// Pose at `position` whose optical axis points at `target`.
  ///
  /// The image "up" direction (-Y) is aligned with `up` as closely as
  /// possible. Falls back to another reference axis when the view direction
  /// is parallel to `up`.
  pub fn look_at(position: DVec3, target: DVec3, up: DVec3) -> Self {
    let forward = (target - position).normalize_or_zero();
    if forward == DVec3::ZERO {
      return Self::new(position, DQuat::IDENTITY);
    }
    let mut right = (-up).cross(forward);
    if right.length_squared() < 1e-12 {
      let fallback = if forward.x.abs() < 0.9 { DVec3::X } else { DVec3::Y };
      right = (-fallback).cross(forward);
    }
    let right = right.normalize();
    let down = forward.cross(right);
    let rotation = DMat3::from_cols(right, down, forward);
    Self::new(position, DQuat::from_mat3(&rotation))
  }

  /// Optical axis in world coordinates.
  #[inline]
  pub fn forward(&self) -> DVec3 {
    self.orientation * DVec3::Z
  }

  #[inline]
  pub fn camera_to_world(&self, point: DVec3) -> DVec3 {
    self.position + self.orientation * point
  }

  #[inline]
  pub fn world_to_camera(&self, point: DVec3) -> DVec3 {
    self.orientation.inverse() * (point - self.position)
  }

  /// Rotate a camera-frame direction into the world frame.
  #[inline]
  pub fn direction_to_world(&self, direction: DVec3) -> DVec3 {
    self.orientation * direction
  }

  #[inline]
  pub fn distance_to(&self, other: &Pose) -> f64 {
    self.position.distance(other.position)
  }

  /// Rotation angle (radians, in [0, pi]) between two orientations.
  #[inline]
  pub fn angle_to(&self, other: &Pose) -> f64 {
    self.orientation.angle_between(other.orientation)
  }

  /// Pose of `other` expressed in this pose's camera frame.
  pub fn relative_to(&self, other: &Pose) -> Pose {
    Pose::new(
      self.world_to_camera(other.position),
      self.orientation.inverse() * other.orientation,
    )
  }

  /// Linear position / spherical orientation interpolation.
  pub fn interpolate(&self, other: &Pose, t: f64) -> Pose {
    Pose::new(
      self.position.lerp(other.position, t),
      self.orientation.slerp(other.orientation, t),
    )
  }
}

impl Default for Pose {
  fn default() -> Self {
    Self::IDENTITY
  }
}

/// Pinhole camera intrinsics in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
  pub width: u32,
  pub height: u32,
  pub fx: f64,
  pub fy: f64,
  pub cx: f64,
  pub cy: f64,
}

impl PinholeCamera {
  pub fn new(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
    Self {
      width,
      height,
      fx,
      fy,
      cx,
      cy,
    }
  }

  /// Square pixels with the principal point at the image center.
  pub fn simple(width: u32, height: u32, focal_length: f64) -> Self {
    Self::new(
      width,
      height,
      focal_length,
      focal_length,
      width as f64 * 0.5,
      height as f64 * 0.5,
    )
  }

  /// Rejects cameras whose frustum is degenerate.
  pub fn validate(&self) -> Result<()> {
    if self.width == 0 || self.height == 0 {
      return Err(PlannerError::InvalidCamera(format!(
        "image size {}x{} is empty",
        self.width, self.height
      )));
    }
    let focal_ok = |f: f64| f.is_finite() && f > 0.0;
    if !focal_ok(self.fx) || !focal_ok(self.fy) {
      return Err(PlannerError::InvalidCamera(format!(
        "focal lengths must be positive, got fx={} fy={}",
        self.fx, self.fy
      )));
    }
    if !self.cx.is_finite() || !self.cy.is_finite() {
      return Err(PlannerError::InvalidCamera(
        "principal point is not finite".to_string(),
      ));
    }
    Ok(())
  }

  #[inline]
  pub fn is_valid(&self) -> bool {
    self.validate().is_ok()
  }

  /// Copy with image size and intrinsics scaled by `factor`.
  pub fn scaled(&self, factor: f64) -> Self {
    Self {
      width: (self.width as f64 * factor).round().max(1.0) as u32,
      height: (self.height as f64 * factor).round().max(1.0) as u32,
      fx: self.fx * factor,
      fy: self.fy * factor,
      cx: self.cx * factor,
      cy: self.cy * factor,
    }
  }

  /// Unit ray direction in the camera frame through pixel coordinates
  /// `(x, y)`. Pixel `(i, j)` covers `[i, i + 1) x [j, j + 1)`.
  #[inline]
  pub fn camera_ray(&self, x: f64, y: f64) -> DVec3 {
    DVec3::new((x - self.cx) / self.fx, (y - self.cy) / self.fy, 1.0).normalize()
  }

  /// Ray through the center of pixel `(x, y)`.
  #[inline]
  pub fn pixel_center_ray(&self, x: u32, y: u32) -> DVec3 {
    self.camera_ray(x as f64 + 0.5, y as f64 + 0.5)
  }

  /// Project a camera-frame point. `None` when the point is behind the camera.
  #[inline]
  pub fn project(&self, point: DVec3) -> Option<DVec2> {
    if point.z <= 0.0 {
      return None;
    }
    Some(DVec2::new(
      self.fx * point.x / point.z + self.cx,
      self.fy * point.y / point.z + self.cy,
    ))
  }

  #[inline]
  pub fn is_in_viewport(&self, pixel: DVec2) -> bool {
    self.is_in_viewport_with_margin(pixel, 0.0)
  }

  /// Viewport test that shrinks the image by `margin` pixels on each side.
  pub fn is_in_viewport_with_margin(&self, pixel: DVec2, margin: f64) -> bool {
    pixel.x >= margin
      && pixel.y >= margin
      && pixel.x < self.width as f64 - margin
      && pixel.y < self.height as f64 - margin
  }

  pub fn horizontal_fov(&self) -> f64 {
    2.0 * (self.width as f64 / (2.0 * self.fx)).atan()
  }

  pub fn vertical_fov(&self) -> f64 {
    2.0 * (self.height as f64 / (2.0 * self.fy)).atan()
  }
}

impl Default for PinholeCamera {
  fn default() -> Self {
    Self::simple(640, 480, 500.0)
  }
}

/// Half-open pixel window `[x_start, x_end) x [y_start, y_end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
  pub x_start: u32,
  pub x_end: u32,
  pub y_start: u32,
  pub y_end: u32,
}

impl PixelRect {
  pub fn new(x_start: u32, x_end: u32, y_start: u32, y_end: u32) -> Self {
    Self {
      x_start,
      x_end,
      y_start,
      y_end,
    }
  }

  pub fn full(camera: &PinholeCamera) -> Self {
    Self::new(0, camera.width, 0, camera.height)
  }

  #[inline]
  pub fn width(&self) -> u32 {
    self.x_end.saturating_sub(self.x_start)
  }

  #[inline]
  pub fn height(&self) -> u32 {
    self.y_end.saturating_sub(self.y_start)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }

  #[inline]
  pub fn contains(&self, pixel: DVec2) -> bool {
    pixel.x >= self.x_start as f64
      && pixel.x < self.x_end as f64
      && pixel.y >= self.y_start as f64
      && pixel.y < self.y_end as f64
  }

  pub fn validate(&self, camera: &PinholeCamera) -> Result<()> {
    if self.x_start > self.x_end
      || self.y_start > self.y_end
      || self.x_end > camera.width
      || self.y_end > camera.height
    {
      return Err(PlannerError::InvalidPixelRect {
        x_start: self.x_start,
        x_end: self.x_end,
        y_start: self.y_start,
        y_end: self.y_end,
        width: camera.width,
        height: camera.height,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;
