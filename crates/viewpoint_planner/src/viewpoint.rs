//! Viewpoint: an immutable camera pose paired with a shared camera model.

use std::sync::Arc;

use crate::camera::{PinholeCamera, Pose};

#[derive(Clone, Debug, PartialEq)]
pub struct Viewpoint {
  pose: Pose,
  camera: Arc<PinholeCamera>,
}

impl Viewpoint {
  pub fn new(pose: Pose, camera: Arc<PinholeCamera>) -> Self {
    Self { pose, camera }
  }

  #[inline]
  pub fn pose(&self) -> &Pose {
    &self.pose
  }

  #[inline]
  pub fn camera(&self) -> &PinholeCamera {
    &self.camera
  }

  #[inline]
  pub fn shared_camera(&self) -> &Arc<PinholeCamera> {
    &self.camera
  }
}
