use super::*;

const EPS: f64 = 1e-9;

#[test]
fn test_look_at_points_optical_axis_at_target() {
  let pose = Pose::look_at(DVec3::new(5.0, 0.0, 1.0), DVec3::new(0.0, 0.0, 1.0), DVec3::Z);

  assert!((pose.forward() - DVec3::new(-1.0, 0.0, 0.0)).length() < EPS);
  // Image down axis should point towards world -Z.
  let down = pose.direction_to_world(DVec3::Y);
  assert!((down - DVec3::new(0.0, 0.0, -1.0)).length() < EPS);
}

#[test]
fn test_look_at_right_handed_axes() {
  let pose = Pose::look_at(DVec3::ZERO, DVec3::X, DVec3::Z);
  let right = pose.direction_to_world(DVec3::X);

  // Looking along +X with +Z up, the right-hand side is -Y.
  assert!((right - DVec3::new(0.0, -1.0, 0.0)).length() < EPS);
}

#[test]
fn test_look_at_parallel_to_up_falls_back() {
  let pose = Pose::look_at(DVec3::ZERO, DVec3::new(0.0, 0.0, -3.0), DVec3::Z);

  assert!((pose.forward() - DVec3::new(0.0, 0.0, -1.0)).length() < EPS);
  assert!((pose.orientation.length() - 1.0).abs() < EPS);
}

#[test]
fn test_world_camera_roundtrip() {
  let pose = Pose::look_at(DVec3::new(1.0, 2.0, 3.0), DVec3::new(-4.0, 0.5, 0.0), DVec3::Z);
  let point = DVec3::new(0.3, -2.0, 7.5);

  let back = pose.camera_to_world(pose.world_to_camera(point));
  assert!((back - point).length() < EPS);
}

#[test]
fn test_pixel_ray_projects_back_to_pixel() {
  let camera = PinholeCamera::new(320, 240, 300.0, 310.0, 161.0, 119.0);

  let ray = camera.pixel_center_ray(40, 200);
  let pixel = camera.project(ray * 12.0).expect("point is in front of the camera");

  assert!((pixel - DVec2::new(40.5, 200.5)).length() < 1e-6);
  assert!(camera.is_in_viewport(pixel));
}

#[test]
fn test_project_behind_camera_returns_none() {
  let camera = PinholeCamera::default();
  assert!(camera.project(DVec3::new(0.0, 0.0, -1.0)).is_none());
  assert!(camera.project(DVec3::new(1.0, 1.0, 0.0)).is_none());
}

#[test]
fn test_viewport_margin() {
  let camera = PinholeCamera::simple(100, 50, 80.0);

  assert!(camera.is_in_viewport(DVec2::new(0.0, 0.0)));
  assert!(!camera.is_in_viewport(DVec2::new(100.0, 10.0)));
  assert!(!camera.is_in_viewport_with_margin(DVec2::new(3.0, 10.0), 5.0));
  assert!(camera.is_in_viewport_with_margin(DVec2::new(5.0, 10.0), 5.0));
}

#[test]
fn test_scaled_camera() {
  let camera = PinholeCamera::simple(640, 480, 500.0);
  let half = camera.scaled(0.5);

  assert_eq!(half.width, 320);
  assert_eq!(half.height, 240);
  assert_eq!(half.fx, 250.0);
  assert_eq!(half.cx, 160.0);
  assert!((half.horizontal_fov() - camera.horizontal_fov()).abs() < EPS);
}

#[test]
fn test_degenerate_camera_is_invalid() {
  assert!(PinholeCamera::default().is_valid());

  let empty = PinholeCamera::simple(0, 480, 500.0);
  assert!(matches!(empty.validate(), Err(PlannerError::InvalidCamera(_))));

  let flat = PinholeCamera::new(640, 480, 0.0, 500.0, 320.0, 240.0);
  assert!(!flat.is_valid());
}

#[test]
fn test_pixel_rect_validation() {
  let camera = PinholeCamera::simple(64, 48, 50.0);

  assert!(PixelRect::full(&camera).validate(&camera).is_ok());
  assert!(PixelRect::new(10, 20, 5, 5).validate(&camera).is_ok());
  assert!(PixelRect::new(10, 20, 5, 5).is_empty());

  let too_wide = PixelRect::new(0, 65, 0, 10);
  assert!(matches!(
    too_wide.validate(&camera),
    Err(PlannerError::InvalidPixelRect { width: 64, .. })
  ));
  assert!(PixelRect::new(20, 10, 0, 10).validate(&camera).is_err());
}

#[test]
fn test_pose_relative_and_angle() {
  let a = Pose::look_at(DVec3::ZERO, DVec3::X, DVec3::Z);
  let b = Pose::look_at(DVec3::new(0.0, 0.0, 2.0), DVec3::new(0.0, 5.0, 2.0), DVec3::Z);

  assert!(a.angle_to(&a).abs() < 1e-6);
  assert!((a.angle_to(&b) - std::f64::consts::FRAC_PI_2).abs() < 1e-6);

  let relative = a.relative_to(&b);
  assert!((relative.position.length() - 2.0).abs() < EPS);

  let mid = a.interpolate(&b, 0.5);
  assert!((mid.position - DVec3::new(0.0, 0.0, 1.0)).length() < EPS);
}
