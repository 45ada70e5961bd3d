use super::*;

fn unit_config() -> OccupancyConfig {
  OccupancyConfig::default().with_resolution(1.0)
}

/// Cell size doubles with each LOD level.
#[test]
fn test_cell_size_doubles_per_lod() {
  let config = OccupancyConfig::default().with_resolution(0.25);

  assert_eq!(config.get_cell_size(0), 0.25);
  assert_eq!(config.get_cell_size(1), 0.5, "LOD 1 should be 2x LOD 0");
  assert_eq!(config.get_cell_size(5), 8.0, "LOD 5 should be 32x LOD 0");
}

/// Cell position offsets by origin.
#[test]
fn test_cell_min_with_origin() {
  let config = unit_config().with_origin(DVec3::new(100.0, 200.0, 300.0));

  assert_eq!(config.get_cell_min(&VoxelKey::new(0, 0, 0, 0)), config.origin);
  assert_eq!(
    config.get_cell_min(&VoxelKey::new(1, -1, 2, 1)),
    DVec3::new(102.0, 198.0, 304.0)
  );
}

#[test]
fn test_cell_center_and_bounds() {
  let config = unit_config();
  let key = VoxelKey::new(2, 0, -1, 0);

  assert_eq!(config.get_cell_center(&key), DVec3::new(2.5, 0.5, -0.5));
  let bounds = config.get_cell_bounds(&key);
  assert_eq!(bounds.min, DVec3::new(2.0, 0.0, -1.0));
  assert_eq!(bounds.max, DVec3::new(3.0, 1.0, 0.0));
}

/// key_at inverts get_cell_center at every LOD.
#[test]
fn test_key_at_roundtrip() {
  let config = OccupancyConfig::default().with_origin(DVec3::new(-3.0, 1.5, 0.25));

  for lod in 0..4 {
    for key in [
      VoxelKey::new(0, 0, 0, lod),
      VoxelKey::new(-5, 7, 2, lod),
      VoxelKey::new(11, -1, -9, lod),
    ] {
      assert_eq!(config.key_at(config.get_cell_center(&key), lod), key);
    }
  }
}

/// Points on a shared face belong to the positive-side cell.
#[test]
fn test_key_at_face_belongs_to_positive_side() {
  let config = unit_config();

  assert_eq!(config.key_at(DVec3::new(1.0, 0.5, 0.5), 0), VoxelKey::new(1, 0, 0, 0));
  assert_eq!(config.key_at(DVec3::new(-0.5, 0.0, 0.0), 0), VoxelKey::new(-1, 0, 0, 0));
}
