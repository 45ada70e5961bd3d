use super::*;
use crate::octree::CellState;

fn unit_map() -> OccupancyMap {
  OccupancyMap::new(OccupancyConfig::default().with_resolution(1.0))
}

#[test]
fn test_empty_map() {
  let map = unit_map();
  assert!(map.is_empty());
  assert!(OccupancyVolume::is_empty(&map));
  assert!(map.bounds().is_none());
  assert!(map.leaf_at(DVec3::ZERO).is_none());
}

#[test]
fn test_insert_replaces_and_tracks_bounds() {
  let mut map = unit_map();
  let key = VoxelKey::new(1, 2, 3, 0);

  assert!(map.insert(key, VoxelCell::free(3)).is_none());
  let previous = map.insert(key, VoxelCell::occupied(5));
  assert_eq!(previous, Some(VoxelCell::free(3)));
  assert_eq!(map.len(), 1);
  assert_eq!(map.cell(&key), Some(VoxelCell::occupied(5)));

  map.insert(VoxelKey::new(-1, 0, 0, 1), VoxelCell::unknown());
  let bounds = map.bounds().expect("non-empty map has bounds");
  assert_eq!(bounds.min, DVec3::new(-2.0, 0.0, 0.0));
  assert_eq!(bounds.max, DVec3::new(2.0, 3.0, 4.0));
}

#[test]
fn test_insert_outside_lod_range_is_ignored() {
  let mut map = OccupancyMap::new(OccupancyConfig::default().with_max_lod(2));

  map.insert(VoxelKey::new(0, 0, 0, 3), VoxelCell::unknown());
  map.insert(VoxelKey::new(0, 0, 0, -1), VoxelCell::unknown());
  assert!(map.is_empty());
}

/// Lookups at LOD 0 resolve to a coarse stored ancestor.
#[test]
fn test_leaf_containing_walks_ancestors() {
  let mut map = unit_map();
  let coarse = VoxelKey::new(1, 0, 0, 2);
  map.insert(coarse, VoxelCell::occupied(4));

  let (found, cell) = map
    .leaf_containing(&VoxelKey::new(5, 3, 0, 0))
    .expect("inside the coarse cell");
  assert_eq!(found, coarse);
  assert_eq!(cell, VoxelCell::occupied(4));

  assert!(map.leaf_containing(&VoxelKey::new(8, 0, 0, 0)).is_none());
  assert_eq!(map.leaf_at(DVec3::new(6.5, 0.5, 3.9)).map(|(k, _)| k), Some(coarse));
}

#[test]
fn test_remove_recomputes_extent() {
  let mut map = unit_map();
  map.insert(VoxelKey::new(0, 0, 0, 0), VoxelCell::free(1));
  map.insert(VoxelKey::new(4, 0, 0, 1), VoxelCell::free(1));

  assert_eq!(map.remove(&VoxelKey::new(4, 0, 0, 1)), Some(VoxelCell::free(1)));
  assert!(map.remove(&VoxelKey::new(4, 0, 0, 1)).is_none());
  assert_eq!(map.bounds().map(|b| b.max), Some(DVec3::ONE));
  assert!(map.leaf_containing(&VoxelKey::new(8, 0, 0, 0)).is_none());
}

#[test]
fn test_fill_box_uses_cell_centers() {
  let mut map = unit_map();
  let region = DAabb3::new(DVec3::ZERO, DVec3::new(3.0, 2.0, 1.0));

  assert_eq!(map.fill_box(&region, VoxelCell::occupied(2)), 6);
  assert!(map.cell(&VoxelKey::new(2, 1, 0, 0)).is_some());
  assert!(map.cell(&VoxelKey::new(3, 0, 0, 0)).is_none());
}

#[test]
fn test_classification() {
  let map = unit_map();

  assert_eq!(map.classify(&VoxelCell::unknown()), CellState::Unknown);
  assert_eq!(map.classify(&VoxelCell::occupied(3)), CellState::Occupied);
  assert_eq!(map.classify(&VoxelCell::free(3)), CellState::Free);
  // Unknown wins even at high occupancy.
  assert_eq!(map.classify(&VoxelCell::new(0.99, 0)), CellState::Unknown);
  assert!(map.blocks_ray(&VoxelCell::unknown()));
  assert!(!map.blocks_ray(&VoxelCell::free(1)));
}

#[test]
fn test_is_region_free() {
  let mut map = unit_map();
  map.insert(VoxelKey::new(0, 0, 0, 0), VoxelCell::free(2));
  map.insert(VoxelKey::new(3, 0, 0, 0), VoxelCell::occupied(2));

  let near_free = DAabb3::new(DVec3::splat(0.1), DVec3::splat(0.9));
  assert!(map.is_region_free(&near_free));

  let touching_wall = DAabb3::new(DVec3::new(2.5, 0.1, 0.1), DVec3::new(3.2, 0.5, 0.5));
  assert!(!map.is_region_free(&touching_wall));

  // Absent cells are empty space.
  let outside = DAabb3::new(DVec3::splat(10.0), DVec3::splat(12.0));
  assert!(map.is_region_free(&outside));
}

#[test]
fn test_json_roundtrip() {
  let mut map = OccupancyMap::new(
    OccupancyConfig::default()
      .with_resolution(0.5)
      .with_origin(DVec3::new(1.0, 2.0, 3.0)),
  );
  map.insert(VoxelKey::new(0, 0, 0, 0), VoxelCell::occupied(7));
  map.insert(VoxelKey::new(-3, 2, 1, 1), VoxelCell::unknown().with_weight(2.5));

  let mut buffer = Vec::new();
  map.to_writer(&mut buffer).expect("serialize map");
  let loaded = OccupancyMap::from_reader(buffer.as_slice()).expect("deserialize map");

  assert_eq!(loaded.config(), map.config());
  assert_eq!(loaded.len(), 2);
  assert_eq!(
    loaded.cell(&VoxelKey::new(-3, 2, 1, 1)).map(|c| c.weight),
    Some(2.5)
  );
  assert_eq!(loaded.bounds(), map.bounds());
}

#[test]
fn test_rejects_unknown_version() {
  let json = r#"{"version": 99, "config": {}, "cells": []}"#;

  match OccupancyMap::from_reader(json.as_bytes()) {
    Err(PlannerError::UnsupportedVersion { found, expected, .. }) => {
      assert_eq!(found, 99);
      assert_eq!(expected, MAP_FORMAT_VERSION);
    }
    other => panic!("expected version error, got {:?}", other.map(|m| m.len())),
  }
}
