//! Shared fixtures for unit tests.

use std::sync::Arc;

use glam::{DQuat, DVec3};

use crate::camera::{PinholeCamera, Pose};
use crate::graph::{NodeIndex, ViewpointGraph};
use crate::information::ViewpointInformation;
use crate::octree::{DAabb3, OccupancyConfig, OccupancyMap, VoxelCell, VoxelKey};
use crate::raycast::RaycastConfig;
use crate::viewpoint::Viewpoint;

pub fn unit_map() -> OccupancyMap {
  OccupancyMap::new(OccupancyConfig::default().with_resolution(1.0))
}

/// Unit cells shifted so the +Z ray from the world origin runs down the
/// middle of column (0, 0), with occupied cells entered at z = 2, 4 and 6.
pub fn column_map() -> OccupancyMap {
  let config = OccupancyConfig::default()
    .with_resolution(1.0)
    .with_origin(DVec3::new(-0.5, -0.5, 0.0));
  let mut map = OccupancyMap::new(config);
  for z in [2, 4, 6] {
    map.insert(VoxelKey::new(0, 0, z, 0), VoxelCell::occupied(5));
  }
  map
}

/// Occupied 2 x 2 x 2 block centered over the origin, resting on z = 0.
pub fn block_map() -> OccupancyMap {
  let mut map = OccupancyMap::new(OccupancyConfig::default().with_resolution(0.5));
  map.fill_box(
    &DAabb3::new(DVec3::new(-1.0, -1.0, 0.0), DVec3::new(1.0, 1.0, 2.0)),
    VoxelCell::occupied(4),
  );
  map
}

/// One-pixel camera whose only ray is the optical axis.
pub fn single_ray_camera() -> PinholeCamera {
  PinholeCamera::simple(1, 1, 1.0)
}

pub fn small_camera() -> PinholeCamera {
  PinholeCamera::simple(32, 24, 24.0)
}

pub fn fast_raycast() -> RaycastConfig {
  RaycastConfig::default()
    .with_pixel_stride(2)
    .with_max_range(30.0)
    .with_rows_per_sweep(4)
}

/// Pose on a horizontal circle around the block, looking at its center.
pub fn orbit_pose(angle: f64, radius: f64) -> Pose {
  let position = DVec3::new(radius * angle.cos(), radius * angle.sin(), 1.0);
  Pose::look_at(position, DVec3::new(0.0, 0.0, 1.0), DVec3::Z)
}

/// Node at `(x, y, 0)` seeing voxels `(v, 0, 0)` with weight 1.
pub fn synthetic_node(graph: &mut ViewpointGraph, x: f64, y: f64, voxels: &[i32]) -> NodeIndex {
  let pose = Pose::new(DVec3::new(x, y, 0.0), DQuat::IDENTITY);
  let voxels = voxels.iter().map(|v| (VoxelKey::new(*v, 0, 0, 0), 1.0)).collect();
  graph.add_node(
    Viewpoint::new(pose, Arc::new(small_camera())),
    ViewpointInformation::from_voxels(voxels),
  )
}

/// Connect every pair closer than `radius`, cost = distance, both ways.
pub fn connect_within(graph: &mut ViewpointGraph, radius: f64) {
  let nodes: Vec<(NodeIndex, DVec3)> = graph
    .nodes()
    .map(|(index, node)| (index, node.pose().position))
    .collect();
  for (i, (a, pa)) in nodes.iter().enumerate() {
    for (b, pb) in &nodes[i + 1..] {
      let distance = pa.distance(*pb);
      if distance <= radius {
        graph.add_edge(*a, *b, distance, true, true).unwrap();
      }
    }
  }
}

/// `columns x rows` unit grid, 4-connected. Node `k` sees two voxels of its
/// own plus `100 + k % 4`, which it shares with every fourth node.
pub fn grid_graph(columns: usize, rows: usize) -> ViewpointGraph {
  let mut graph = ViewpointGraph::new();
  for i in 0..columns {
    for j in 0..rows {
      let k = (i * rows + j) as i32;
      synthetic_node(&mut graph, i as f64, j as f64, &[2 * k, 2 * k + 1, 100 + k % 4]);
    }
  }
  connect_within(&mut graph, 1.01);
  graph
}
