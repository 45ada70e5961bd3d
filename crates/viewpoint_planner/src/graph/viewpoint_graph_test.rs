use std::sync::Arc;

use super::*;
use crate::camera::PinholeCamera;
use crate::octree::VoxelKey;

fn viewpoint_at(x: f64) -> Viewpoint {
  Viewpoint::new(
    Pose::new(DVec3::new(x, 0.0, 0.0), glam::DQuat::IDENTITY),
    Arc::new(PinholeCamera::default()),
  )
}

fn graph_with(count: usize) -> ViewpointGraph {
  let mut graph = ViewpointGraph::new();
  for i in 0..count {
    let voxels = [(VoxelKey::new(i as i32, 0, 0, 0), 1.0)].into_iter().collect();
    graph.add_node(viewpoint_at(i as f64), ViewpointInformation::from_voxels(voxels));
  }
  graph
}

#[test]
fn test_indices_are_not_reused_while_live() {
  let mut graph = graph_with(3);
  graph.remove_node(1).expect("node 1 exists");

  let index = graph.add_node(viewpoint_at(9.0), ViewpointInformation::default());
  assert_eq!(index, 3);
  assert_eq!(graph.len(), 3);
  assert_eq!(graph.node_indices().collect::<Vec<_>>(), vec![0, 2, 3]);
  assert!(matches!(graph.remove_node(1), Err(PlannerError::UnknownNode(1))));
}

#[test]
fn test_remove_drops_only_incident_edges() {
  let mut graph = graph_with(3);
  graph.add_edge(0, 1, 1.0, true, true).expect("valid nodes");
  graph.add_edge(1, 2, 1.0, true, true).expect("valid nodes");
  graph.add_edge(0, 2, 2.0, true, true).expect("valid nodes");
  assert_eq!(graph.edge_count(), 3);

  let removed = graph.remove_node(1).expect("node 1 exists");
  assert_eq!(removed.degree(), 2);
  assert_eq!(graph.edge_count(), 1);
  assert!(graph.has_edge(0, 2));
  assert!(graph.has_edge(2, 0));
  assert!(!graph.has_edge(0, 1));
  assert_eq!(graph.edges(0).count(), 1);
  assert_eq!(graph.node(2).map(|n| n.information()), Some(1.0));
}

#[test]
fn test_add_edge_never_duplicates() {
  let mut graph = graph_with(2);

  assert!(graph.add_edge(0, 1, 1.0, true, true).expect("valid nodes"));
  assert!(!graph.add_edge(0, 1, 1.0, true, true).expect("valid nodes"));
  assert!(!graph.add_edge(1, 0, 5.0, true, true).expect("valid nodes"));
  assert!(!graph.add_edge(0, 0, 0.0, true, true).expect("valid node"));
  assert_eq!(graph.edge_count(), 1);
  assert_eq!(graph.edge(1, 0).map(|e| e.cost), Some(1.0));

  assert!(matches!(
    graph.add_edge(0, 7, 1.0, true, true),
    Err(PlannerError::UnknownNode(7))
  ));
}

#[test]
fn test_direction_dependent_feasibility() {
  let mut graph = graph_with(3);

  assert!(graph.add_edge(0, 1, 2.0, true, false).expect("valid nodes"));
  assert!(!graph.add_edge(1, 2, 2.0, false, false).expect("valid nodes"));

  assert_eq!(graph.feasible_edges(0).count(), 1);
  assert_eq!(graph.feasible_edges(1).count(), 0);
  assert_eq!(graph.edge(1, 0).map(|e| e.feasible), Some(false));
  assert!(!graph.has_edge(1, 2));
}

#[test]
fn test_compact_renumbers_and_keeps_edges() {
  let mut graph = graph_with(4);
  graph.add_edge(0, 3, 3.0, true, true).expect("valid nodes");
  graph.add_edge(2, 3, 1.0, false, true).expect("valid nodes");
  graph.remove_node(1).expect("node 1 exists");

  let mapping = graph.compact();
  assert_eq!(mapping, vec![Some(0), None, Some(1), Some(2)]);
  assert_eq!(graph.slot_count(), 3);
  assert_eq!(graph.len(), 3);
  assert_eq!(graph.edge(0, 2).map(|e| (e.source, e.target, e.cost)), Some((0, 2, 3.0)));
  assert_eq!(graph.edge(1, 2).map(|e| e.feasible), Some(false));
  assert_eq!(graph.edge(2, 1).map(|e| e.feasible), Some(true));
  assert_eq!(graph.node(2).map(|n| n.pose().position.x), Some(3.0));
}

#[test]
fn test_components_track_mutations() {
  let mut graph = graph_with(5);
  graph.add_edge(0, 1, 1.0, true, true).expect("valid nodes");
  graph.add_edge(3, 4, 1.0, true, false).expect("valid nodes");

  let components = graph.components();
  assert_eq!(components.count(), 3);
  assert_eq!(components.component_of(0), Some(0));
  assert_eq!(components.component_of(2), Some(1));
  assert_eq!(components.component_of(4), Some(2));
  assert_eq!(components.nodes_in(2), vec![3, 4]);
  assert_eq!(components.largest(), Some(0));

  graph.add_edge(1, 2, 1.0, true, true).expect("valid nodes");
  let components = graph.components();
  assert_eq!(components.count(), 2);
  assert_eq!(components.size(0), 3);
  assert_eq!(components.largest(), Some(0));

  graph.remove_node(1).expect("node 1 exists");
  assert_eq!(graph.components().count(), 3);
  assert_eq!(graph.components().component_of(1), None);
}

#[test]
fn test_nearest_neighbors() {
  let graph = graph_with(6);

  let near: Vec<NodeIndex> = graph
    .nearest_neighbors(DVec3::new(2.2, 0.0, 0.0), 3, 10.0, Some(2))
    .iter()
    .map(|(index, _)| *index)
    .collect();
  assert_eq!(near, vec![3, 1, 4]);

  let bounded = graph.nearest_neighbors(DVec3::ZERO, 10, 1.5, None);
  assert_eq!(bounded.len(), 2);
}

#[test]
fn test_clear() {
  let mut graph = graph_with(3);
  graph.add_edge(0, 1, 1.0, true, true).expect("valid nodes");
  graph.clear();

  assert!(graph.is_empty());
  assert_eq!(graph.edge_count(), 0);
  assert_eq!(graph.components().count(), 0);
  assert_eq!(graph.add_node(viewpoint_at(0.0), ViewpointInformation::default()), 0);
}
