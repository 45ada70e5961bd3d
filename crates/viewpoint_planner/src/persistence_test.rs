use glam::{DQuat, DVec3};

use super::*;
use crate::path::MotionTable;
use crate::test_utils::{grid_graph, synthetic_node};

fn saved_graph(graph: &ViewpointGraph) -> Vec<u8> {
  let mut buffer = Vec::new();
  save_graph(graph, &mut buffer).expect("in-memory write");
  buffer
}

#[test]
fn test_graph_roundtrip_keeps_indices_and_edges() {
  let mut graph = grid_graph(2, 2);
  graph.remove_node(1).expect("node 1 exists");
  let extra = synthetic_node(&mut graph, 5.0, 5.0, &[42]);
  graph.add_edge(3, extra, 7.5, true, false).expect("nodes exist");

  let loaded = load_graph(saved_graph(&graph).as_slice()).expect("valid file");

  assert_eq!(loaded.node_indices().collect::<Vec<_>>(), vec![0, 2, 3, 4]);
  assert_eq!(loaded.edge_count(), graph.edge_count());
  assert_eq!(loaded.edge(3, extra).map(|e| (e.cost, e.feasible)), Some((7.5, true)));
  assert_eq!(loaded.edge(extra, 3).map(|e| e.feasible), Some(false));
  for (index, node) in graph.nodes() {
    let restored = loaded.node(index).expect("index preserved");
    assert_eq!(restored.pose(), node.pose());
    assert_eq!(restored.voxels(), node.voxels());
    assert_eq!(restored.information(), node.information());
  }
}

#[test]
fn test_loaded_graph_shares_cameras() {
  let graph = grid_graph(2, 2);
  let buffer = saved_graph(&graph);

  let file: serde_json::Value = serde_json::from_slice(&buffer).expect("json");
  assert_eq!(file["cameras"].as_array().map(Vec::len), Some(1));

  let loaded = load_graph(buffer.as_slice()).expect("valid file");
  let first = loaded.viewpoint(0).expect("node 0").shared_camera();
  let last = loaded.viewpoint(3).expect("node 3").shared_camera();
  assert!(Arc::ptr_eq(first, last));
}

#[test]
fn test_unknown_graph_version_is_rejected() {
  let graph = grid_graph(1, 2);
  let mut file: serde_json::Value = serde_json::from_slice(&saved_graph(&graph)).expect("json");
  file["version"] = serde_json::json!(99);

  let result = load_graph(file.to_string().as_bytes());
  assert!(matches!(
    result,
    Err(PlannerError::UnsupportedVersion { found: 99, expected: 1, .. })
  ));
}

#[test]
fn test_path_roundtrip_and_validation() {
  let graph = grid_graph(2, 2);
  let mut path = ViewpointPath::new();
  path.branches.push(PathBranch::new(vec![0, 1, 3, 2], true));
  path.branches.push(PathBranch::new(vec![], false));

  let mut buffer = Vec::new();
  save_path(&path, &mut buffer).expect("in-memory write");
  let loaded = load_path(buffer.as_slice(), &graph).expect("nodes exist");
  assert_eq!(loaded, path);

  let mut smaller = graph.clone();
  smaller.remove_node(3).expect("node 3 exists");
  assert!(matches!(
    load_path(buffer.as_slice(), &smaller),
    Err(PlannerError::UnknownNode(3))
  ));
}

#[test]
fn test_loaded_path_needs_refresh() {
  let graph = grid_graph(2, 2);
  let mut path = ViewpointPath::new();
  path.branches.push(PathBranch::new(vec![0, 1, 3, 2], true));
  path.refresh(&graph, &MotionTable::for_graph(&graph));
  assert!((path.total_cost() - 4.0).abs() < 1e-9);

  let mut buffer = Vec::new();
  save_path(&path, &mut buffer).expect("in-memory write");
  let loaded = load_path(buffer.as_slice(), &graph).expect("nodes exist");
  assert_eq!(loaded.branches[0].totals(), None);
}

#[test]
fn test_text_export() {
  let graph = grid_graph(2, 1);
  let mut path = ViewpointPath::new();
  path.branches.push(PathBranch::new(vec![1, 0], false));

  let mut buffer = Vec::new();
  export_path_text(&graph, &path, &mut buffer).expect("in-memory write");
  let text = String::from_utf8(buffer).expect("utf-8");
  let lines: Vec<&str> = text.lines().collect();

  assert_eq!(lines[0], "# branch node x y z qw qx qy qz");
  assert_eq!(lines[1], "0 1 1 0 0 1 0 0 0");
  assert_eq!(lines[2], "0 0 0 0 0 1 0 0 0");
  assert_eq!(lines.len(), 3);
}

#[test]
fn test_json_export_lists_stops_in_order() {
  let graph = grid_graph(2, 1);
  let mut path = ViewpointPath::new();
  path.branches.push(PathBranch::new(vec![1, 0], false));

  let mut buffer = Vec::new();
  export_path_json(&graph, &path, &mut buffer).expect("in-memory write");
  let poses: Vec<PathPose> = serde_json::from_slice(&buffer).expect("json");
  assert_eq!(poses.iter().map(|p| p.node).collect::<Vec<_>>(), vec![1, 0]);
  assert_eq!(poses[0].position, [1.0, 0.0, 0.0]);
}

#[test]
fn test_colmap_export_uses_world_to_camera() {
  let mut graph = ViewpointGraph::new();
  let camera = Arc::new(PinholeCamera::simple(64, 48, 50.0));
  let rotation = DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2);
  let pose = Pose::new(DVec3::new(1.0, 2.0, 3.0), rotation);
  let node = graph.add_node(Viewpoint::new(pose, camera), ViewpointInformation::default());
  let mut path = ViewpointPath::new();
  path.branches.push(PathBranch::new(vec![node], true));

  let export = ColmapExport::from_path(&graph, &path).expect("nodes exist");
  assert_eq!(export.cameras.len(), 1);
  let image = &export.images[0];
  assert_eq!((image.image_id, image.camera_id), (1, 1));

  // Applying (R, t) to the camera position must give the camera origin.
  let [qw, qx, qy, qz] = image.rotation;
  let world_to_camera = DQuat::from_xyzw(qx, qy, qz, qw);
  let t = DVec3::from_array(image.translation);
  assert!((world_to_camera * pose.position + t).length() < 1e-9);
  assert!((world_to_camera * pose.orientation).angle_between(DQuat::IDENTITY) < 1e-6);

  let mut cameras = Vec::new();
  export.write_cameras(&mut cameras).expect("in-memory write");
  let cameras = String::from_utf8(cameras).expect("utf-8");
  assert!(cameras.lines().any(|line| line == "1 PINHOLE 64 48 50 50 32 24"));

  let mut images = Vec::new();
  export.write_images(&mut images).expect("in-memory write");
  let images = String::from_utf8(images).expect("utf-8");
  let data: Vec<&str> = images.lines().filter(|line| !line.starts_with('#')).collect();
  assert_eq!(data.len(), 2);
  assert!(data[0].ends_with("1 branch00_0000_node0.png"));
  assert!(data[1].is_empty());
}
