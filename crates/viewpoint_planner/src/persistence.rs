//! Saving and loading graphs and paths, and exporting paths for other tools.
//!
//! Graph and path files are versioned JSON. Node indices are written as-is,
//! so a loaded graph keeps removed-slot gaps and a saved path stays valid
//! against it. Cameras are stored once and shared again on load.
//!
//! Exports:
//! - plain text, one pose per line
//! - JSON pose list
//! - COLMAP text model (`cameras.txt`, `images.txt`, empty `points3D.txt`)

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::camera::{PinholeCamera, Pose};
use crate::error::{PlannerError, Result};
use crate::graph::{NodeIndex, ViewpointGraph};
use crate::information::ViewpointInformation;
use crate::octree::VoxelKey;
use crate::path::{PathBranch, ViewpointPath};
use crate::viewpoint::Viewpoint;

pub const GRAPH_FORMAT_VERSION: u32 = 1;
pub const PATH_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct GraphFile {
  version: u32,
  cameras: Vec<PinholeCamera>,
  nodes: Vec<NodeRecord>,
  edges: Vec<EdgeRecord>,
}

#[derive(Serialize, Deserialize)]
struct NodeRecord {
  index: NodeIndex,
  pose: Pose,
  camera: usize,
  voxels: Vec<(VoxelKey, f32)>,
}

/// One stored pair, `source < target`.
#[derive(Serialize, Deserialize)]
struct EdgeRecord {
  source: NodeIndex,
  target: NodeIndex,
  cost: f64,
  forward: bool,
  backward: bool,
}

#[derive(Serialize, Deserialize)]
struct PathFile {
  version: u32,
  branches: Vec<PathBranch>,
}

fn check_version(kind: &'static str, found: u32, expected: u32) -> Result<()> {
  if found != expected {
    return Err(PlannerError::UnsupportedVersion {
      kind,
      found,
      expected,
    });
  }
  Ok(())
}

/// Distinct cameras in first-use order and the camera slot of each value.
fn camera_slot(cameras: &mut Vec<PinholeCamera>, camera: &PinholeCamera) -> usize {
  match cameras.iter().position(|known| known == camera) {
    Some(slot) => slot,
    None => {
      cameras.push(*camera);
      cameras.len() - 1
    }
  }
}

pub fn save_graph<W: Write>(graph: &ViewpointGraph, writer: W) -> Result<()> {
  let mut cameras = Vec::new();
  let mut nodes = Vec::with_capacity(graph.len());
  let mut edges = Vec::with_capacity(graph.edge_count());

  for (index, node) in graph.nodes() {
    nodes.push(NodeRecord {
      index,
      pose: *node.pose(),
      camera: camera_slot(&mut cameras, node.viewpoint().camera()),
      voxels: node.voxels().iter().map(|(key, value)| (*key, value)).collect(),
    });
    for edge in graph.edges(index).filter(|edge| edge.target > index) {
      edges.push(EdgeRecord {
        source: index,
        target: edge.target,
        cost: edge.cost,
        forward: edge.feasible,
        backward: graph.edge(edge.target, index).is_some_and(|back| back.feasible),
      });
    }
  }

  let file = GraphFile {
    version: GRAPH_FORMAT_VERSION,
    cameras,
    nodes,
    edges,
  };
  serde_json::to_writer(writer, &file)?;
  Ok(())
}

pub fn load_graph<R: Read>(reader: R) -> Result<ViewpointGraph> {
  let file: GraphFile = serde_json::from_reader(reader)?;
  check_version("viewpoint graph", file.version, GRAPH_FORMAT_VERSION)?;

  let cameras: Vec<Arc<PinholeCamera>> = file.cameras.into_iter().map(Arc::new).collect();
  let mut graph = ViewpointGraph::new();
  for record in file.nodes {
    let camera = cameras.get(record.camera).ok_or_else(|| {
      PlannerError::InvalidCamera(format!("node {} references missing camera {}", record.index, record.camera))
    })?;
    let information = ViewpointInformation::from_voxels(record.voxels.into_iter().collect());
    graph.restore_node(record.index, Viewpoint::new(record.pose, Arc::clone(camera)), information)?;
  }
  for edge in file.edges {
    graph.add_edge(edge.source, edge.target, edge.cost, edge.forward, edge.backward)?;
  }
  Ok(graph)
}

pub fn save_path<W: Write>(path: &ViewpointPath, writer: W) -> Result<()> {
  let file = PathFile {
    version: PATH_FORMAT_VERSION,
    branches: path.branches.clone(),
  };
  serde_json::to_writer(writer, &file)?;
  Ok(())
}

/// Load a path and check every node against `graph`. Branch totals are not
/// stored and must be refreshed by the caller.
pub fn load_path<R: Read>(reader: R, graph: &ViewpointGraph) -> Result<ViewpointPath> {
  let file: PathFile = serde_json::from_reader(reader)?;
  check_version("viewpoint path", file.version, PATH_FORMAT_VERSION)?;
  let path = ViewpointPath {
    branches: file.branches,
  };
  if let Some(missing) = path.nodes().find(|node| !graph.contains(*node)) {
    return Err(PlannerError::UnknownNode(missing));
  }
  Ok(path)
}

pub fn save_graph_file(graph: &ViewpointGraph, file: &Path) -> Result<()> {
  let mut writer = BufWriter::new(File::create(file)?);
  save_graph(graph, &mut writer)?;
  writer.flush()?;
  info!(path = %file.display(), nodes = graph.len(), "saved viewpoint graph");
  Ok(())
}

pub fn load_graph_file(file: &Path) -> Result<ViewpointGraph> {
  let graph = load_graph(BufReader::new(File::open(file)?))?;
  info!(path = %file.display(), nodes = graph.len(), "loaded viewpoint graph");
  Ok(graph)
}

pub fn save_path_file(path: &ViewpointPath, file: &Path) -> Result<()> {
  let mut writer = BufWriter::new(File::create(file)?);
  save_path(path, &mut writer)?;
  writer.flush()?;
  Ok(())
}

pub fn load_path_file(file: &Path, graph: &ViewpointGraph) -> Result<ViewpointPath> {
  load_path(BufReader::new(File::open(file)?), graph)
}

/// Pose of one path stop, in travel order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathPose {
  pub branch: usize,
  pub node: NodeIndex,
  pub position: [f64; 3],
  /// Camera-to-world rotation as (w, x, y, z).
  pub orientation: [f64; 4],
}

pub fn path_poses(graph: &ViewpointGraph, path: &ViewpointPath) -> Result<Vec<PathPose>> {
  let mut poses = Vec::with_capacity(path.node_count());
  for (branch_index, branch) in path.branches.iter().enumerate() {
    for &node in branch.nodes() {
      let pose = graph.try_node(node)?.pose();
      let q = pose.orientation;
      poses.push(PathPose {
        branch: branch_index,
        node,
        position: pose.position.to_array(),
        orientation: [q.w, q.x, q.y, q.z],
      });
    }
  }
  Ok(poses)
}

/// `# branch node x y z qw qx qy qz` followed by one line per stop.
pub fn export_path_text<W: Write>(graph: &ViewpointGraph, path: &ViewpointPath, mut writer: W) -> Result<()> {
  writeln!(writer, "# branch node x y z qw qx qy qz")?;
  for pose in path_poses(graph, path)? {
    let [x, y, z] = pose.position;
    let [qw, qx, qy, qz] = pose.orientation;
    writeln!(writer, "{} {} {x} {y} {z} {qw} {qx} {qy} {qz}", pose.branch, pose.node)?;
  }
  Ok(())
}

pub fn export_path_json<W: Write>(graph: &ViewpointGraph, path: &ViewpointPath, writer: W) -> Result<()> {
  serde_json::to_writer_pretty(writer, &path_poses(graph, path)?)?;
  Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColmapImage {
  pub image_id: usize,
  pub camera_id: usize,
  /// World-to-camera rotation as (w, x, y, z).
  pub rotation: [f64; 4],
  /// World-to-camera translation.
  pub translation: [f64; 3],
  pub name: String,
}

/// Path as a COLMAP sparse text model without 3D points. Ids start at 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColmapExport {
  pub cameras: Vec<PinholeCamera>,
  pub images: Vec<ColmapImage>,
}

impl ColmapExport {
  pub fn from_path(graph: &ViewpointGraph, path: &ViewpointPath) -> Result<Self> {
    let mut export = Self::default();
    for (branch_index, branch) in path.branches.iter().enumerate() {
      for (stop, &node) in branch.nodes().iter().enumerate() {
        let viewpoint = graph.try_node(node)?.viewpoint();
        let camera_id = camera_slot(&mut export.cameras, viewpoint.camera()) + 1;
        let pose = viewpoint.pose();
        let rotation = pose.orientation.inverse();
        let translation = -(rotation * pose.position);
        export.images.push(ColmapImage {
          image_id: export.images.len() + 1,
          camera_id,
          rotation: [rotation.w, rotation.x, rotation.y, rotation.z],
          translation: translation.to_array(),
          name: format!("branch{branch_index:02}_{stop:04}_node{node}.png"),
        });
      }
    }
    Ok(export)
  }

  pub fn write_cameras<W: Write>(&self, mut writer: W) -> Result<()> {
    writeln!(writer, "# Camera list with one line of data per camera:")?;
    writeln!(writer, "#   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]")?;
    writeln!(writer, "# Number of cameras: {}", self.cameras.len())?;
    for (slot, camera) in self.cameras.iter().enumerate() {
      writeln!(
        writer,
        "{} PINHOLE {} {} {} {} {} {}",
        slot + 1,
        camera.width,
        camera.height,
        camera.fx,
        camera.fy,
        camera.cx,
        camera.cy
      )?;
    }
    Ok(())
  }

  pub fn write_images<W: Write>(&self, mut writer: W) -> Result<()> {
    writeln!(writer, "# Image list with two lines of data per image:")?;
    writeln!(writer, "#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME")?;
    writeln!(writer, "#   POINTS2D[] as (X, Y, POINT3D_ID)")?;
    writeln!(
      writer,
      "# Number of images: {}, mean observations per image: 0",
      self.images.len()
    )?;
    for image in &self.images {
      let [qw, qx, qy, qz] = image.rotation;
      let [tx, ty, tz] = image.translation;
      writeln!(
        writer,
        "{} {qw} {qx} {qy} {qz} {tx} {ty} {tz} {} {}",
        image.image_id, image.camera_id, image.name
      )?;
      // No 2D observations.
      writeln!(writer)?;
    }
    Ok(())
  }

  pub fn write_points<W: Write>(&self, mut writer: W) -> Result<()> {
    writeln!(writer, "# 3D point list with one line of data per point:")?;
    writeln!(
      writer,
      "#   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)"
    )?;
    writeln!(writer, "# Number of points: 0, mean track length: 0")?;
    Ok(())
  }

  /// Write the three model files into `directory`, creating it if needed.
  pub fn save(&self, directory: &Path) -> Result<()> {
    fs::create_dir_all(directory)?;
    let mut cameras = BufWriter::new(File::create(directory.join("cameras.txt"))?);
    self.write_cameras(&mut cameras)?;
    cameras.flush()?;
    let mut images = BufWriter::new(File::create(directory.join("images.txt"))?);
    self.write_images(&mut images)?;
    images.flush()?;
    let mut points = BufWriter::new(File::create(directory.join("points3D.txt"))?);
    self.write_points(&mut points)?;
    points.flush()?;
    info!(
      path = %directory.display(),
      cameras = self.cameras.len(),
      images = self.images.len(),
      "exported COLMAP model"
    );
    Ok(())
  }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod persistence_test;
