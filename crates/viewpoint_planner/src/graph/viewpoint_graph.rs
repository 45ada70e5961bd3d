//! ViewpointGraph - candidate viewpoints connected by feasible motions.
//!
//! Nodes live in a slot vector. A node's index is its identity: it never
//! changes while the node is alive and is not reused after removal until
//! [`ViewpointGraph::compact`] renumbers the graph.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use glam::DVec3;
use smallvec::SmallVec;

use super::Components;
use crate::camera::Pose;
use crate::error::{PlannerError, Result};
use crate::information::{ViewpointInformation, VoxelWithInformationSet};
use crate::viewpoint::Viewpoint;

pub type NodeIndex = usize;

/// Directed view of a motion between two nodes.
///
/// Both endpoints store an entry for the pair. Cost is shared by the two
/// entries, feasibility can differ.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewpointEdge {
  pub source: NodeIndex,
  pub target: NodeIndex,
  pub cost: f64,
  pub feasible: bool,
}

#[derive(Clone, Debug)]
pub struct ViewpointNode {
  viewpoint: Viewpoint,
  information: ViewpointInformation,
  edges: BTreeMap<NodeIndex, ViewpointEdge>,
}

impl ViewpointNode {
  pub fn viewpoint(&self) -> &Viewpoint {
    &self.viewpoint
  }

  pub fn pose(&self) -> &Pose {
    self.viewpoint.pose()
  }

  /// Cached total information of the viewpoint.
  pub fn information(&self) -> f64 {
    self.information.total
  }

  pub fn voxels(&self) -> &VoxelWithInformationSet {
    &self.information.voxels
  }

  pub fn degree(&self) -> usize {
    self.edges.len()
  }
}

#[derive(Clone, Debug, Default)]
pub struct ViewpointGraph {
  slots: Vec<Option<ViewpointNode>>,
  live: usize,
  edge_pairs: usize,
  components: OnceLock<Components>,
}

impl ViewpointGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of live nodes.
  pub fn len(&self) -> usize {
    self.live
  }

  pub fn is_empty(&self) -> bool {
    self.live == 0
  }

  /// One past the largest index ever handed out (since the last compaction).
  pub fn slot_count(&self) -> usize {
    self.slots.len()
  }

  /// Number of connected node pairs.
  pub fn edge_count(&self) -> usize {
    self.edge_pairs
  }

  pub fn contains(&self, index: NodeIndex) -> bool {
    self.node(index).is_some()
  }

  pub fn node(&self, index: NodeIndex) -> Option<&ViewpointNode> {
    self.slots.get(index).and_then(Option::as_ref)
  }

  pub fn try_node(&self, index: NodeIndex) -> Result<&ViewpointNode> {
    self.node(index).ok_or(PlannerError::UnknownNode(index))
  }

  pub fn viewpoint(&self, index: NodeIndex) -> Option<&Viewpoint> {
    self.node(index).map(ViewpointNode::viewpoint)
  }

  /// Live node indices in ascending order.
  pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
    self
      .slots
      .iter()
      .enumerate()
      .filter_map(|(index, slot)| slot.as_ref().map(|_| index))
  }

  pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &ViewpointNode)> + '_ {
    self
      .slots
      .iter()
      .enumerate()
      .filter_map(|(index, slot)| slot.as_ref().map(|node| (index, node)))
  }

  /// Insert a node under a fresh index.
  pub fn add_node(&mut self, viewpoint: Viewpoint, information: ViewpointInformation) -> NodeIndex {
    let index = self.slots.len();
    self.slots.push(Some(ViewpointNode {
      viewpoint,
      information,
      edges: BTreeMap::new(),
    }));
    self.live += 1;
    self.invalidate();
    index
  }

  /// Insert a node under a given index, leaving any gap as removed slots.
  /// Used when restoring a saved graph.
  pub(crate) fn restore_node(
    &mut self,
    index: NodeIndex,
    viewpoint: Viewpoint,
    information: ViewpointInformation,
  ) -> Result<()> {
    if self.contains(index) {
      return Err(PlannerError::DuplicateNode(index));
    }
    if self.slots.len() <= index {
      self.slots.resize_with(index + 1, || None);
    }
    self.slots[index] = Some(ViewpointNode {
      viewpoint,
      information,
      edges: BTreeMap::new(),
    });
    self.live += 1;
    self.invalidate();
    Ok(())
  }

  /// Connect `a` and `b`. Returns `Ok(false)` when the pair is already
  /// connected, `a == b`, or neither direction is feasible.
  pub fn add_edge(
    &mut self,
    a: NodeIndex,
    b: NodeIndex,
    cost: f64,
    forward_feasible: bool,
    backward_feasible: bool,
  ) -> Result<bool> {
    self.try_node(a)?;
    self.try_node(b)?;
    if a == b || self.has_edge(a, b) || !(forward_feasible || backward_feasible) {
      return Ok(false);
    }
    self.insert_half_edge(a, b, cost, forward_feasible);
    self.insert_half_edge(b, a, cost, backward_feasible);
    self.edge_pairs += 1;
    self.invalidate();
    Ok(true)
  }

  fn insert_half_edge(&mut self, source: NodeIndex, target: NodeIndex, cost: f64, feasible: bool) {
    if let Some(node) = self.slots.get_mut(source).and_then(Option::as_mut) {
      node.edges.insert(
        target,
        ViewpointEdge {
          source,
          target,
          cost,
          feasible,
        },
      );
    }
  }

  pub fn has_edge(&self, a: NodeIndex, b: NodeIndex) -> bool {
    self.edge(a, b).is_some()
  }

  /// Entry for the motion from `a` to `b`.
  pub fn edge(&self, a: NodeIndex, b: NodeIndex) -> Option<&ViewpointEdge> {
    self.node(a)?.edges.get(&b)
  }

  /// All stored edge entries of `index`, by target index.
  pub fn edges(&self, index: NodeIndex) -> impl Iterator<Item = &ViewpointEdge> + '_ {
    self.node(index).into_iter().flat_map(|node| node.edges.values())
  }

  /// Edges that can be travelled from `index`.
  pub fn feasible_edges(&self, index: NodeIndex) -> impl Iterator<Item = &ViewpointEdge> + '_ {
    self.edges(index).filter(|edge| edge.feasible)
  }

  /// Remove a node and its incident edges. Other indices are unaffected.
  pub fn remove_node(&mut self, index: NodeIndex) -> Result<ViewpointNode> {
    let node = self
      .slots
      .get_mut(index)
      .and_then(Option::take)
      .ok_or(PlannerError::UnknownNode(index))?;
    for target in node.edges.keys() {
      if let Some(neighbor) = self.slots.get_mut(*target).and_then(Option::as_mut) {
        neighbor.edges.remove(&index);
      }
    }
    self.edge_pairs -= node.edges.len();
    self.live -= 1;
    self.invalidate();
    Ok(node)
  }

  /// Renumber live nodes densely, preserving their relative order.
  ///
  /// Returns the old -> new index mapping (None for removed slots).
  pub fn compact(&mut self) -> Vec<Option<NodeIndex>> {
    let mut mapping = vec![None; self.slots.len()];
    let mut next = 0;
    for (old, slot) in self.slots.iter().enumerate() {
      if slot.is_some() {
        mapping[old] = Some(next);
        next += 1;
      }
    }

    let slots = std::mem::take(&mut self.slots);
    self.slots = slots
      .into_iter()
      .flatten()
      .map(|mut node| {
        node.edges = node
          .edges
          .into_values()
          .filter_map(|edge| {
            let source = mapping[edge.source]?;
            let target = mapping[edge.target]?;
            Some((
              target,
              ViewpointEdge {
                source,
                target,
                ..edge
              },
            ))
          })
          .collect();
        Some(node)
      })
      .collect();
    self.invalidate();
    mapping
  }

  pub fn clear(&mut self) {
    self.slots.clear();
    self.live = 0;
    self.edge_pairs = 0;
    self.invalidate();
  }

  /// Connected components over stored edges. Cached until the next mutation.
  pub fn components(&self) -> &Components {
    self.components.get_or_init(|| Components::compute(self))
  }

  /// Up to `k` live nodes within `max_distance` of `position`, nearest
  /// first (ties by index).
  pub fn nearest_neighbors(
    &self,
    position: DVec3,
    k: usize,
    max_distance: f64,
    exclude: Option<NodeIndex>,
  ) -> SmallVec<[(NodeIndex, f64); 16]> {
    let mut candidates: SmallVec<[(NodeIndex, f64); 16]> = self
      .nodes()
      .filter(|(index, _)| Some(*index) != exclude)
      .map(|(index, node)| (index, node.pose().position.distance(position)))
      .filter(|(_, distance)| *distance <= max_distance)
      .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    candidates.truncate(k);
    candidates
  }

  fn invalidate(&mut self) {
    self.components = OnceLock::new();
  }
}

#[cfg(test)]
#[path = "viewpoint_graph_test.rs"]
mod viewpoint_graph_test;
