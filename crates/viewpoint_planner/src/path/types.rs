//! Path data: budgets, branches and optimizer results.

use serde::{Deserialize, Serialize};

use crate::graph::{NodeIndex, ViewpointGraph};
use crate::information::VoxelWithInformationSet;

use super::MotionTable;

/// Limits on a single branch. `None` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathBudget {
  pub max_cost: Option<f64>,
  pub max_nodes: Option<usize>,
}

impl PathBudget {
  pub const UNLIMITED: Self = Self {
    max_cost: None,
    max_nodes: None,
  };

  pub fn with_max_cost(mut self, max_cost: f64) -> Self {
    self.max_cost = Some(max_cost);
    self
  }

  pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
    self.max_nodes = Some(max_nodes);
    self
  }

  pub fn is_unlimited(&self) -> bool {
    self.max_cost.is_none() && self.max_nodes.is_none()
  }

  #[inline]
  pub fn allows(&self, cost: f64, nodes: usize) -> bool {
    self.max_cost.is_none_or(|max| cost <= max) && self.max_nodes.is_none_or(|max| nodes <= max)
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BranchTotals {
  pub cost: f64,
  /// Information of the union of all visible voxels along the branch.
  pub information: f64,
}

/// One contiguous tour through the graph.
///
/// Totals are cached; any change to membership or order drops them until
/// the next [`PathBranch::refresh`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathBranch {
  nodes: Vec<NodeIndex>,
  closed: bool,
  #[serde(skip)]
  totals: Option<BranchTotals>,
}

impl PathBranch {
  pub fn new(nodes: Vec<NodeIndex>, closed: bool) -> Self {
    Self {
      nodes,
      closed,
      totals: None,
    }
  }

  pub fn nodes(&self) -> &[NodeIndex] {
    &self.nodes
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  pub fn contains(&self, node: NodeIndex) -> bool {
    self.nodes.contains(&node)
  }

  /// Replace the visiting order.
  pub fn set_nodes(&mut self, nodes: Vec<NodeIndex>) {
    self.nodes = nodes;
    self.totals = None;
  }

  /// Consecutive pairs in travel order, including the closing pair of a
  /// closed tour.
  pub fn legs(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
    let closing = (self.closed && self.nodes.len() > 1)
      .then(|| (self.nodes[self.nodes.len() - 1], self.nodes[0]));
    self.nodes.windows(2).map(|pair| (pair[0], pair[1])).chain(closing)
  }

  /// Cached totals, None after a change.
  pub fn totals(&self) -> Option<BranchTotals> {
    self.totals
  }

  /// Recompute the totals. Legs without a feasible motion cost infinity.
  pub fn refresh(&mut self, graph: &ViewpointGraph, motions: &MotionTable) -> BranchTotals {
    let cost = tour_cost(&self.nodes, self.closed, motions).unwrap_or(f64::INFINITY);
    let mut voxels = VoxelWithInformationSet::new();
    for node in self.nodes.iter().filter_map(|index| graph.node(*index)) {
      voxels.merge_max(node.voxels());
    }
    let totals = BranchTotals {
      cost,
      information: voxels.total(),
    };
    self.totals = Some(totals);
    totals
  }
}

/// Cost of visiting `nodes` in order, None when a leg is unreachable.
pub(crate) fn tour_cost(nodes: &[NodeIndex], closed: bool, motions: &MotionTable) -> Option<f64> {
  let mut cost = 0.0;
  for pair in nodes.windows(2) {
    cost += motions.cost(pair[0], pair[1])?;
  }
  if closed && nodes.len() > 1 {
    cost += motions.cost(nodes[nodes.len() - 1], nodes[0])?;
  }
  Some(cost)
}

/// Ordered viewpoint path made of disjoint branches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewpointPath {
  pub branches: Vec<PathBranch>,
}

impl ViewpointPath {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.branches.iter().all(PathBranch::is_empty)
  }

  pub fn node_count(&self) -> usize {
    self.branches.iter().map(PathBranch::len).sum()
  }

  pub fn contains(&self, node: NodeIndex) -> bool {
    self.branches.iter().any(|branch| branch.contains(node))
  }

  /// All visited nodes, branch by branch in travel order.
  pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
    self.branches.iter().flat_map(|branch| branch.nodes().iter().copied())
  }

  /// Sum of cached branch costs. Branches without totals count as zero.
  pub fn total_cost(&self) -> f64 {
    self.branches.iter().filter_map(PathBranch::totals).map(|t| t.cost).sum()
  }

  pub fn total_information(&self) -> f64 {
    self
      .branches
      .iter()
      .filter_map(PathBranch::totals)
      .map(|t| t.information)
      .sum()
  }

  pub fn refresh(&mut self, graph: &ViewpointGraph, motions: &MotionTable) {
    for branch in &mut self.branches {
      branch.refresh(graph, motions);
    }
  }
}

/// Outcome of a path optimization run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathResult {
  pub path: ViewpointPath,
  /// Some insertion was refused because it would exceed the budget.
  pub budget_limited: bool,
  /// Stopped early at a checkpoint; `path` is the best tour found so far.
  pub interrupted: bool,
  pub improvement_passes: usize,
  /// Information newly claimed in the coverage state.
  pub information_gained: f64,
}
