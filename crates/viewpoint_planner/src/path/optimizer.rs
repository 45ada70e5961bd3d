//! Budgeted tour construction and local improvement.
//!
//! A branch starts at the unvisited node with the highest marginal
//! information. Nodes are then inserted one at a time, always the insertion
//! with the best marginal-information / added-cost ratio, and the tour is
//! tightened with 2-opt reversals and pairwise exchanges after each step.
//!
//! The insertion sequence never looks at the budget. Every branch is first
//! grown as if the budget were unlimited, so later branches start from the
//! same nodes whatever the budget is. The budget then only decides where
//! each sequence is cut: the first step whose tour exceeds it is dropped
//! together with everything after it. Shrinking the budget therefore keeps
//! a prefix of every branch and never more information.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::types::tour_cost;
use super::{MotionTable, PathBranch, PathBudget, PathResult, ViewpointPath};
use crate::control::Checkpoint;
use crate::error::{PlannerError, Result};
use crate::graph::{NodeIndex, ViewpointGraph};
use crate::information::CoverageState;

/// Improvements smaller than this are ignored.
const COST_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
  /// Return to the first viewpoint at the end of each branch.
  pub closed: bool,
  /// Cap on local search passes per improvement run.
  pub max_improvement_passes: usize,
  /// Nodes adding no more than this are not inserted.
  pub min_marginal_information: f64,
  /// Consecutive viewpoints sharing a smaller voxel fraction are bridged by
  /// [`make_sparse_matchable`](super::make_sparse_matchable).
  pub min_matchable_overlap: f64,
}

impl PathConfig {
  pub fn with_closed(mut self, closed: bool) -> Self {
    self.closed = closed;
    self
  }

  pub fn with_max_improvement_passes(mut self, passes: usize) -> Self {
    self.max_improvement_passes = passes;
    self
  }

  pub fn with_min_matchable_overlap(mut self, overlap: f64) -> Self {
    self.min_matchable_overlap = overlap;
    self
  }
}

impl Default for PathConfig {
  fn default() -> Self {
    Self {
      closed: true,
      max_improvement_passes: 100,
      min_marginal_information: 0.0,
      min_matchable_overlap: 0.3,
    }
  }
}

/// Parameters of a BuildPath request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRequest {
  /// Applied to each branch separately.
  pub budget: PathBudget,
  pub branch_count: usize,
  /// Restrict every branch to this connected component.
  pub component: Option<usize>,
}

impl PathRequest {
  pub fn with_budget(mut self, budget: PathBudget) -> Self {
    self.budget = budget;
    self
  }

  pub fn with_branch_count(mut self, branch_count: usize) -> Self {
    self.branch_count = branch_count;
    self
  }

  pub fn with_component(mut self, component: usize) -> Self {
    self.component = Some(component);
    self
  }
}

impl Default for PathRequest {
  fn default() -> Self {
    Self {
      budget: PathBudget::UNLIMITED,
      branch_count: 1,
      component: None,
    }
  }
}

#[derive(Clone, Copy, Debug)]
struct Insertion {
  node: NodeIndex,
  position: usize,
  added_cost: f64,
  ratio: f64,
}

impl Insertion {
  /// Higher ratio first, then cheaper, then lower node and position.
  fn beats(&self, other: &Insertion) -> bool {
    self
      .ratio
      .total_cmp(&other.ratio)
      .then(other.added_cost.total_cmp(&self.added_cost))
      .then(other.node.cmp(&self.node))
      .then(other.position.cmp(&self.position))
      .is_gt()
  }
}

/// Tours after each accepted insertion, starting with the lone start node.
#[derive(Debug, Default)]
struct BranchSequence {
  steps: Vec<Vec<NodeIndex>>,
  interrupted: bool,
  passes: usize,
}

impl BranchSequence {
  fn members(&self) -> &[NodeIndex] {
    self.steps.last().map_or(&[][..], Vec::as_slice)
  }

  /// Last step within `budget`, and whether a later step was cut.
  fn cut(self, budget: &PathBudget, closed: bool, motions: &MotionTable) -> (Vec<NodeIndex>, bool) {
    if budget.is_unlimited() {
      return (self.steps.into_iter().last().unwrap_or_default(), false);
    }
    let over = self.steps.iter().position(|tour| {
      let cost = tour_cost(tour, closed, motions).unwrap_or(f64::INFINITY);
      !budget.allows(cost, tour.len())
    });
    match over {
      Some(first_over) => {
        let kept = self.steps.into_iter().take(first_over).last().unwrap_or_default();
        (kept, true)
      }
      None => (self.steps.into_iter().last().unwrap_or_default(), false),
    }
  }
}

/// Builds and improves paths over a borrowed graph.
pub struct PathOptimizer<'a> {
  graph: &'a ViewpointGraph,
  config: &'a PathConfig,
}

impl<'a> PathOptimizer<'a> {
  pub fn new(graph: &'a ViewpointGraph, config: &'a PathConfig) -> Self {
    Self { graph, config }
  }

  /// Select and order nodes under `request.budget`, claiming what the new
  /// branches see in `coverage`.
  #[tracing::instrument(skip_all, name = "path::build", fields(branches = request.branch_count))]
  pub fn build_path(
    &self,
    request: &PathRequest,
    coverage: &mut CoverageState,
    checkpoint: &dyn Checkpoint,
  ) -> Result<PathResult> {
    if self.graph.is_empty() {
      return Err(PlannerError::EmptyGraph);
    }

    let components = self.graph.components();
    let pool: Vec<NodeIndex> = match request.component {
      Some(component) if component < components.count() => components.nodes_in(component),
      Some(component) => return Err(PlannerError::UnknownComponent(component)),
      None => self.graph.node_indices().collect(),
    };

    // Budget-independent sequences first, claimed in full for the next start.
    let branch_count = request.branch_count.max(1);
    let mut planned = coverage.clone();
    let mut used = BTreeSet::new();
    let mut sequences = Vec::with_capacity(branch_count);
    let mut result = PathResult::default();

    for branch in 0..branch_count {
      let Some(start) = self.best_start(&pool, &used, &planned) else {
        break;
      };
      let candidates: Vec<NodeIndex> = components
        .component_of(start)
        .map(|component| components.nodes_in(component))
        .unwrap_or_default()
        .into_iter()
        .filter(|node| !used.contains(node))
        .collect();
      let motions = MotionTable::build(self.graph, &candidates);

      // Nothing depends on the tail of the last branch, so it may stop early.
      let stop_at = (branch + 1 == branch_count).then_some(&request.budget);
      let sequence = self.grow_branch(start, &candidates, &motions, false, stop_at, &planned, checkpoint);
      result.improvement_passes += sequence.passes;
      result.interrupted |= sequence.interrupted;

      for node in sequence.members().iter().filter_map(|node| self.graph.node(*node)) {
        planned.claim(node.voxels());
      }
      used.extend(sequence.members().iter().copied());
      sequences.push((sequence, motions));

      if result.interrupted {
        break;
      }
    }

    for (sequence, motions) in sequences {
      let (mut nodes, limited) = sequence.cut(&request.budget, self.config.closed, &motions);
      result.budget_limited |= limited;
      if nodes.is_empty() {
        continue;
      }
      if !result.interrupted {
        let (passes, interrupted) = self.improve(&mut nodes, self.config.closed, &motions, checkpoint);
        result.improvement_passes += passes;
        result.interrupted |= interrupted;
      }

      for node in nodes.iter().filter_map(|node| self.graph.node(*node)) {
        result.information_gained += coverage.claim(node.voxels());
      }
      let mut branch = PathBranch::new(nodes, self.config.closed);
      let totals = branch.refresh(self.graph, &motions);
      debug!(nodes = branch.len(), cost = totals.cost, information = totals.information, "branch built");
      result.path.branches.push(branch);
    }

    info!(
      branches = result.path.branches.len(),
      nodes = result.path.node_count(),
      cost = result.path.total_cost(),
      gained = result.information_gained,
      budget_limited = result.budget_limited,
      interrupted = result.interrupted,
      "path built"
    );
    Ok(result)
  }

  /// Re-order the branches of `path` with full local search. Membership is
  /// unchanged. Without a path, every node of the largest component is put
  /// on one branch first (unlimited budget) and claimed in `coverage`.
  #[tracing::instrument(skip_all, name = "path::solve_tsp")]
  pub fn solve_tsp(
    &self,
    path: &ViewpointPath,
    coverage: &mut CoverageState,
    checkpoint: &dyn Checkpoint,
  ) -> Result<PathResult> {
    if self.graph.is_empty() {
      return Err(PlannerError::EmptyGraph);
    }
    if path.is_empty() {
      return Ok(self.tour_largest_component(coverage, checkpoint));
    }

    let mut result = PathResult::default();
    for branch in &path.branches {
      let mut nodes: Vec<NodeIndex> = branch
        .nodes()
        .iter()
        .copied()
        .filter(|node| self.graph.contains(*node))
        .collect();
      let motions = MotionTable::build(self.graph, &nodes);
      if !result.interrupted {
        let (passes, interrupted) =
          self.improve(&mut nodes, branch.is_closed(), &motions, checkpoint);
        result.improvement_passes += passes;
        result.interrupted = interrupted;
      }
      let mut improved = PathBranch::new(nodes, branch.is_closed());
      improved.refresh(self.graph, &motions);
      result.path.branches.push(improved);
    }

    info!(
      cost = result.path.total_cost(),
      passes = result.improvement_passes,
      interrupted = result.interrupted,
      "tour improved"
    );
    Ok(result)
  }

  fn tour_largest_component(&self, coverage: &mut CoverageState, checkpoint: &dyn Checkpoint) -> PathResult {
    let components = self.graph.components();
    let members = components
      .largest()
      .map(|component| components.nodes_in(component))
      .unwrap_or_default();
    let mut result = PathResult::default();
    let Some(start) = self.best_of(&members, coverage) else {
      return result;
    };

    let motions = MotionTable::build(self.graph, &members);
    let sequence = self.grow_branch(start, &members, &motions, true, None, coverage, checkpoint);
    result.interrupted = sequence.interrupted;
    result.improvement_passes = sequence.passes;
    let (mut nodes, _) = sequence.cut(&PathBudget::UNLIMITED, self.config.closed, &motions);
    if !result.interrupted {
      let (passes, interrupted) = self.improve(&mut nodes, self.config.closed, &motions, checkpoint);
      result.improvement_passes += passes;
      result.interrupted = interrupted;
    }

    for node in nodes.iter().filter_map(|node| self.graph.node(*node)) {
      result.information_gained += coverage.claim(node.voxels());
    }
    let mut branch = PathBranch::new(nodes, self.config.closed);
    branch.refresh(self.graph, &motions);
    result.path.branches.push(branch);
    result
  }

  /// Highest marginal node of `pool` not yet used, above the insertion
  /// threshold.
  fn best_start(
    &self,
    pool: &[NodeIndex],
    used: &BTreeSet<NodeIndex>,
    coverage: &CoverageState,
  ) -> Option<NodeIndex> {
    let mut best: Option<(NodeIndex, f64)> = None;
    for &index in pool {
      if used.contains(&index) {
        continue;
      }
      let Some(node) = self.graph.node(index) else {
        continue;
      };
      let marginal = coverage.marginal(node.voxels());
      if marginal <= self.config.min_marginal_information {
        continue;
      }
      if best.is_none_or(|(_, value)| marginal > value) {
        best = Some((index, marginal));
      }
    }
    best.map(|(index, _)| index)
  }

  /// Highest marginal node among `nodes`, regardless of threshold.
  fn best_of(&self, nodes: &[NodeIndex], coverage: &CoverageState) -> Option<NodeIndex> {
    let mut best: Option<(NodeIndex, f64)> = None;
    for &index in nodes {
      let Some(node) = self.graph.node(index) else {
        continue;
      };
      let marginal = coverage.marginal(node.voxels());
      if best.is_none_or(|(_, value)| marginal > value) {
        best = Some((index, marginal));
      }
    }
    best.map(|(index, _)| index)
  }

  /// Insert nodes until nothing worth inserting is left. With `stop_at`,
  /// growth also ends at the first step over that budget (the step is kept
  /// so the cut sees it).
  #[allow(clippy::too_many_arguments)]
  fn grow_branch(
    &self,
    start: NodeIndex,
    candidates: &[NodeIndex],
    motions: &MotionTable,
    insert_all: bool,
    stop_at: Option<&PathBudget>,
    coverage: &CoverageState,
    checkpoint: &dyn Checkpoint,
  ) -> BranchSequence {
    let closed = self.config.closed;
    let mut local = coverage.clone();
    if let Some(node) = self.graph.node(start) {
      local.claim(node.voxels());
    }

    let mut sequence = BranchSequence {
      steps: vec![vec![start]],
      ..BranchSequence::default()
    };
    let mut remaining: Vec<NodeIndex> = candidates.iter().copied().filter(|node| *node != start).collect();

    loop {
      if let Some(budget) = stop_at {
        let tour = sequence.members();
        let cost = tour_cost(tour, closed, motions).unwrap_or(f64::INFINITY);
        if !budget.allows(cost, tour.len()) {
          debug!(nodes = tour.len(), cost, "branch reached its budget");
          break;
        }
      }
      if checkpoint.checkpoint().is_err() {
        sequence.interrupted = true;
        break;
      }
      let Some(step) = self.best_insertion(sequence.members(), &remaining, motions, &local, insert_all)
      else {
        break;
      };

      let mut next = sequence.members().to_vec();
      next.insert(step.position, step.node);
      let (passes, interrupted) = self.improve(&mut next, closed, motions, checkpoint);
      sequence.passes += passes;
      sequence.steps.push(next);

      remaining.retain(|node| *node != step.node);
      if let Some(node) = self.graph.node(step.node) {
        local.claim(node.voxels());
      }
      if interrupted {
        sequence.interrupted = true;
        break;
      }
    }
    sequence
  }

  fn best_insertion(
    &self,
    tour: &[NodeIndex],
    remaining: &[NodeIndex],
    motions: &MotionTable,
    coverage: &CoverageState,
    insert_all: bool,
  ) -> Option<Insertion> {
    let closed = self.config.closed;
    let positions = if closed { 1..=tour.len() } else { 0..=tour.len() };

    let mut best: Option<Insertion> = None;
    for &node in remaining {
      let Some(entry) = self.graph.node(node) else {
        continue;
      };
      let marginal = coverage.marginal(entry.voxels());
      if !insert_all && marginal <= self.config.min_marginal_information {
        continue;
      }
      for position in positions.clone() {
        let Some(added_cost) = insertion_cost(tour, position, node, closed, motions) else {
          continue;
        };
        let candidate = Insertion {
          node,
          position,
          added_cost,
          ratio: marginal / added_cost.max(COST_EPSILON),
        };
        if best.as_ref().is_none_or(|current| candidate.beats(current)) {
          best = Some(candidate);
        }
      }
    }
    best
  }

  /// First-improvement 2-opt and pairwise exchange until a pass finds
  /// nothing, the pass cap is hit, or the checkpoint interrupts. Returns
  /// (passes run, interrupted).
  fn improve(
    &self,
    tour: &mut [NodeIndex],
    closed: bool,
    motions: &MotionTable,
    checkpoint: &dyn Checkpoint,
  ) -> (usize, bool) {
    let n = tour.len();
    if n < 2 {
      return (0, false);
    }
    let mut cost = tour_cost(tour, closed, motions).unwrap_or(f64::INFINITY);

    let mut passes = 0;
    while passes < self.config.max_improvement_passes {
      if checkpoint.checkpoint().is_err() {
        return (passes, true);
      }
      passes += 1;
      let mut improved = false;

      for i in 0..n - 1 {
        for j in i + 1..n {
          tour[i..=j].reverse();
          match tour_cost(tour, closed, motions) {
            Some(candidate) if candidate < cost - COST_EPSILON => {
              cost = candidate;
              improved = true;
            }
            _ => tour[i..=j].reverse(),
          }
        }
      }

      for i in 0..n - 1 {
        for j in i + 1..n {
          tour.swap(i, j);
          match tour_cost(tour, closed, motions) {
            Some(candidate) if candidate < cost - COST_EPSILON => {
              cost = candidate;
              improved = true;
            }
            _ => tour.swap(i, j),
          }
        }
      }

      if !improved {
        break;
      }
    }
    (passes, false)
  }
}

/// Extra cost of inserting `node` before `tour[position]`.
fn insertion_cost(
  tour: &[NodeIndex],
  position: usize,
  node: NodeIndex,
  closed: bool,
  motions: &MotionTable,
) -> Option<f64> {
  let len = tour.len();
  if closed {
    let previous = tour[(position + len - 1) % len];
    let next = tour[position % len];
    return Some(motions.cost(previous, node)? + motions.cost(node, next)? - motions.cost(previous, next)?);
  }
  match position {
    0 => motions.cost(node, tour[0]),
    p if p == len => motions.cost(tour[len - 1], node),
    p => Some(
      motions.cost(tour[p - 1], node)? + motions.cost(node, tour[p])? - motions.cost(tour[p - 1], tour[p])?,
    ),
  }
}

#[cfg(test)]
#[path = "optimizer_test.rs"]
mod optimizer_test;
