//! Shortest feasible motions between viewpoints (Dijkstra).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use rayon::prelude::*;

use crate::graph::{NodeIndex, ViewpointGraph};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Frontier {
  cost: f64,
  node: NodeIndex,
}

impl Eq for Frontier {}

impl Ord for Frontier {
  // Min-heap on cost, then on index.
  fn cmp(&self, other: &Self) -> Ordering {
    other
      .cost
      .total_cmp(&self.cost)
      .then_with(|| other.node.cmp(&self.node))
  }
}

impl PartialOrd for Frontier {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Single-source shortest motions over feasible directed edges.
#[derive(Clone, Debug)]
pub struct ShortestPaths {
  source: NodeIndex,
  cost: Vec<f64>,
  previous: Vec<Option<NodeIndex>>,
}

impl ShortestPaths {
  pub fn compute(graph: &ViewpointGraph, source: NodeIndex) -> Self {
    let slots = graph.slot_count();
    let mut cost = vec![f64::INFINITY; slots];
    let mut previous = vec![None; slots];

    let mut heap = BinaryHeap::new();
    if graph.contains(source) {
      cost[source] = 0.0;
      heap.push(Frontier {
        cost: 0.0,
        node: source,
      });
    }

    while let Some(Frontier { cost: reached, node }) = heap.pop() {
      if reached > cost[node] {
        continue;
      }
      for edge in graph.feasible_edges(node) {
        let next = reached + edge.cost;
        if next < cost[edge.target] {
          cost[edge.target] = next;
          previous[edge.target] = Some(node);
          heap.push(Frontier {
            cost: next,
            node: edge.target,
          });
        }
      }
    }

    Self {
      source,
      cost,
      previous,
    }
  }

  pub fn source(&self) -> NodeIndex {
    self.source
  }

  pub fn cost_to(&self, target: NodeIndex) -> Option<f64> {
    self.cost.get(target).copied().filter(|cost| cost.is_finite())
  }

  /// Node sequence from the source to `target`, both included.
  pub fn path_to(&self, target: NodeIndex) -> Option<Vec<NodeIndex>> {
    self.cost_to(target)?;
    let mut path = vec![target];
    let mut current = target;
    while let Some(previous) = self.previous[current] {
      path.push(previous);
      current = previous;
    }
    path.reverse();
    Some(path)
  }
}

/// Shortest motions from a set of source nodes.
#[derive(Clone, Debug, Default)]
pub struct MotionTable {
  rows: HashMap<NodeIndex, ShortestPaths>,
}

impl MotionTable {
  /// One Dijkstra per node, run in parallel.
  #[tracing::instrument(skip_all, name = "path::motion_table", fields(sources = nodes.len()))]
  pub fn build(graph: &ViewpointGraph, nodes: &[NodeIndex]) -> Self {
    let rows = nodes
      .par_iter()
      .map(|&node| (node, ShortestPaths::compute(graph, node)))
      .collect();
    Self { rows }
  }

  /// Table over every live node.
  pub fn for_graph(graph: &ViewpointGraph) -> Self {
    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    Self::build(graph, &nodes)
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn contains(&self, source: NodeIndex) -> bool {
    self.rows.contains_key(&source)
  }

  /// Directed motion cost, None when `to` is unreachable or `from` is not a
  /// source of this table.
  #[inline]
  pub fn cost(&self, from: NodeIndex, to: NodeIndex) -> Option<f64> {
    if from == to {
      return Some(0.0);
    }
    self.rows.get(&from)?.cost_to(to)
  }

  pub fn path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<NodeIndex>> {
    self.rows.get(&from)?.path_to(to)
  }
}
