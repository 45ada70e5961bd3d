//! Bridging path legs whose images would not share enough scene content.

use std::collections::BTreeSet;

use tracing::debug;

use super::{MotionTable, PathConfig, ViewpointPath};
use crate::control::Checkpoint;
use crate::graph::{NodeIndex, ViewpointGraph};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchableStats {
  pub legs_checked: usize,
  pub legs_below_overlap: usize,
  pub nodes_inserted: usize,
  /// Low-overlap legs whose shortest motion has no free intermediate node.
  pub unbridged: usize,
  pub interrupted: bool,
}

/// For every leg whose endpoints share less than
/// `config.min_matchable_overlap` of their voxels (Jaccard), insert the
/// intermediate graph nodes of the shortest motion between them. Nodes
/// already on the path are never inserted twice.
#[tracing::instrument(skip_all, name = "path::make_sparse_matchable")]
pub fn make_sparse_matchable(
  graph: &ViewpointGraph,
  path: &mut ViewpointPath,
  config: &PathConfig,
  checkpoint: &dyn Checkpoint,
) -> MatchableStats {
  let mut stats = MatchableStats::default();
  let mut on_path: BTreeSet<NodeIndex> = path.nodes().collect();

  for branch in &mut path.branches {
    if checkpoint.checkpoint().is_err() {
      stats.interrupted = true;
      break;
    }
    let motions = MotionTable::build(graph, branch.nodes());

    let mut bridged = Vec::with_capacity(branch.len());
    // Leg i starts at node i; a closed tour's last node owns the closing leg.
    let legs: Vec<(NodeIndex, NodeIndex)> = branch.legs().collect();
    for (position, &node) in branch.nodes().iter().enumerate() {
      bridged.push(node);
      if let Some(&(from, to)) = legs.get(position) {
        bridged.extend(bridge(graph, &motions, from, to, config, &mut on_path, &mut stats));
      }
    }

    if bridged.len() != branch.len() {
      branch.set_nodes(bridged);
      let motions = MotionTable::build(graph, branch.nodes());
      branch.refresh(graph, &motions);
    }
  }

  debug!(
    legs = stats.legs_checked,
    low_overlap = stats.legs_below_overlap,
    inserted = stats.nodes_inserted,
    "sparse matchable pass done"
  );
  stats
}

fn bridge(
  graph: &ViewpointGraph,
  motions: &MotionTable,
  from: NodeIndex,
  to: NodeIndex,
  config: &PathConfig,
  on_path: &mut BTreeSet<NodeIndex>,
  stats: &mut MatchableStats,
) -> Vec<NodeIndex> {
  stats.legs_checked += 1;
  let (Some(a), Some(b)) = (graph.node(from), graph.node(to)) else {
    return Vec::new();
  };
  if a.voxels().overlap_ratio(b.voxels()) >= config.min_matchable_overlap {
    return Vec::new();
  }
  stats.legs_below_overlap += 1;

  let intermediates: Vec<NodeIndex> = motions
    .path(from, to)
    .map(|route| {
      let inner = route.len().saturating_sub(2);
      route
        .iter()
        .skip(1)
        .take(inner)
        .copied()
        .filter(|node| on_path.insert(*node))
        .collect()
    })
    .unwrap_or_default();
  if intermediates.is_empty() {
    stats.unbridged += 1;
  }
  stats.nodes_inserted += intermediates.len();
  intermediates
}
