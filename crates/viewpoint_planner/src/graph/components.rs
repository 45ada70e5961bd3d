//! Connected components of the viewpoint graph (union-find).

use super::{NodeIndex, ViewpointGraph};

struct UnionFind {
  parent: Vec<usize>,
  rank: Vec<u8>,
}

impl UnionFind {
  fn new(n: usize) -> Self {
    Self {
      parent: (0..n).collect(),
      rank: vec![0; n],
    }
  }

  fn find(&mut self, x: usize) -> usize {
    let mut root = x;
    while self.parent[root] != root {
      root = self.parent[root];
    }
    // path compression
    let mut node = x;
    while self.parent[node] != root {
      let next = self.parent[node];
      self.parent[node] = root;
      node = next;
    }
    root
  }

  fn union(&mut self, x: usize, y: usize) {
    let rx = self.find(x);
    let ry = self.find(y);
    if rx == ry {
      return;
    }
    // union by rank
    match self.rank[rx].cmp(&self.rank[ry]) {
      std::cmp::Ordering::Less => self.parent[rx] = ry,
      std::cmp::Ordering::Greater => self.parent[ry] = rx,
      std::cmp::Ordering::Equal => {
        self.parent[ry] = rx;
        self.rank[rx] += 1;
      }
    }
  }
}

/// Component membership over stored edges, ignoring direction.
///
/// Components are numbered in order of their smallest node index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Components {
  membership: Vec<Option<usize>>,
  sizes: Vec<usize>,
}

impl Components {
  pub(crate) fn compute(graph: &ViewpointGraph) -> Self {
    let slots = graph.slot_count();
    let mut uf = UnionFind::new(slots);
    for index in graph.node_indices() {
      for edge in graph.edges(index) {
        uf.union(edge.source, edge.target);
      }
    }

    let mut root_ids = vec![None; slots];
    let mut membership = vec![None; slots];
    let mut sizes = Vec::new();
    for index in graph.node_indices() {
      let root = uf.find(index);
      let id = *root_ids[root].get_or_insert_with(|| {
        sizes.push(0);
        sizes.len() - 1
      });
      sizes[id] += 1;
      membership[index] = Some(id);
    }

    Self { membership, sizes }
  }

  pub fn count(&self) -> usize {
    self.sizes.len()
  }

  pub fn component_of(&self, index: NodeIndex) -> Option<usize> {
    self.membership.get(index).copied().flatten()
  }

  pub fn size(&self, component: usize) -> usize {
    self.sizes.get(component).copied().unwrap_or(0)
  }

  /// Largest component, lowest id on ties.
  pub fn largest(&self) -> Option<usize> {
    let max = *self.sizes.iter().max()?;
    self.sizes.iter().position(|size| *size == max)
  }

  /// Member nodes in ascending index order.
  pub fn nodes_in(&self, component: usize) -> Vec<NodeIndex> {
    self
      .membership
      .iter()
      .enumerate()
      .filter_map(|(index, member)| (*member == Some(component)).then_some(index))
      .collect()
  }
}
