//! Path optimization over the viewpoint graph.
//!
//! - [`types`]: budgets, branches, results
//! - [`motions`]: shortest feasible motions (Dijkstra)
//! - [`optimizer`]: budgeted greedy insertion + 2-opt / exchange
//! - [`matchable`]: bridging low-overlap legs

pub mod matchable;
pub mod motions;
pub mod optimizer;
pub mod types;

pub use matchable::{make_sparse_matchable, MatchableStats};
pub use motions::{MotionTable, ShortestPaths};
pub use optimizer::{PathConfig, PathOptimizer, PathRequest};
pub use types::{BranchTotals, PathBranch, PathBudget, PathResult, ViewpointPath};
