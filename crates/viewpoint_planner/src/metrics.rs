//! Operation timing and outcome counters for the planner worker.
//!
//! Compiled in with the `metrics` feature and toggled at runtime through
//! [`COLLECT_METRICS`]. With the feature off every `record_*` call is a
//! no-op.
//!
//! ```ignore
//! use viewpoint_planner::metrics::COLLECT_METRICS;
//!
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//! let metrics = worker.metrics();
//! println!("{:.1} us per path", metrics.average_us(OperationKind::BuildPath));
//! ```

use std::collections::{BTreeMap, VecDeque};
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicBool;

use crate::worker::OperationKind;

/// Set to false to stop recording without rebuilding.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// True only with the `metrics` feature compiled in and the toggle set.
#[inline]
pub fn is_enabled() -> bool {
    #[cfg(feature = "metrics")]
    {
        COLLECT_METRICS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Recent wall times of one operation kind, in microseconds.
///
/// Holds at most `capacity` samples; pushing past that discards the
/// oldest sample.
#[derive(Debug, Clone)]
pub struct TimingHistory {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl TimingHistory {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, elapsed_us: u64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed_us);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Oldest first.
    pub fn samples(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }

    pub fn latest(&self) -> Option<u64> {
        self.samples.back().copied()
    }

    pub fn total_us(&self) -> u64 {
        self.samples().sum()
    }

    pub fn mean_us(&self) -> f64 {
        match self.samples.len() {
            0 => 0.0,
            n => self.total_us() as f64 / n as f64,
        }
    }

    /// Fastest and slowest retained sample.
    pub fn spread(&self) -> Option<(u64, u64)> {
        self.samples().fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }
}

impl Default for TimingHistory {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

/// How a request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeClass {
    Completed,
    Failed,
    Interrupted,
}

/// Counters and timings of one operation kind.
#[derive(Debug, Clone, Default)]
pub struct OperationMetrics {
    pub timings: TimingHistory,
    pub completed: u64,
    pub failed: u64,
    pub interrupted: u64,
}

impl OperationMetrics {
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.interrupted
    }
}

/// Session statistics collected by the planner worker.
#[derive(Debug, Clone, Default)]
pub struct PlannerMetrics {
    pub operations: BTreeMap<OperationKind, OperationMetrics>,
    /// Completions dropped because the consumer did not drain them.
    pub dropped_completions: u64,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub path_nodes: usize,
}

impl PlannerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears timings and sizes. Outcome counters are cumulative and kept.
    pub fn reset(&mut self) {
        for operation in self.operations.values_mut() {
            operation.timings.clear();
        }
        self.graph_nodes = 0;
        self.graph_edges = 0;
        self.path_nodes = 0;
    }

    pub fn record(&mut self, kind: OperationKind, elapsed_us: u64, outcome: OutcomeClass) {
        if !is_enabled() {
            return;
        }
        let operation = self.operations.entry(kind).or_default();
        operation.timings.record(elapsed_us);
        match outcome {
            OutcomeClass::Completed => operation.completed += 1,
            OutcomeClass::Failed => operation.failed += 1,
            OutcomeClass::Interrupted => operation.interrupted += 1,
        }
    }

    pub fn record_dropped_completion(&mut self) {
        if is_enabled() {
            self.dropped_completions += 1;
        }
    }

    pub fn record_sizes(&mut self, graph_nodes: usize, graph_edges: usize, path_nodes: usize) {
        if is_enabled() {
            self.graph_nodes = graph_nodes;
            self.graph_edges = graph_edges;
            self.path_nodes = path_nodes;
        }
    }

    pub fn operation(&self, kind: OperationKind) -> Option<&OperationMetrics> {
        self.operations.get(&kind)
    }

    /// Mean wall time in microseconds, 0 when nothing was recorded.
    pub fn average_us(&self, kind: OperationKind) -> f64 {
        self.operation(kind).map_or(0.0, |operation| operation.timings.mean_us())
    }

    pub fn last_us(&self, kind: OperationKind) -> Option<u64> {
        self.operation(kind).and_then(|operation| operation.timings.latest())
    }
}
