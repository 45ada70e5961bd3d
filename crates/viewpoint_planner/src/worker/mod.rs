//! Background execution of planner requests.
//!
//! One dedicated thread takes requests from a bounded queue and runs them one
//! at a time. Regular operations run on a snapshot of the planner outside the
//! lock and are published in one step when they succeed, so callers reading
//! through [`PlannerWorker::with_planner`] never observe half-finished work.
//! Custom requests run under the lock with exclusive access.
//!
//! Pause and cancel are cooperative: the running operation observes them at
//! its checkpoints (between raycast row sweeps, growth iterations and
//! optimizer passes).

mod request;

pub use request::{Completion, CustomRequestHandle, CustomWork, OperationKind, Outcome, Request, RequestId};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, Sender, TrySendError};
use tracing::{debug, info, info_span, warn};
use web_time::Instant;

use crate::control::{Checkpoint, Interrupted};
use crate::error::{PlannerError, Result};
use crate::metrics::{OutcomeClass, PlannerMetrics};
use crate::octree::OccupancyVolume;
use crate::planner::{PlannerConfig, ViewpointPlanner};

/// Observable worker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
  Idle,
  Running(OperationKind),
  Paused(OperationKind),
  /// Done; the completion has not been drained yet.
  Finished(OperationKind),
}

impl WorkerState {
  pub fn operation(&self) -> Option<OperationKind> {
    match *self {
      WorkerState::Idle => None,
      WorkerState::Running(kind) | WorkerState::Paused(kind) | WorkerState::Finished(kind) => Some(kind),
    }
  }

  /// An operation is in flight (running or paused).
  pub fn is_busy(&self) -> bool {
    matches!(self, WorkerState::Running(_) | WorkerState::Paused(_))
  }
}

/// Queue sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
  /// Pending requests before `submit` fails with `QueueFull`.
  pub request_capacity: usize,
  /// Undrained completions kept; older ones are discarded.
  pub completion_capacity: usize,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      request_capacity: 16,
      completion_capacity: 64,
    }
  }
}

impl WorkerConfig {
  pub fn with_request_capacity(mut self, capacity: usize) -> Self {
    self.request_capacity = capacity.max(1);
    self
  }

  pub fn with_completion_capacity(mut self, capacity: usize) -> Self {
    self.completion_capacity = capacity.max(1);
    self
  }
}

type Envelope<V> = (RequestId, Request<V>);

struct Shared<V: OccupancyVolume + ?Sized> {
  planner: Mutex<ViewpointPlanner<V>>,
  state: Mutex<WorkerState>,
  wake: Condvar,
  pause: AtomicBool,
  cancel: AtomicBool,
  shutdown: AtomicBool,
  /// Checkpoints reached by the request in flight.
  progress: AtomicU64,
  /// Pause when `progress` reaches this value (0 = never).
  #[cfg(test)]
  pause_at: AtomicU64,
  metrics: Mutex<PlannerMetrics>,
}

impl<V: OccupancyVolume + ?Sized> Shared<V> {
  fn stop_requested(&self) -> bool {
    self.cancel.load(Ordering::Acquire) || self.shutdown.load(Ordering::Acquire)
  }

  fn notify(&self) {
    let _state = lock(&self.state);
    self.wake.notify_all();
  }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Checkpoint handed to operations running on the worker thread.
struct WorkerControl<'a, V: OccupancyVolume + ?Sized> {
  shared: &'a Shared<V>,
  kind: OperationKind,
}

impl<V: OccupancyVolume + ?Sized> Checkpoint for WorkerControl<'_, V> {
  fn checkpoint(&self) -> std::result::Result<(), Interrupted> {
    let shared = self.shared;
    let _reached = shared.progress.fetch_add(1, Ordering::AcqRel) + 1;
    #[cfg(test)]
    if shared.pause_at.load(Ordering::Acquire) == _reached {
      shared.pause.store(true, Ordering::Release);
    }
    if shared.stop_requested() {
      return Err(Interrupted);
    }
    if !shared.pause.load(Ordering::Acquire) {
      return Ok(());
    }

    let mut state = lock(&shared.state);
    while shared.pause.load(Ordering::Acquire) && !shared.stop_requested() {
      *state = WorkerState::Paused(self.kind);
      state = shared.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
    }
    *state = WorkerState::Running(self.kind);
    drop(state);

    if shared.stop_requested() {
      Err(Interrupted)
    } else {
      Ok(())
    }
  }
}

/// Handle to the planner worker thread. Dropping it cancels the running
/// operation, discards pending requests and joins the thread.
pub struct PlannerWorker<V: OccupancyVolume + ?Sized + 'static> {
  shared: Arc<Shared<V>>,
  requests: Option<Sender<Envelope<V>>>,
  completions: Receiver<Completion>,
  thread: Option<JoinHandle<()>>,
}

impl<V: OccupancyVolume + ?Sized + 'static> PlannerWorker<V> {
  pub fn spawn(planner: ViewpointPlanner<V>) -> Result<Self> {
    Self::spawn_with_config(planner, WorkerConfig::default())
  }

  pub fn spawn_with_config(planner: ViewpointPlanner<V>, config: WorkerConfig) -> Result<Self> {
    let (request_tx, request_rx) = channel::bounded::<Envelope<V>>(config.request_capacity.max(1));
    let (completion_tx, completion_rx) = channel::bounded(config.completion_capacity.max(1));

    let shared = Arc::new(Shared {
      planner: Mutex::new(planner),
      state: Mutex::new(WorkerState::Idle),
      wake: Condvar::new(),
      pause: AtomicBool::new(false),
      cancel: AtomicBool::new(false),
      shutdown: AtomicBool::new(false),
      progress: AtomicU64::new(0),
      #[cfg(test)]
      pause_at: AtomicU64::new(0),
      metrics: Mutex::new(PlannerMetrics::new()),
    });

    let worker_shared = Arc::clone(&shared);
    let overflow = completion_rx.clone();
    let thread = thread::Builder::new()
      .name("planner-worker".to_string())
      .spawn(move || run_worker(&worker_shared, &request_rx, &completion_tx, &overflow))?;

    info!(
      request_capacity = config.request_capacity,
      completion_capacity = config.completion_capacity,
      "planner worker started"
    );

    Ok(Self {
      shared,
      requests: Some(request_tx),
      completions: completion_rx,
      thread: Some(thread),
    })
  }

  /// Queue a request. Never blocks.
  pub fn submit(&self, request: Request<V>) -> Result<RequestId> {
    let sender = self.requests.as_ref().ok_or(PlannerError::WorkerShutdown)?;
    let id = RequestId::next();
    let kind = request.kind();
    match sender.try_send((id, request)) {
      Ok(()) => {
        debug!(%id, ?kind, "request queued");
        Ok(id)
      }
      Err(TrySendError::Full(_)) => {
        warn!(?kind, pending = sender.len(), "request queue full");
        Err(PlannerError::QueueFull)
      }
      Err(TrySendError::Disconnected(_)) => Err(PlannerError::WorkerShutdown),
    }
  }

  /// Run `work` on the worker with exclusive access to the planner.
  pub fn custom_request<T, F>(&self, work: F) -> Result<CustomRequestHandle<T>>
  where
    T: Send + 'static,
    F: FnOnce(&mut ViewpointPlanner<V>) -> T + Send + 'static,
  {
    let (result_tx, result_rx) = channel::bounded(1);
    let id = self.submit(Request::Custom(Box::new(move |planner| {
      // The caller may have dropped the handle.
      let _ = result_tx.send(work(planner));
    })))?;
    Ok(CustomRequestHandle::new(id, result_rx))
  }

  /// Requests are paused at the next checkpoint, including the first
  /// checkpoint of requests picked up later.
  pub fn pause(&self) {
    self.shared.pause.store(true, Ordering::Release);
    debug!("pause requested");
  }

  pub fn resume(&self) {
    self.shared.pause.store(false, Ordering::Release);
    self.shared.notify();
    debug!("resumed");
  }

  pub fn is_paused(&self) -> bool {
    self.shared.pause.load(Ordering::Acquire)
  }

  /// Interrupt the operation in flight. Returns false when nothing runs.
  pub fn cancel(&self) -> bool {
    let state = lock(&self.shared.state);
    if !state.is_busy() {
      return false;
    }
    self.shared.cancel.store(true, Ordering::Release);
    self.shared.wake.notify_all();
    debug!(state = ?*state, "cancel requested");
    true
  }

  pub fn state(&self) -> WorkerState {
    *lock(&self.shared.state)
  }

  /// Checkpoints the current (or last) request has reached so far.
  pub fn progress(&self) -> u64 {
    self.shared.progress.load(Ordering::Acquire)
  }

  /// Requests waiting to be picked up.
  pub fn pending_requests(&self) -> usize {
    self.requests.as_ref().map_or(0, Sender::len)
  }

  pub fn try_completion(&self) -> Option<Completion> {
    let completion = self.completions.try_recv().ok();
    self.settle();
    completion
  }

  pub fn drain_completions(&self) -> Vec<Completion> {
    let completions: Vec<_> = self.completions.try_iter().collect();
    self.settle();
    completions
  }

  pub fn wait_completion(&self, timeout: Duration) -> Option<Completion> {
    let completion = self.completions.recv_timeout(timeout).ok();
    self.settle();
    completion
  }

  /// Back to `Idle` once the last completion has been taken.
  fn settle(&self) {
    let mut state = lock(&self.shared.state);
    if matches!(*state, WorkerState::Finished(_)) && self.completions.is_empty() {
      *state = WorkerState::Idle;
    }
  }

  /// Read the published planner state. Blocks while a custom request or a
  /// publication holds the lock.
  pub fn with_planner<R>(&self, read: impl FnOnce(&ViewpointPlanner<V>) -> R) -> R {
    read(&*lock(&self.shared.planner))
  }

  /// Takes effect for requests picked up afterwards.
  pub fn update_config(&self, config: PlannerConfig) -> Result<()> {
    lock(&self.shared.planner).set_config(config)
  }

  pub fn metrics(&self) -> PlannerMetrics {
    lock(&self.shared.metrics).clone()
  }

  /// Stop the worker and wait for the thread to exit.
  pub fn shutdown(mut self) -> Result<()> {
    self.stop()
  }

  fn stop(&mut self) -> Result<()> {
    let Some(thread) = self.thread.take() else {
      return Ok(());
    };
    self.shared.shutdown.store(true, Ordering::Release);
    self.shared.notify();
    self.requests = None;
    thread.join().map_err(|_| PlannerError::WorkerShutdown)?;
    info!("planner worker stopped");
    Ok(())
  }
}

impl<V: OccupancyVolume + ?Sized + 'static> Drop for PlannerWorker<V> {
  fn drop(&mut self) {
    if let Err(err) = self.stop() {
      warn!("planner worker exited abnormally: {err}");
    }
  }
}

fn run_worker<V: OccupancyVolume + ?Sized>(
  shared: &Shared<V>,
  requests: &Receiver<Envelope<V>>,
  completions: &Sender<Completion>,
  overflow: &Receiver<Completion>,
) {
  while let Ok((id, request)) = requests.recv() {
    if shared.shutdown.load(Ordering::Acquire) {
      break;
    }
    let kind = request.kind();
    {
      let mut state = lock(&shared.state);
      shared.cancel.store(false, Ordering::Release);
      shared.progress.store(0, Ordering::Release);
      *state = WorkerState::Running(kind);
    }

    let _span = info_span!("planner_worker::request", id = id.get(), kind = ?kind).entered();
    let started = Instant::now();
    let outcome = execute(shared, kind, request);
    let elapsed_us = started.elapsed().as_micros() as u64;

    let class = match &outcome {
      Ok(outcome) if outcome.was_interrupted() => OutcomeClass::Interrupted,
      Ok(_) => OutcomeClass::Completed,
      Err(PlannerError::Interrupted(_)) => OutcomeClass::Interrupted,
      Err(_) => OutcomeClass::Failed,
    };
    match &outcome {
      Ok(_) => debug!(elapsed_us, ?class, "request completed"),
      Err(err) => info!(elapsed_us, "request ended: {err}"),
    }
    lock(&shared.metrics).record(kind, elapsed_us, class);

    let completion = Completion {
      id,
      kind,
      outcome,
      elapsed_us,
    };
    let mut state = lock(&shared.state);
    *state = WorkerState::Finished(kind);
    deliver(shared, completions, overflow, completion);
  }
  debug!("request queue closed");
}

/// Send a completion, discarding the oldest undrained one when full.
fn deliver<V: OccupancyVolume + ?Sized>(
  shared: &Shared<V>,
  completions: &Sender<Completion>,
  overflow: &Receiver<Completion>,
  completion: Completion,
) {
  let completion = match completions.try_send(completion) {
    Ok(()) => return,
    Err(TrySendError::Disconnected(_)) => return,
    Err(TrySendError::Full(completion)) => completion,
  };
  if let Ok(dropped) = overflow.try_recv() {
    warn!(id = %dropped.id, kind = ?dropped.kind, "completion queue full, discarding oldest completion");
    lock(&shared.metrics).record_dropped_completion();
  }
  if completions.try_send(completion).is_err() {
    warn!("completion could not be delivered");
  }
}

fn execute<V: OccupancyVolume + ?Sized>(shared: &Shared<V>, kind: OperationKind, request: Request<V>) -> Result<Outcome> {
  let control = WorkerControl { shared, kind };
  control.checkpoint()?;

  if let Request::Custom(work) = request {
    let mut planner = lock(&shared.planner);
    work(&mut *planner);
    return Ok(Outcome::Custom);
  }

  let mut working = lock(&shared.planner).snapshot();
  let outcome = run_request(&mut working, request, &control)?;

  let mut planner = lock(&shared.planner);
  planner.publish(working);
  let path_nodes = planner.path().node_count();
  lock(&shared.metrics).record_sizes(planner.graph().len(), planner.graph().edge_count(), path_nodes);
  Ok(outcome)
}

fn run_request<V: OccupancyVolume + ?Sized>(
  planner: &mut ViewpointPlanner<V>,
  request: Request<V>,
  checkpoint: &dyn Checkpoint,
) -> Result<Outcome> {
  let outcome = match request {
    Request::GrowGraph { count, region, seed } => {
      Outcome::GraphGrown(planner.grow_graph(count, region, seed, checkpoint)?)
    }
    Request::BuildMotions => Outcome::MotionsBuilt(planner.build_motions(checkpoint)?),
    Request::BuildPath(path_request) => Outcome::PathBuilt(planner.build_path(&path_request, checkpoint)?),
    Request::SolveTsp => Outcome::TspSolved(planner.solve_tsp(checkpoint)?),
    Request::Raycast { viewpoint, rect, mode } => {
      let result = planner.raycast(viewpoint, rect, mode, checkpoint)?;
      Outcome::Raycast {
        hits: result.hits.len(),
        information: result.information.total,
      }
    }
    Request::DumpMesh { pose } => Outcome::MeshDumped {
      samples: planner.dump_mesh(pose, checkpoint)?.samples.len(),
    },
    Request::MakeSparseMatchable => Outcome::SparseMatchable(planner.make_sparse_matchable(checkpoint)?),
    Request::MatchPoses { first, second } => {
      Outcome::PosesMatched(planner.match_poses(first, second, checkpoint)?.clone())
    }
    Request::Reset(scope) => {
      planner.reset(scope);
      Outcome::Reset(scope)
    }
    Request::Custom(work) => {
      work(planner);
      Outcome::Custom
    }
  };
  Ok(outcome)
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
