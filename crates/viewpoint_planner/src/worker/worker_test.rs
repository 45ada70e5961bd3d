use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use glam::DVec3;

use super::*;
use crate::camera::PinholeCamera;
use crate::control::Unattended;
use crate::octree::{DAabb3, OccupancyMap};
use crate::path::PathRequest;
use crate::planner::ResetScope;
use crate::raycast::RaycastMode;
use crate::test_utils::{block_map, fast_raycast, orbit_pose, small_camera};
use crate::viewpoint::Viewpoint;

const TIMEOUT: Duration = Duration::from_secs(10);

fn planner() -> ViewpointPlanner<OccupancyMap> {
  let config = PlannerConfig::default()
    .with_camera(small_camera())
    .with_raycast(fast_raycast());
  ViewpointPlanner::new(Arc::new(block_map()), config).expect("valid camera")
}

fn ring() -> DAabb3 {
  DAabb3::new(DVec3::new(-4.0, -4.0, 0.5), DVec3::new(4.0, 4.0, 2.5))
}

fn grow(seed: u64) -> Request<OccupancyMap> {
  Request::GrowGraph {
    count: 40,
    region: Some(ring()),
    seed,
  }
}

fn wait_for(worker: &PlannerWorker<OccupancyMap>, expected: WorkerState) -> bool {
  let deadline = std::time::Instant::now() + TIMEOUT;
  while std::time::Instant::now() < deadline {
    if worker.state() == expected {
      return true;
    }
    thread::sleep(Duration::from_millis(1));
  }
  false
}

fn node_positions(planner: &ViewpointPlanner<OccupancyMap>) -> Vec<DVec3> {
  planner.graph().nodes().map(|(_, node)| node.pose().position).collect()
}

#[test]
fn test_request_completes_and_publishes() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  assert_eq!(worker.state(), WorkerState::Idle);

  let id = worker.submit(grow(11)).unwrap();
  let completion = worker.wait_completion(TIMEOUT).expect("grow completes");

  assert_eq!(completion.id, id);
  assert_eq!(completion.kind, OperationKind::GrowGraph);
  let Ok(Outcome::GraphGrown(stats)) = completion.outcome else {
    panic!("unexpected outcome {:?}", completion.outcome);
  };
  assert!(stats.accepted > 0);
  assert_eq!(worker.with_planner(|planner| planner.graph().len()), stats.accepted);
  assert_eq!(worker.state(), WorkerState::Idle);
}

#[test]
fn test_full_pipeline_through_worker() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  let viewpoint = Viewpoint::new(orbit_pose(0.0, 5.0), Arc::new(small_camera()));

  let requests = vec![
    grow(11),
    Request::BuildMotions,
    Request::BuildPath(PathRequest::default()),
    Request::SolveTsp,
    Request::MakeSparseMatchable,
    Request::Raycast {
      viewpoint,
      rect: None,
      mode: RaycastMode::Default,
    },
    Request::DumpMesh {
      pose: orbit_pose(1.0, 5.0),
    },
    Request::MatchPoses {
      first: orbit_pose(0.0, 5.0),
      second: orbit_pose(0.3, 5.0),
    },
  ];
  let ids: Vec<_> = requests
    .into_iter()
    .map(|request| worker.submit(request).unwrap())
    .collect();
  assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

  let mut completions = Vec::new();
  while completions.len() < ids.len() {
    completions.push(worker.wait_completion(TIMEOUT).expect("request completes"));
  }

  // One at a time, in submission order.
  assert_eq!(completions.iter().map(|c| c.id).collect::<Vec<_>>(), ids);
  for completion in &completions {
    assert!(completion.is_ok(), "{:?} failed: {:?}", completion.kind, completion.outcome);
  }
  assert!(matches!(completions[5].outcome, Ok(Outcome::Raycast { hits, .. }) if hits > 0));
  assert!(matches!(completions[6].outcome, Ok(Outcome::MeshDumped { samples }) if samples > 0));

  worker.with_planner(|planner| {
    assert!(!planner.path().is_empty());
    assert!(planner.last_raycast().is_some());
    assert!(planner.last_match().is_some());
  });
}

#[test]
fn test_state_transitions() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

  let handle = worker
    .custom_request(move |planner| {
      let _ = release_rx.recv();
      planner.graph().len() + 7
    })
    .unwrap();
  let id = handle.id();

  assert!(wait_for(&worker, WorkerState::Running(OperationKind::CustomRequest)));
  release_tx.send(()).unwrap();
  assert_eq!(handle.wait().unwrap(), 7);

  assert!(wait_for(&worker, WorkerState::Finished(OperationKind::CustomRequest)));
  let completion = worker.try_completion().expect("completion queued");
  assert_eq!(completion.id, id);
  assert!(matches!(completion.outcome, Ok(Outcome::Custom)));
  assert_eq!(worker.state(), WorkerState::Idle);
}

#[test]
fn test_pause_resume_is_transparent() {
  let mut direct = planner();
  direct.grow_graph(40, Some(ring()), 5, &Unattended).unwrap();

  let worker = PlannerWorker::spawn(planner()).unwrap();
  worker.pause();
  worker.submit(grow(5)).unwrap();

  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::GrowGraph)));
  // Nothing is published while paused.
  assert_eq!(worker.with_planner(|planner| planner.graph().len()), 0);

  worker.resume();
  let completion = worker.wait_completion(TIMEOUT).expect("grow completes");
  assert!(completion.is_ok());

  assert_eq!(worker.with_planner(node_positions), node_positions(&direct));
}

/// Pause the next request once it reaches its `checkpoint`-th safe point.
fn pause_at_checkpoint(worker: &PlannerWorker<OccupancyMap>, checkpoint: u64) {
  worker.shared.pause_at.store(checkpoint, Ordering::Release);
}

#[test]
fn test_pause_mid_growth_is_transparent() {
  let mut direct = planner();
  direct.grow_graph(40, Some(ring()), 5, &Unattended).unwrap();

  let worker = PlannerWorker::spawn(planner()).unwrap();
  pause_at_checkpoint(&worker, 6);
  worker.submit(grow(5)).unwrap();

  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::GrowGraph)));
  // Five samples are done, the rest are still to come.
  assert_eq!(worker.progress(), 6);
  assert_eq!(worker.with_planner(|planner| planner.graph().len()), 0);

  worker.resume();
  let completion = worker.wait_completion(TIMEOUT).expect("grow completes");
  assert!(completion.is_ok());
  assert!(!completion.was_interrupted());
  assert!(worker.progress() > 6);

  assert_eq!(worker.with_planner(node_positions), node_positions(&direct));
}

#[test]
fn test_pause_mid_path_is_transparent() {
  let mut direct = planner();
  direct.grow_graph(40, Some(ring()), 11, &Unattended).unwrap();
  direct.build_motions(&Unattended).unwrap();
  let worker = PlannerWorker::spawn(direct.snapshot()).unwrap();
  direct.build_path(&PathRequest::default(), &Unattended).unwrap();

  pause_at_checkpoint(&worker, 2);
  worker.submit(Request::BuildPath(PathRequest::default())).unwrap();
  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::BuildPath)));
  assert_eq!(worker.progress(), 2);

  worker.resume();
  let completion = worker.wait_completion(TIMEOUT).expect("path completes");
  assert!(matches!(&completion.outcome, Ok(Outcome::PathBuilt(result)) if !result.interrupted));

  worker.with_planner(|planner| {
    assert_eq!(planner.path(), direct.path());
    assert_eq!(planner.coverage().len(), direct.coverage().len());
  });
}

#[test]
fn test_cancel_mid_growth_keeps_partial_graph() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  pause_at_checkpoint(&worker, 6);
  worker.submit(grow(5)).unwrap();
  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::GrowGraph)));

  assert!(worker.cancel());
  let completion = worker.wait_completion(TIMEOUT).expect("cancelled request reports");
  let Ok(Outcome::GraphGrown(stats)) = &completion.outcome else {
    panic!("unexpected outcome {:?}", completion.outcome);
  };
  assert!(stats.interrupted);
  assert_eq!(stats.sampled, 5);
  assert!(completion.was_interrupted());
  assert_eq!(worker.with_planner(|planner| planner.graph().len()), stats.accepted);

  #[cfg(feature = "metrics")]
  {
    let metrics = worker.metrics();
    let grow = metrics.operation(OperationKind::GrowGraph).expect("grow recorded");
    assert_eq!((grow.interrupted, grow.completed), (1, 0));
  }
}

#[test]
fn test_cancel_interrupts_running_request() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  assert!(!worker.cancel());

  worker.pause();
  worker.submit(grow(9)).unwrap();
  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::GrowGraph)));

  assert!(worker.cancel());
  let completion = worker.wait_completion(TIMEOUT).expect("cancelled request reports");
  assert!(completion.was_interrupted());
  assert_eq!(worker.with_planner(|planner| planner.graph().len()), 0);
  assert_eq!(worker.state(), WorkerState::Idle);

  // A later request is unaffected by the earlier cancel.
  worker.resume();
  worker.submit(grow(9)).unwrap();
  let completion = worker.wait_completion(TIMEOUT).expect("grow completes");
  assert!(completion.is_ok());
}

#[test]
fn test_cancelled_custom_request_drops_handle() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  worker.pause();

  let handle = worker.custom_request(|planner| planner.graph().len()).unwrap();
  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::CustomRequest)));
  assert!(worker.cancel());

  assert!(matches!(handle.wait(), Err(PlannerError::CustomRequestDropped)));
}

#[test]
fn test_full_request_queue() {
  let config = WorkerConfig::default().with_request_capacity(1);
  let worker = PlannerWorker::spawn_with_config(planner(), config).unwrap();
  worker.pause();

  let first = worker.submit(Request::Reset(ResetScope::Path)).unwrap();
  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::Reset)));
  let second = worker.submit(Request::BuildMotions).unwrap();
  assert!(matches!(worker.submit(Request::SolveTsp), Err(PlannerError::QueueFull)));
  assert_eq!(worker.pending_requests(), 1);

  worker.resume();
  let a = worker.wait_completion(TIMEOUT).unwrap();
  let b = worker.wait_completion(TIMEOUT).unwrap();
  assert_eq!((a.id, a.kind), (first, OperationKind::Reset));
  assert_eq!((b.id, b.kind), (second, OperationKind::BuildMotions));
  assert!(matches!(b.outcome, Err(PlannerError::EmptyGraph)));
}

#[test]
fn test_undrained_completions_drop_oldest() {
  let config = WorkerConfig::default().with_completion_capacity(2);
  let worker = PlannerWorker::spawn_with_config(planner(), config).unwrap();

  let resets: Vec<_> = (0..3)
    .map(|_| worker.submit(Request::Reset(ResetScope::Graph)).unwrap())
    .collect();
  let handle = worker.custom_request(|_| ()).unwrap();
  let last = handle.id();
  handle.wait().unwrap();
  assert!(wait_for(&worker, WorkerState::Finished(OperationKind::CustomRequest)));

  let kept: Vec<_> = worker.drain_completions().into_iter().map(|c| c.id).collect();
  assert_eq!(kept, vec![resets[2], last]);
  assert_eq!(worker.state(), WorkerState::Idle);
}

#[test]
fn test_update_config_is_kept_across_publish() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  let camera = PinholeCamera::simple(16, 12, 12.0);
  let config = worker.with_planner(|planner| planner.config().clone()).with_camera(camera);

  worker.update_config(config.clone()).unwrap();
  worker.submit(grow(1)).unwrap();
  worker.wait_completion(TIMEOUT).expect("grow completes");

  assert_eq!(worker.with_planner(|planner| planner.config().clone()), config);
  let bad = config.with_camera(PinholeCamera::simple(0, 12, 12.0));
  assert!(worker.update_config(bad).is_err());
}

#[test]
fn test_drop_while_paused_releases_pending_work() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  worker.pause();
  worker.submit(grow(2)).unwrap();
  let queued = worker.custom_request(|_| 1).unwrap();
  assert!(wait_for(&worker, WorkerState::Paused(OperationKind::GrowGraph)));

  drop(worker);

  assert!(matches!(queued.wait(), Err(PlannerError::CustomRequestDropped)));
}

#[test]
fn test_shutdown_joins_thread() {
  let worker = PlannerWorker::spawn(planner()).unwrap();
  worker.submit(Request::Reset(ResetScope::Graph)).unwrap();
  assert!(worker.shutdown().is_ok());
}
