//! Path optimization cost on a sampled viewpoint graph.
//!
//! The graph is grown once around a block scene; each iteration builds a
//! fresh path under a different cost budget, and the TSP benchmark re-orders
//! the unlimited path.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use viewpoint_planner::octree::VoxelCell;
use viewpoint_planner::{
  DAabb3, OccupancyConfig, OccupancyMap, PathBudget, PathRequest, PinholeCamera, PlannerConfig,
  RaycastConfig, Unattended, ViewpointPlanner,
};

fn grown_planner(samples: usize) -> ViewpointPlanner<OccupancyMap> {
  let mut map = OccupancyMap::new(OccupancyConfig::default().with_resolution(0.5));
  map.fill_box(
    &DAabb3::new(DVec3::new(-2.0, -2.0, 0.0), DVec3::new(2.0, 2.0, 3.0)),
    VoxelCell::occupied(4),
  );
  let config = PlannerConfig::default()
    .with_camera(PinholeCamera::simple(64, 48, 48.0))
    .with_raycast(RaycastConfig::default().with_pixel_stride(2));

  let mut planner = ViewpointPlanner::new(Arc::new(map), config).expect("valid camera");
  let region = DAabb3::new(DVec3::new(-8.0, -8.0, 0.5), DVec3::new(8.0, 8.0, 4.0));
  planner
    .grow_graph(samples, Some(region), 42, &Unattended)
    .expect("volume is not empty");
  planner
}

fn bench_build_path(c: &mut Criterion) {
  let planner = grown_planner(200);

  let mut group = c.benchmark_group("build_path");
  group.sample_size(20);
  for max_cost in [10.0, 40.0, f64::INFINITY] {
    let budget = if max_cost.is_finite() {
      PathBudget::UNLIMITED.with_max_cost(max_cost)
    } else {
      PathBudget::UNLIMITED
    };
    let request = PathRequest {
      budget,
      ..PathRequest::default()
    };
    group.bench_with_input(BenchmarkId::new("max_cost", max_cost), &request, |b, request| {
      b.iter_batched(
        || planner.snapshot(),
        |mut working| black_box(working.build_path(request, &Unattended)),
        criterion::BatchSize::SmallInput,
      )
    });
  }
  group.finish();
}

fn bench_solve_tsp(c: &mut Criterion) {
  let mut planner = grown_planner(120);
  planner
    .build_path(&PathRequest::default(), &Unattended)
    .expect("graph has nodes");

  c.bench_function("solve_tsp (120 samples)", |b| {
    b.iter_batched(
      || planner.snapshot(),
      |mut working| black_box(working.solve_tsp(&Unattended)),
      criterion::BatchSize::SmallInput,
    )
  });
}

criterion_group!(benches, bench_build_path, bench_solve_tsp);
criterion_main!(benches);
