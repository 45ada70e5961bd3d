//! Batch viewpoint planner.
//!
//! Grows a viewpoint graph around an occupancy map, builds a budgeted capture
//! path through it and writes the graph, the path and pose exports.
//!
//! Output files:
//! - graph.json / path.json: versioned planner state, reloadable
//! - path.txt: one pose per line (branch, node, position, quaternion)
//! - path_poses.json: the same poses as JSON
//! - colmap/: cameras.txt, images.txt, points3D.txt

mod config;
mod scene;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use viewpoint_planner::{
	Completion, ExportFormat, OccupancyMap, OccupancyVolume, Outcome, PlannerWorker, Request, RequestId,
	ViewpointPlanner,
};

use config::{Config, RegionConfig};

/// Viewpoint planner for 3D reconstruction capture.
#[derive(Parser, Debug)]
#[command(name = "plan_viewpoints")]
#[command(about = "Plans an information-maximizing camera path through an occupancy map")]
struct Args {
	/// Path to configuration TOML file.
	#[arg(short, long)]
	config: PathBuf,

	/// Occupancy map JSON (default: the synthetic scene from the config).
	#[arg(short, long)]
	volume: Option<PathBuf>,

	/// Output directory (default: output_dir relative to the config file).
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Override the sampling seed.
	#[arg(long)]
	seed: Option<u64>,

	/// Log filter, e.g. "info" or "viewpoint_planner=debug".
	#[arg(long, default_value = "info")]
	log: String,
}

fn main() -> Result<()> {
	let args = Args::parse();

	let filter = EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info"));
	fmt().with_env_filter(filter).with_target(true).compact().init();

	let config = Config::load(&args.config)?;
	let base_dir = args.config.parent().unwrap_or(Path::new(".")).to_path_buf();
	let output_dir = args.output.clone().unwrap_or_else(|| base_dir.join(&config.output_dir));

	let volume = match (&args.volume, &config.scene) {
		(Some(path), _) => scene::load_volume(path)?,
		(None, Some(scene)) => scene::build_scene(scene),
		(None, None) => anyhow::bail!("No occupancy map given and the config has no [scene] section"),
	};
	let bounds = volume.bounds().context("Occupancy volume is empty")?;
	info!(cells = volume.len(), min = ?bounds.min, max = ?bounds.max, "volume ready");

	std::fs::create_dir_all(&output_dir)
		.with_context(|| format!("Failed to create output dir: {}", output_dir.display()))?;

	let planner = ViewpointPlanner::new(Arc::new(volume), config.planner.clone())
		.context("Failed to create planner")?;
	let worker = PlannerWorker::spawn(planner).context("Failed to start planner worker")?;

	for request in requests(&config, args.seed.unwrap_or(config.seed)) {
		let kind = request.kind();
		let id = worker
			.submit(request)
			.with_context(|| format!("Failed to submit {:?}", kind))?;
		let completion = wait_for(&worker, id);
		report(&completion);
		if let Err(err) = completion.outcome {
			return Err(err).with_context(|| format!("{:?} failed", kind));
		}
	}

	worker.with_planner(|planner| export(planner, &config.exports, &output_dir))?;
	let (nodes, cost, information) = worker.with_planner(|planner| {
		let path = planner.path();
		(path.node_count(), path.total_cost(), path.total_information())
	});
	worker.shutdown().context("Planner worker did not stop cleanly")?;

	println!(
		"\nPlanned {} viewpoints (cost {:.2}, information {:.2})",
		nodes, cost, information
	);
	println!("Done! Output written to: {}", output_dir.display());

	Ok(())
}

/// Requests of one planning run, in execution order.
fn requests(config: &Config, seed: u64) -> Vec<Request<OccupancyMap>> {
	let region = config.region.map(RegionConfig::to_aabb);
	let mut requests: Vec<_> = (0..config.grow_rounds)
		.map(|round| Request::GrowGraph {
			count: config.samples,
			region,
			seed: seed.wrapping_add(round as u64),
		})
		.collect();

	requests.push(Request::BuildMotions);
	requests.push(Request::BuildPath(config.path.request()));
	if config.path.solve_tsp {
		requests.push(Request::SolveTsp);
	}
	if config.path.sparse_matchable {
		requests.push(Request::MakeSparseMatchable);
	}
	requests
}

/// Block until the completion of `id` arrives.
fn wait_for(worker: &PlannerWorker<OccupancyMap>, id: RequestId) -> Completion {
	loop {
		match worker.wait_completion(Duration::from_secs(5)) {
			Some(completion) if completion.id == id => return completion,
			Some(other) => warn!(id = %other.id, "unexpected completion"),
			None => info!(state = ?worker.state(), "still working"),
		}
	}
}

fn report(completion: &Completion) {
	let ms = completion.elapsed_us as f64 / 1000.0;
	match &completion.outcome {
		Ok(Outcome::GraphGrown(stats)) => info!(
			ms,
			sampled = stats.sampled,
			accepted = stats.accepted,
			rejected = stats.rejected.total(),
			isolated = stats.isolated,
			"graph grown"
		),
		Ok(Outcome::MotionsBuilt(stats)) => info!(
			ms,
			edges = stats.edges_added,
			infeasible = stats.infeasible,
			"motions built"
		),
		Ok(Outcome::PathBuilt(result)) | Ok(Outcome::TspSolved(result)) => info!(
			ms,
			kind = ?completion.kind,
			viewpoints = result.path.node_count(),
			branches = result.path.branches.len(),
			budget_limited = result.budget_limited,
			information = result.information_gained,
			"path updated"
		),
		Ok(Outcome::SparseMatchable(stats)) => info!(
			ms,
			inserted = stats.nodes_inserted,
			unbridged = stats.unbridged,
			"path made matchable"
		),
		Ok(other) => info!(ms, outcome = ?other, "request completed"),
		Err(err) => warn!(ms, kind = ?completion.kind, "request failed: {err}"),
	}
}

fn export(planner: &ViewpointPlanner<OccupancyMap>, formats: &[ExportFormat], output_dir: &Path) -> Result<()> {
	let graph_file = output_dir.join("graph.json");
	planner
		.save_graph(&graph_file)
		.with_context(|| format!("Failed to write: {}", graph_file.display()))?;
	let path_file = output_dir.join("path.json");
	planner
		.save_path(&path_file)
		.with_context(|| format!("Failed to write: {}", path_file.display()))?;

	for &format in formats {
		let target = match format {
			ExportFormat::Text => output_dir.join("path.txt"),
			ExportFormat::Json => output_dir.join("path_poses.json"),
			ExportFormat::Colmap => output_dir.join("colmap"),
		};
		planner
			.export_path(format, &target)
			.with_context(|| format!("Failed to export {:?} to {}", format, target.display()))?;
		println!("  ✓ {}", target.display());
	}
	Ok(())
}
