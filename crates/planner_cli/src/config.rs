//! Configuration parsing for batch viewpoint planning.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use viewpoint_planner::{DAabb3, ExportFormat, PathBudget, PathRequest, PlannerConfig};

/// Root configuration for a planning run.
#[derive(Debug, Deserialize)]
pub struct Config {
	/// Output directory relative to the config file.
	pub output_dir: String,
	/// Seed of the first growth round; later rounds use consecutive seeds.
	#[serde(default)]
	pub seed: u64,
	/// Candidate poses sampled per growth round.
	pub samples: usize,
	#[serde(default = "default_grow_rounds")]
	pub grow_rounds: usize,
	/// Sampling region (default: configured region of interest or volume bounds).
	#[serde(default)]
	pub region: Option<RegionConfig>,
	/// Synthetic scene used when no occupancy map is given on the command line.
	#[serde(default)]
	pub scene: Option<SceneConfig>,
	/// Camera, raycast, graph and path settings.
	#[serde(default)]
	pub planner: PlannerConfig,
	#[serde(default)]
	pub path: PathPlanConfig,
	#[serde(default = "default_exports")]
	pub exports: Vec<ExportFormat>,
}

/// Axis-aligned box given by two corners.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RegionConfig {
	pub min: [f64; 3],
	pub max: [f64; 3],
}

impl RegionConfig {
	pub fn to_aabb(self) -> DAabb3 {
		DAabb3::new(self.min.into(), self.max.into())
	}
}

/// Boxes of occupied cells on a grid.
#[derive(Debug, Deserialize)]
pub struct SceneConfig {
	/// Edge length of the finest cells in meters.
	#[serde(default = "default_resolution")]
	pub resolution: f64,
	/// Observation count written into every occupied cell.
	#[serde(default = "default_observations")]
	pub observations: u32,
	pub boxes: Vec<RegionConfig>,
}

/// Path request and post-processing steps.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathPlanConfig {
	/// Motion cost budget per branch (unlimited when absent).
	pub max_cost: Option<f64>,
	/// Viewpoint budget per branch (unlimited when absent).
	pub max_nodes: Option<usize>,
	pub branches: usize,
	/// Plan inside one connected component only.
	pub component: Option<usize>,
	pub solve_tsp: bool,
	pub sparse_matchable: bool,
}

impl Default for PathPlanConfig {
	fn default() -> Self {
		Self {
			max_cost: None,
			max_nodes: None,
			branches: 1,
			component: None,
			solve_tsp: true,
			sparse_matchable: true,
		}
	}
}

impl PathPlanConfig {
	pub fn request(&self) -> PathRequest {
		PathRequest {
			budget: PathBudget {
				max_cost: self.max_cost,
				max_nodes: self.max_nodes,
			},
			branch_count: self.branches,
			component: self.component,
		}
	}
}

fn default_grow_rounds() -> usize {
	1
}

fn default_resolution() -> f64 {
	0.25
}

fn default_observations() -> u32 {
	4
}

fn default_exports() -> Vec<ExportFormat> {
	vec![ExportFormat::Text, ExportFormat::Json, ExportFormat::Colmap]
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let config: Config =
			toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;

		if config.samples == 0 {
			anyhow::bail!("samples must be positive");
		}
		if config.grow_rounds == 0 {
			anyhow::bail!("grow_rounds must be positive");
		}
		if config.path.branches == 0 {
			anyhow::bail!("path.branches must be positive");
		}
		if let Some(max_cost) = config.path.max_cost {
			if !(max_cost > 0.0) {
				anyhow::bail!("path.max_cost must be positive, got {}", max_cost);
			}
		}
		if let Some(scene) = &config.scene {
			if !(scene.resolution > 0.0) {
				anyhow::bail!("scene.resolution must be positive, got {}", scene.resolution);
			}
			if scene.boxes.is_empty() {
				anyhow::bail!("scene must have at least one box");
			}
		}
		config
			.planner
			.camera
			.validate()
			.context("Invalid camera in planner config")?;

		Ok(config)
	}
}
