//! Occupancy volumes for a planning run.

use anyhow::{Context, Result};
use std::path::Path;
use viewpoint_planner::octree::VoxelCell;
use viewpoint_planner::{OccupancyConfig, OccupancyMap};

use crate::config::SceneConfig;

/// Load an occupancy map saved as JSON.
pub fn load_volume(path: &Path) -> Result<OccupancyMap> {
	OccupancyMap::load(path)
		.with_context(|| format!("Failed to load occupancy map: {}", path.display()))
}

/// Fill the configured boxes with occupied cells.
pub fn build_scene(scene: &SceneConfig) -> OccupancyMap {
	let mut map = OccupancyMap::new(OccupancyConfig::default().with_resolution(scene.resolution));
	let cell = VoxelCell::occupied(scene.observations);
	for region in &scene.boxes {
		map.fill_box(&region.to_aabb(), cell);
	}
	map
}
