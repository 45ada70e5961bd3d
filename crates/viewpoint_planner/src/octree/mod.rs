//! Sparse octree volume consumed by the planner.
//!
//! The tree is implicit: only leaf cells are stored, and parent/child
//! relationships are computed on demand via coordinate math.
//!
//! # LOD Convention
//!
//! LOD 0 = finest detail (smallest cells), higher LOD = coarser.
//!
//! ```text
//! Cell Size = resolution * 2^LOD
//! ```
//!
//! # Module Structure
//!
//! - [`key`]: `VoxelKey` - weak cell reference (grid coordinates + LOD)
//! - [`config`]: `OccupancyConfig` - coordinate math and thresholds
//! - [`volume`]: `OccupancyVolume` - read-only contract used by the planner
//! - [`map`]: `OccupancyMap` - in-memory implementation with JSON I/O

pub mod bounds;
pub mod config;
pub mod key;
pub mod map;
pub mod volume;

// Re-exports
pub use bounds::DAabb3;
pub use config::OccupancyConfig;
pub use key::VoxelKey;
pub use map::OccupancyMap;
pub use volume::{CellState, OccupancyVolume, VoxelCell};
