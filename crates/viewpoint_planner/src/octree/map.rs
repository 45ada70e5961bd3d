//! OccupancyMap - in-memory sparse implementation of [`OccupancyVolume`].
//!
//! Cells are stored in a flat hash map keyed by [`VoxelKey`]; the hierarchy
//! is implicit and resolved by walking ancestor keys on lookup.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DAabb3, OccupancyConfig, OccupancyVolume, VoxelCell, VoxelKey};
use crate::error::{PlannerError, Result};

pub const MAP_FORMAT_VERSION: u32 = 1;

/// Sparse cell map. Callers keep stored cells non-overlapping.
#[derive(Clone, Debug, Default)]
pub struct OccupancyMap {
  config: OccupancyConfig,
  cells: HashMap<VoxelKey, VoxelCell>,
  bounds: Option<DAabb3>,
  /// Coarsest LOD present, bounds the ancestor walk in lookups.
  coarsest_lod: i32,
}

#[derive(Serialize, Deserialize)]
struct MapFile {
  version: u32,
  config: OccupancyConfig,
  cells: Vec<CellRecord>,
}

#[derive(Serialize, Deserialize)]
struct CellRecord {
  key: VoxelKey,
  cell: VoxelCell,
}

impl OccupancyMap {
  pub fn new(config: OccupancyConfig) -> Self {
    Self {
      config,
      cells: HashMap::new(),
      bounds: None,
      coarsest_lod: 0,
    }
  }

  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  pub fn get(&self, key: &VoxelKey) -> Option<&VoxelCell> {
    self.cells.get(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&VoxelKey, &VoxelCell)> {
    self.cells.iter()
  }

  /// Store a cell, replacing any previous value under the same key.
  ///
  /// Keys outside `0..=max_lod` are ignored.
  pub fn insert(&mut self, key: VoxelKey, cell: VoxelCell) -> Option<VoxelCell> {
    if key.lod < 0 || key.lod > self.config.max_lod {
      warn!(?key, max_lod = self.config.max_lod, "ignoring cell outside the LOD range");
      return None;
    }
    let cell_bounds = self.config.get_cell_bounds(&key);
    self.bounds = Some(match self.bounds {
      Some(bounds) => bounds.union(&cell_bounds),
      None => cell_bounds,
    });
    self.coarsest_lod = self.coarsest_lod.max(key.lod);
    self.cells.insert(key, cell)
  }

  /// Store a cell at the LOD 0 key containing `point`.
  pub fn insert_point(&mut self, point: DVec3, cell: VoxelCell) -> VoxelKey {
    let key = self.config.key_at(point, 0);
    self.insert(key, cell);
    key
  }

  /// Fill every LOD 0 cell whose center lies inside `region`. Returns the
  /// number of cells written.
  pub fn fill_box(&mut self, region: &DAabb3, cell: VoxelCell) -> usize {
    let lo = self.config.key_at(region.min, 0);
    let hi = self.config.key_at(region.max, 0);
    let mut written = 0;
    for x in lo.x..=hi.x {
      for y in lo.y..=hi.y {
        for z in lo.z..=hi.z {
          let key = VoxelKey::new(x, y, z, 0);
          if region.contains_point(self.config.get_cell_center(&key)) {
            self.insert(key, cell);
            written += 1;
          }
        }
      }
    }
    written
  }

  pub fn remove(&mut self, key: &VoxelKey) -> Option<VoxelCell> {
    let removed = self.cells.remove(key)?;
    self.recompute_extent();
    Some(removed)
  }

  fn recompute_extent(&mut self) {
    let config = &self.config;
    self.bounds = self
      .cells
      .keys()
      .map(|key| config.get_cell_bounds(key))
      .reduce(|a, b| a.union(&b));
    self.coarsest_lod = self.cells.keys().map(|key| key.lod).max().unwrap_or(0);
  }

  pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
    let file: MapFile = serde_json::from_reader(reader)?;
    if file.version != MAP_FORMAT_VERSION {
      return Err(PlannerError::UnsupportedVersion {
        kind: "occupancy map",
        found: file.version,
        expected: MAP_FORMAT_VERSION,
      });
    }
    let mut map = Self::new(file.config);
    for record in file.cells {
      map.insert(record.key, record.cell);
    }
    Ok(map)
  }

  /// Write as JSON. Cells are sorted by key so output is reproducible.
  pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
    let mut cells: Vec<CellRecord> = self
      .cells
      .iter()
      .map(|(key, cell)| CellRecord {
        key: *key,
        cell: *cell,
      })
      .collect();
    cells.sort_by_key(|record| record.key);
    let file = MapFile {
      version: MAP_FORMAT_VERSION,
      config: self.config.clone(),
      cells,
    };
    serde_json::to_writer(writer, &file)?;
    Ok(())
  }

  pub fn load(path: &Path) -> Result<Self> {
    let map = Self::from_reader(BufReader::new(File::open(path)?))?;
    debug!(path = %path.display(), cells = map.len(), "loaded occupancy map");
    Ok(map)
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    self.to_writer(&mut writer)?;
    writer.flush()?;
    Ok(())
  }
}

impl OccupancyVolume for OccupancyMap {
  fn config(&self) -> &OccupancyConfig {
    &self.config
  }

  fn bounds(&self) -> Option<DAabb3> {
    self.bounds
  }

  fn cell(&self, key: &VoxelKey) -> Option<VoxelCell> {
    self.cells.get(key).copied()
  }

  fn leaf_containing(&self, key: &VoxelKey) -> Option<(VoxelKey, VoxelCell)> {
    (key.lod.max(0)..=self.coarsest_lod).find_map(|lod| {
      let ancestor = key.ancestor_at(lod)?;
      self.cells.get(&ancestor).map(|cell| (ancestor, *cell))
    })
  }

  fn cell_count(&self) -> usize {
    self.cells.len()
  }

  fn for_each_cell(&self, visit: &mut dyn FnMut(&VoxelKey, &VoxelCell)) {
    for (key, cell) in &self.cells {
      visit(key, cell);
    }
  }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod map_test;
