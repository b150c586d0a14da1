// Density thinning of voxel point sets.
//
// Dense voxel chunks are reduced by bucketing their points into a secondary
// grid of cubic cells of edge `resolution` (anchored at world zero, and
// independent of the chunk size) and keeping at most `max_points_per_cell`
// points per cell, first come first kept. A cell containing any known ore
// position is exempt and keeps every point, so mining targets are never
// pruned out of the map. Chunks holding `min_points_to_thin` points or
// fewer are left alone.
//
// See also: `store.rs` (`SpatialChunkStore::thin_voxel_density`) which loads
// the chunks, runs this in parallel and writes the results back.

use crate::chunk::ChunkId;
use crate::error::{Result, StoreError};
use radar_nav_map::WorldPoint;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Integer coordinates of a secondary thinning cell.
pub type SecondaryCell = (i64, i64, i64);

/// Thinning tunables.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThinningParams {
    /// Edge length of a secondary cell in world units.
    pub resolution: f64,
    /// Chunks with this many points or fewer are not thinned.
    pub min_points_to_thin: usize,
    pub max_points_per_cell: usize,
}

impl Default for ThinningParams {
    fn default() -> Self {
        Self {
            resolution: 5.0,
            min_points_to_thin: 1000,
            max_points_per_cell: 1,
        }
    }
}

impl ThinningParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(StoreError::InvalidConfig(format!(
                "thinning resolution must be positive, got {}",
                self.resolution
            )));
        }
        if self.max_points_per_cell == 0 {
            return Err(StoreError::InvalidConfig(
                "max_points_per_cell must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Secondary cell containing `point`.
    pub fn cell_of(&self, point: WorldPoint) -> SecondaryCell {
        (
            (point[0] / self.resolution).floor() as i64,
            (point[1] / self.resolution).floor() as i64,
            (point[2] / self.resolution).floor() as i64,
        )
    }
}

/// Before/after counts for one thinned chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkThinning {
    pub chunk: ChunkId,
    pub before: usize,
    pub after: usize,
}

impl ChunkThinning {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Result of one thinning pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ThinningStats {
    /// Chunks that were over the threshold, in chunk order.
    pub chunks: Vec<ChunkThinning>,
    /// Voxel chunks at or under the threshold.
    pub chunks_skipped: usize,
    pub total_before: usize,
    pub total_after: usize,
}

impl ThinningStats {
    pub fn total_removed(&self) -> usize {
        self.total_before - self.total_after
    }
}

/// Thin one chunk's points. Order of surviving points is preserved.
pub fn thin_points(
    points: &[WorldPoint],
    ore_cells: &FxHashSet<SecondaryCell>,
    params: &ThinningParams,
) -> Vec<WorldPoint> {
    let mut per_cell: FxHashMap<SecondaryCell, usize> = FxHashMap::default();
    points
        .iter()
        .copied()
        .filter(|&p| {
            let cell = params.cell_of(p);
            if ore_cells.contains(&cell) {
                return true;
            }
            let kept = per_cell.entry(cell).or_insert(0);
            if *kept < params.max_points_per_cell {
                *kept += 1;
                true
            } else {
                false
            }
        })
        .collect()
}
