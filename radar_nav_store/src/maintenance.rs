// Map maintenance workflows over a chunk store.
//
// `MapMaintenance` is what a mapping loop talks to. It owns one
// `SpatialChunkStore` and its `StoreConfig` and offers the operations a
// long-running mapper needs:
// - `ingest_scan`: forward a scan's solid voxels and ore hits into the store
//   and record `metadata["last_scan"]`; enforce the voxel cap if configured.
// - `reduce_points`: blunt global cap, keeping every Nth point per chunk.
// - `thin`: density-aware thinning with the configured parameters.
// - `record_positions`, `store_named_path`, `build_known_path`: flight
//   history and routes through places already seen.
// - `rebuild_occupancy`: an `OccupancyMap` from stored voxels after restart.
// - `find_nearest_ores`: resource lookup around a point.
// - `forget_region`: drop a mined-out sphere from the store and,
//   optionally, from the caller's live map.
//
// See also: `store.rs` for the storage primitives, `radar_nav_map` for the
// occupancy map and scan types.

use crate::backend::ChunkBackend;
use crate::chunk::{ChunkId, ChunkKind, PointKind};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{ClearStats, SpatialChunkStore, point_key};
use crate::thinning::ThinningStats;
use radar_nav_map::types::{distance, distance_sq};
use radar_nav_map::{OccupancyMap, OreHit, ScanPayload, WorldPoint};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::cmp::Ordering;

const LAST_SCAN_KEY: &str = "last_scan";

/// What one `ingest_scan` call changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub voxels_added: usize,
    pub ores_added: usize,
    /// Set when the voxel cap forced a reduction.
    pub reduced: Option<ReduceStats>,
}

/// Counts from `reduce_points`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReduceStats {
    pub before: usize,
    pub after: usize,
    /// Every `step`-th point of each chunk was kept.
    pub step: usize,
}

/// An ore hit and its distance from the query point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearbyOre {
    pub distance: f64,
    pub ore: OreHit,
}

/// Counts from `forget_region`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForgetSummary {
    pub store: ClearStats,
    /// Occupancy cells cleared in the caller's map, if one was given.
    pub map_cells_cleared: usize,
}

/// Lexicographic order on coordinates, used to break distance ties.
fn cmp_points(a: &WorldPoint, b: &WorldPoint) -> Ordering {
    a[0].total_cmp(&b[0])
        .then_with(|| a[1].total_cmp(&b[1]))
        .then_with(|| a[2].total_cmp(&b[2]))
}

/// Store-level maintenance for one mapped area.
#[derive(Debug)]
pub struct MapMaintenance<B: ChunkBackend> {
    store: SpatialChunkStore<B>,
    config: StoreConfig,
}

impl<B: ChunkBackend> MapMaintenance<B> {
    /// Validate `config` and open a store on `backend` at its chunk size.
    pub fn open(backend: B, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let store = SpatialChunkStore::open(backend, config.chunk_size)?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &SpatialChunkStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SpatialChunkStore<B> {
        &mut self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn into_store(self) -> SpatialChunkStore<B> {
        self.store
    }

    // -----------------------------------------------------------------------
    // Ingestion and size control
    // -----------------------------------------------------------------------

    /// Persist a scan's solid voxels and ore hits.
    ///
    /// Bounding boxes are not stored: they describe other grids, which move.
    pub fn ingest_scan(&mut self, scan: &ScanPayload) -> Result<IngestSummary> {
        scan.validate()?;
        let voxels = scan.solid_world_points();
        let voxels_added = self.store.add_points(PointKind::Voxels, &voxels)?;
        let ores_added = self.store.add_ores(&scan.ores)?;

        self.store.set_metadata(
            LAST_SCAN_KEY,
            &serde_json::json!({
                "revision": scan.revision,
                "timestampMs": scan.timestamp_ms,
                "origin": scan.origin,
                "cellSize": scan.cell_size,
                "size": scan.size,
                "solidCount": voxels.len(),
                "oreCount": scan.ores.len(),
                "contactCount": scan.contacts.len(),
            }),
        )?;

        let reduced = match self.config.max_voxel_points {
            Some(max) => {
                let stats = self.reduce_points(max)?;
                (stats.after < stats.before).then_some(stats)
            }
            None => None,
        };

        tracing::debug!(
            revision = scan.revision,
            voxels_added,
            ores_added,
            reduced = reduced.is_some(),
            "ingested scan into store"
        );
        Ok(IngestSummary {
            voxels_added,
            ores_added,
            reduced,
        })
    }

    /// Keep every Nth point of each voxel chunk when the total exceeds
    /// `max_points`, with `N = ceil(total / max_points)`.
    pub fn reduce_points(&mut self, max_points: usize) -> Result<ReduceStats> {
        if max_points == 0 {
            return Err(StoreError::InvalidConfig(
                "max_points must be at least 1".to_string(),
            ));
        }
        let before = self.store.total_points(ChunkKind::Voxels)?;
        if before <= max_points {
            return Ok(ReduceStats {
                before,
                after: before,
                step: 1,
            });
        }

        let step = before.div_ceil(max_points);
        let ids: Vec<ChunkId> = self.store.index().voxels.iter().copied().collect();
        let mut after = 0;
        for id in ids {
            let points = self.store.read_points(PointKind::Voxels, id)?;
            let kept: Vec<WorldPoint> = points.iter().copied().step_by(step).collect();
            after += kept.len();
            if kept.len() < points.len() {
                self.store.write_points(PointKind::Voxels, id, &kept)?;
            }
        }
        tracing::info!(before, after, step, max_points, "reduced voxel points");
        Ok(ReduceStats {
            before,
            after,
            step,
        })
    }

    /// Density thinning with the configured parameters.
    pub fn thin(&mut self) -> Result<ThinningStats> {
        let params = self.config.thinning;
        self.store.thin_voxel_density(&params)
    }

    // -----------------------------------------------------------------------
    // Flight history and routes
    // -----------------------------------------------------------------------

    /// Add positions to the visited history. Returns how many were new.
    pub fn record_positions(&mut self, positions: &[WorldPoint]) -> Result<usize> {
        self.store.add_points(PointKind::Visited, positions)
    }

    pub fn store_named_path(&self, name: &str, points: &[WorldPoint]) -> Result<()> {
        self.store.save_path(name, points)
    }

    /// Route from `start` through already-known points.
    ///
    /// Greedy: repeatedly hop to the nearest unused visited or voxel point
    /// until `target` is reached or `max_hops` hops are used. The result
    /// starts at `start` and, when a target is given, always ends at it.
    pub fn build_known_path(
        &self,
        start: WorldPoint,
        target: Option<WorldPoint>,
        max_hops: usize,
    ) -> Result<Vec<WorldPoint>> {
        let known = self.store.load(&[ChunkKind::Visited, ChunkKind::Voxels], None)?;
        let mut seen: FxHashSet<[u64; 3]> = FxHashSet::default();
        seen.insert(point_key(start));
        let mut remaining: Vec<WorldPoint> = known
            .visited
            .iter()
            .chain(&known.voxels)
            .chain(target.as_ref())
            .copied()
            .filter(|&p| seen.insert(point_key(p)))
            .collect();

        let mut path = vec![start];
        let mut current = start;
        for _ in 0..max_hops {
            let nearest = remaining.iter().enumerate().min_by(|(_, a), (_, b)| {
                distance_sq(current, **a)
                    .total_cmp(&distance_sq(current, **b))
                    .then_with(|| cmp_points(a, b))
            });
            let Some((i, _)) = nearest else {
                break;
            };
            current = remaining.swap_remove(i);
            path.push(current);
            if target.is_some_and(|t| point_key(t) == point_key(current)) {
                break;
            }
        }

        if let Some(t) = target {
            if path.last().map(|&p| point_key(p)) != Some(point_key(t)) {
                path.push(t);
            }
        }
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Map and resource queries
    // -----------------------------------------------------------------------

    /// Rebuild an occupancy map from stored voxels within `radius` of
    /// `center`. `None` when no voxel is stored there.
    pub fn rebuild_occupancy(
        &self,
        center: WorldPoint,
        radius: f64,
        cell_size: f64,
    ) -> Result<Option<OccupancyMap>> {
        let r_sq = radius * radius;
        let voxels: Vec<WorldPoint> = self
            .store
            .load_region(center, radius, &[ChunkKind::Voxels])?
            .voxels
            .into_iter()
            .filter(|&p| distance_sq(p, center) <= r_sq)
            .collect();
        if voxels.is_empty() {
            return Ok(None);
        }
        let map = OccupancyMap::from_solid_points(&voxels, cell_size)?;
        tracing::info!(
            points = voxels.len(),
            solid = map.solid_count(),
            dims = ?map.dims(),
            "rebuilt occupancy from store"
        );
        Ok(Some(map))
    }

    /// Ore hits within `radius` of `center`, nearest first, at most
    /// `max_results` of them.
    pub fn find_nearest_ores(
        &self,
        center: WorldPoint,
        radius: f64,
        max_results: usize,
    ) -> Result<Vec<NearbyOre>> {
        let mut found: Vec<NearbyOre> = self
            .store
            .load_region(center, radius, &[ChunkKind::Ores])?
            .ores
            .into_iter()
            .map(|ore| NearbyOre {
                distance: distance(center, ore.position),
                ore,
            })
            .filter(|hit| hit.distance <= radius)
            .collect();
        found.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.ore.material.cmp(&b.ore.material))
                .then_with(|| cmp_points(&a.ore.position, &b.ore.position))
        });
        found.truncate(max_results);
        Ok(found)
    }

    /// Forget everything within `radius` of `center`: stored records of the
    /// given kinds and, when `map` is given, its solid cells in that sphere.
    ///
    /// A bad centre or radius fails before either side is touched.
    pub fn forget_region(
        &mut self,
        center: WorldPoint,
        radius: f64,
        kinds: &[ChunkKind],
        map: Option<&mut OccupancyMap>,
    ) -> Result<ForgetSummary> {
        let store = self.store.clear_region(center, radius, kinds)?;
        let map_cells_cleared = match map {
            Some(m) => m.clear_sphere(center, radius)?,
            None => 0,
        };
        Ok(ForgetSummary {
            store,
            map_cells_cleared,
        })
    }
}
