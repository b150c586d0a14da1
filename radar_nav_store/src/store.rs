// Chunked spatial point store.
//
// `SpatialChunkStore` persists sparse point sets (`voxels`, `visited`) and
// ore records (`ores`) bucketed into cubic chunks, so region queries only
// read the chunks they need. It owns the chunk index in memory and writes
// it back through the backend after every mutation that changes it.
//
// Chunk payloads are JSON: `[[x, y, z], ...]` for point kinds and
// `[{material, position, content}, ...]` for ores.
//
// Merge rules:
// - points: set union on exact coordinate equality (`-0.0 == 0.0`);
// - ores: one record per `(material, position)`; the latest content wins.
//
// Invariant: a chunk id is in `index[kind]` iff its record is non-empty.
// Writes that leave a record empty delete it and drop it from the index.
//
// See also: `backend.rs` for the persistence seam, `thinning.rs` for the
// density reduction rule, `maintenance.rs` for the higher-level workflows.

use crate::backend::{ChunkBackend, MetadataMap, PathMap};
use crate::chunk::{ChunkId, ChunkIndex, ChunkKind, PointKind};
use crate::error::{Result, StoreError};
use crate::thinning::{ChunkThinning, SecondaryCell, ThinningParams, ThinningStats, thin_points};
use radar_nav_map::types::distance_sq;
use radar_nav_map::{OreHit, WorldPoint, check_region};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

/// Relative tolerance when comparing a persisted chunk size to a configured one.
const CHUNK_SIZE_TOLERANCE: f64 = 1e-9;

/// Exact-equality key for a point. Normalises `-0.0` to `0.0`.
pub(crate) fn point_key(p: WorldPoint) -> [u64; 3] {
    [
        (p[0] + 0.0).to_bits(),
        (p[1] + 0.0).to_bits(),
        (p[2] + 0.0).to_bits(),
    ]
}

/// Reject coordinates that cannot be bucketed or written as JSON numbers.
fn check_finite(point: WorldPoint) -> Result<()> {
    if point.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(StoreError::InvalidConfig(format!(
            "point {point:?} has a non-finite coordinate"
        )))
    }
}

fn check_sphere(center: WorldPoint, radius: f64) -> Result<()> {
    check_region(center, radius).map_err(|e| StoreError::InvalidConfig(e.to_string()))
}

/// Points and ores gathered from a set of chunks, in chunk order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MapSnapshot {
    pub voxels: Vec<WorldPoint>,
    pub visited: Vec<WorldPoint>,
    pub ores: Vec<OreHit>,
}

impl MapSnapshot {
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty() && self.visited.is_empty() && self.ores.is_empty()
    }

    /// Point list for a point kind.
    pub fn points(&self, kind: PointKind) -> &[WorldPoint] {
        match kind {
            PointKind::Voxels => &self.voxels,
            PointKind::Visited => &self.visited,
        }
    }
}

/// Counts from `clear_region`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClearStats {
    pub voxels_removed: usize,
    pub visited_removed: usize,
    pub ores_removed: usize,
    /// Chunk records that lost at least one entry.
    pub chunks_affected: usize,
    /// Chunk records left empty and deleted.
    pub chunks_deleted: usize,
}

impl ClearStats {
    pub fn total_removed(&self) -> usize {
        self.voxels_removed + self.visited_removed + self.ores_removed
    }

    pub fn removed(&self, kind: ChunkKind) -> usize {
        match kind {
            ChunkKind::Voxels => self.voxels_removed,
            ChunkKind::Visited => self.visited_removed,
            ChunkKind::Ores => self.ores_removed,
        }
    }

    fn record(&mut self, kind: ChunkKind, removed: usize, deleted: bool) {
        match kind {
            ChunkKind::Voxels => self.voxels_removed += removed,
            ChunkKind::Visited => self.visited_removed += removed,
            ChunkKind::Ores => self.ores_removed += removed,
        }
        self.chunks_affected += 1;
        if deleted {
            self.chunks_deleted += 1;
        }
    }
}

/// Chunked point and ore storage over a `ChunkBackend`.
#[derive(Debug)]
pub struct SpatialChunkStore<B: ChunkBackend> {
    backend: B,
    index: ChunkIndex,
}

impl<B: ChunkBackend> SpatialChunkStore<B> {
    /// Open a store, creating its index on first use.
    ///
    /// Fails with `ChunkSizeMismatch` when the backend already holds data
    /// bucketed at a different chunk size.
    pub fn open(backend: B, chunk_size: f64) -> Result<Self> {
        if !(chunk_size.is_finite() && chunk_size > 0.0) {
            return Err(StoreError::InvalidConfig(format!(
                "chunk size must be positive, got {chunk_size}"
            )));
        }
        let index = match backend.load_index()? {
            Some(index) => {
                let tolerance = CHUNK_SIZE_TOLERANCE * chunk_size.max(index.chunk_size);
                if (index.chunk_size - chunk_size).abs() > tolerance {
                    return Err(StoreError::ChunkSizeMismatch {
                        stored: index.chunk_size,
                        configured: chunk_size,
                    });
                }
                tracing::debug!(
                    chunks = index.chunk_count(),
                    chunk_size,
                    "opened existing chunk store"
                );
                index
            }
            None => {
                let index = ChunkIndex::new(chunk_size);
                backend.save_index(&index)?;
                tracing::debug!(chunk_size, "created chunk store");
                index
            }
        };
        Ok(Self { backend, index })
    }

    pub fn chunk_size(&self) -> f64 {
        self.index.chunk_size
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn chunk_id_for(&self, point: WorldPoint) -> ChunkId {
        ChunkId::for_point(point, self.index.chunk_size)
    }

    fn group_by_chunk<T: Clone>(
        &self,
        items: &[T],
        position: impl Fn(&T) -> WorldPoint,
    ) -> BTreeMap<ChunkId, Vec<T>> {
        let mut groups: BTreeMap<ChunkId, Vec<T>> = BTreeMap::new();
        for item in items {
            groups
                .entry(self.chunk_id_for(position(item)))
                .or_default()
                .push(item.clone());
        }
        groups
    }

    // -----------------------------------------------------------------------
    // Chunk record I/O
    // -----------------------------------------------------------------------

    /// Points in one chunk record; empty when the record is absent.
    pub(crate) fn read_points(&self, kind: PointKind, id: ChunkId) -> Result<Vec<WorldPoint>> {
        match self.backend.load_chunk(kind.into(), id)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn read_ores(&self, id: ChunkId) -> Result<Vec<OreHit>> {
        match self.backend.load_chunk(ChunkKind::Ores, id)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Write or delete one record and keep the in-memory index in step.
    /// Returns whether the index changed.
    fn put_record<T: Serialize>(
        &mut self,
        kind: ChunkKind,
        id: ChunkId,
        items: &[T],
    ) -> Result<bool> {
        if items.is_empty() {
            self.backend.delete_chunk(kind, id)?;
            Ok(self.index.ids_mut(kind).remove(&id))
        } else {
            self.backend.save_chunk(kind, id, &serde_json::to_vec(items)?)?;
            Ok(self.index.ids_mut(kind).insert(id))
        }
    }

    /// Replace one point chunk wholesale. An empty list deletes it.
    pub(crate) fn write_points(
        &mut self,
        kind: PointKind,
        id: ChunkId,
        points: &[WorldPoint],
    ) -> Result<()> {
        if self.put_record(kind.into(), id, points)? {
            self.backend.save_index(&self.index)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Union `points` into their chunks. Returns how many were new.
    ///
    /// Nothing is written when any point has a non-finite coordinate.
    pub fn add_points(&mut self, kind: PointKind, points: &[WorldPoint]) -> Result<usize> {
        points.iter().try_for_each(|&p| check_finite(p))?;
        let mut added = 0;
        let mut index_changed = false;
        for (id, incoming) in self.group_by_chunk(points, |p| *p) {
            let mut existing = self.read_points(kind, id)?;
            let mut seen: FxHashSet<[u64; 3]> = existing.iter().map(|&p| point_key(p)).collect();
            let before = existing.len();
            for p in incoming {
                if seen.insert(point_key(p)) {
                    existing.push(p);
                }
            }
            if existing.len() > before {
                added += existing.len() - before;
                index_changed |= self.put_record(kind.into(), id, &existing)?;
            }
        }
        if index_changed {
            self.backend.save_index(&self.index)?;
        }
        tracing::debug!(
            kind = %ChunkKind::from(kind),
            offered = points.len(),
            added,
            "added points"
        );
        Ok(added)
    }

    /// Merge ore records by `(material, position)`. Returns how many were new.
    ///
    /// Nothing is written when any position has a non-finite coordinate.
    pub fn add_ores(&mut self, ores: &[OreHit]) -> Result<usize> {
        ores.iter().try_for_each(|o| check_finite(o.position))?;
        let mut added = 0;
        let mut index_changed = false;
        for (id, incoming) in self.group_by_chunk(ores, |o| o.position) {
            let mut existing = self.read_ores(id)?;
            let mut slots: FxHashMap<(String, [u64; 3]), usize> = existing
                .iter()
                .enumerate()
                .map(|(i, o)| ((o.material.clone(), point_key(o.position)), i))
                .collect();
            for ore in incoming {
                let key = (ore.material.clone(), point_key(ore.position));
                match slots.get(&key) {
                    Some(&i) => existing[i].content = ore.content,
                    None => {
                        slots.insert(key, existing.len());
                        existing.push(ore);
                        added += 1;
                    }
                }
            }
            index_changed |= self.put_record(ChunkKind::Ores, id, &existing)?;
        }
        if index_changed {
            self.backend.save_index(&self.index)?;
        }
        tracing::debug!(offered = ores.len(), added, "added ores");
        Ok(added)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Gather every listed chunk of one kind into `out`. Chunks whose payload
    /// does not decode are skipped with a warning.
    fn load_kind<'i>(
        &self,
        kind: ChunkKind,
        ids: impl IntoIterator<Item = &'i ChunkId>,
        out: &mut MapSnapshot,
    ) -> Result<()> {
        for &id in ids {
            let loaded = match PointKind::try_from(kind) {
                Ok(PointKind::Voxels) => self
                    .read_points(PointKind::Voxels, id)
                    .map(|p| out.voxels.extend(p)),
                Ok(PointKind::Visited) => self
                    .read_points(PointKind::Visited, id)
                    .map(|p| out.visited.extend(p)),
                Err(_) => self.read_ores(id).map(|o| out.ores.extend(o)),
            };
            match loaded {
                Ok(()) => {}
                Err(StoreError::Serde(err)) => {
                    tracing::warn!(%kind, chunk = %id, %err, "skipping undecodable chunk");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Load the requested kinds from every indexed chunk, or only from
    /// indexed chunks that are also in `chunk_ids` when given.
    pub fn load(&self, kinds: &[ChunkKind], chunk_ids: Option<&[ChunkId]>) -> Result<MapSnapshot> {
        let mut out = MapSnapshot::default();
        for &kind in kinds {
            let indexed = self.index.ids(kind);
            match chunk_ids {
                None => self.load_kind(kind, indexed, &mut out)?,
                Some(requested) => {
                    let mut ids: Vec<ChunkId> =
                        requested.iter().copied().filter(|id| indexed.contains(id)).collect();
                    ids.sort_unstable();
                    ids.dedup();
                    self.load_kind(kind, &ids, &mut out)?;
                }
            }
        }
        Ok(out)
    }

    /// Indexed chunks of `kind` whose cube comes within `radius` of `center`.
    ///
    /// Errors on a non-finite centre or a negative or non-finite radius.
    pub fn chunks_in_region(
        &self,
        kind: ChunkKind,
        center: WorldPoint,
        radius: f64,
    ) -> Result<Vec<ChunkId>> {
        check_sphere(center, radius)?;
        let chunk_size = self.index.chunk_size;
        Ok(self
            .index
            .ids(kind)
            .iter()
            .copied()
            .filter(|id| id.intersects_sphere(chunk_size, center, radius))
            .collect())
    }

    /// Load every chunk that could hold data within `radius` of `center`.
    /// Whole chunks are returned, so points beyond `radius` may appear.
    pub fn load_region(
        &self,
        center: WorldPoint,
        radius: f64,
        kinds: &[ChunkKind],
    ) -> Result<MapSnapshot> {
        check_sphere(center, radius)?;
        let mut out = MapSnapshot::default();
        for &kind in kinds {
            let ids = self.chunks_in_region(kind, center, radius)?;
            self.load_kind(kind, &ids, &mut out)?;
        }
        Ok(out)
    }

    /// Number of points (or ore records) stored for `kind`.
    pub fn total_points(&self, kind: ChunkKind) -> Result<usize> {
        let mut total = 0;
        for &id in self.index.ids(kind) {
            total += match PointKind::try_from(kind) {
                Ok(point_kind) => self.read_points(point_kind, id)?.len(),
                Err(_) => self.read_ores(id)?.len(),
            };
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Drop every point and ore within `radius` of `center`; keep the rest.
    /// Chunks left empty are deleted. A bad centre or radius is rejected
    /// before anything is touched.
    pub fn clear_region(
        &mut self,
        center: WorldPoint,
        radius: f64,
        kinds: &[ChunkKind],
    ) -> Result<ClearStats> {
        check_sphere(center, radius)?;
        let r_sq = radius * radius;
        let outside = |p: WorldPoint| distance_sq(p, center) > r_sq;
        let mut stats = ClearStats::default();
        let mut index_changed = false;

        for &kind in kinds {
            for id in self.chunks_in_region(kind, center, radius)? {
                let (removed, remaining) = match PointKind::try_from(kind) {
                    Ok(point_kind) => {
                        let mut points = self.read_points(point_kind, id)?;
                        let before = points.len();
                        points.retain(|&p| outside(p));
                        let removed = before - points.len();
                        if removed > 0 {
                            index_changed |= self.put_record(kind, id, &points)?;
                        }
                        (removed, points.len())
                    }
                    Err(_) => {
                        let mut ores = self.read_ores(id)?;
                        let before = ores.len();
                        ores.retain(|o| outside(o.position));
                        let removed = before - ores.len();
                        if removed > 0 {
                            index_changed |= self.put_record(kind, id, &ores)?;
                        }
                        (removed, ores.len())
                    }
                };
                if removed > 0 {
                    stats.record(kind, removed, remaining == 0);
                }
            }
        }
        if index_changed {
            self.backend.save_index(&self.index)?;
        }
        tracing::info!(
            ?center,
            radius,
            removed = stats.total_removed(),
            chunks_affected = stats.chunks_affected,
            chunks_deleted = stats.chunks_deleted,
            "cleared region"
        );
        Ok(stats)
    }

    /// Thin dense voxel chunks, sparing secondary cells that hold ores.
    /// Rewrites chunk records in place; not reversible.
    pub fn thin_voxel_density(&mut self, params: &ThinningParams) -> Result<ThinningStats> {
        params.validate()?;

        let ore_ids: Vec<ChunkId> = self.index.ores.iter().copied().collect();
        let mut ore_cells: FxHashSet<SecondaryCell> = FxHashSet::default();
        for id in ore_ids {
            ore_cells.extend(self.read_ores(id)?.iter().map(|o| params.cell_of(o.position)));
        }

        let mut stats = ThinningStats::default();
        let mut candidates = Vec::new();
        let voxel_ids: Vec<ChunkId> = self.index.voxels.iter().copied().collect();
        for id in voxel_ids {
            let points = self.read_points(PointKind::Voxels, id)?;
            if points.len() > params.min_points_to_thin {
                candidates.push((id, points));
            } else {
                stats.chunks_skipped += 1;
            }
        }

        let thinned: Vec<(ChunkId, usize, Vec<WorldPoint>)> = candidates
            .into_par_iter()
            .map(|(id, points)| {
                let kept = thin_points(&points, &ore_cells, params);
                (id, points.len(), kept)
            })
            .collect();

        for (id, before, kept) in thinned {
            if kept.len() < before {
                self.write_points(PointKind::Voxels, id, &kept)?;
            }
            stats.total_before += before;
            stats.total_after += kept.len();
            stats.chunks.push(ChunkThinning {
                chunk: id,
                before,
                after: kept.len(),
            });
        }

        tracing::info!(
            chunks = stats.chunks.len(),
            skipped = stats.chunks_skipped,
            before = stats.total_before,
            after = stats.total_after,
            "thinned voxel density"
        );
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Paths and metadata
    // -----------------------------------------------------------------------

    pub fn save_path(&self, name: &str, points: &[WorldPoint]) -> Result<()> {
        self.backend.save_path(name, points)
    }

    pub fn load_paths(&self) -> Result<PathMap> {
        self.backend.load_paths()
    }

    pub fn set_metadata(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.backend.save_metadata_entry(key, value)
    }

    pub fn metadata(&self) -> Result<MetadataMap> {
        self.backend.load_metadata()
    }

    /// Approximate bytes used by everything this store has persisted.
    pub fn storage_size(&self) -> Result<u64> {
        self.backend.storage_size()
    }

    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }
}
