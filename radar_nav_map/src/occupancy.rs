// Dense 3D occupancy grid built incrementally from radar scans.
//
// The grid is stored as a flat `Vec<bool>` indexed by
// `x * size_y * size_z + y * size_z + z` (the radar's own linear order),
// giving O(1) read/write access. `true` means solid. Out-of-bounds reads
// return non-solid; out-of-bounds writes are no-ops.
//
// Ingestion (`ingest`) follows "latest scan wins inside its frame":
// 1. The first scan defines origin, cell size and dimensions.
// 2. Later scans must use the same cell size. If a scan's frame reaches
//    outside the grid, the grid is reallocated to the union of both
//    boxes, keeping the existing lattice (the origin only moves by whole
//    cells) and copying old occupancy to its offset.
// 3. Every cell whose centre lies in the new scan's frame is cleared and
//    then rewritten from the scan, so voxels mined out in-game disappear.
//    Cells outside the frame keep whatever earlier scans said.
// 4. Revision, timestamp and contacts are replaced, never merged.
//
// The map never shrinks. `clear_sphere` sets cells back to non-solid
// without touching the dimensions.
//
// Y is up: the traversable surface is "non-solid with solid directly
// below along axis 1".
//
// See also: `scan.rs` for payload decoding, `pathfinding.rs` for the
// search that consumes a read-only borrow of this map.

use crate::error::{MapError, Result, check_region};
use crate::scan::{ScanPayload, SolidCells};
use crate::types::{CellCoord, Contact, WorldPoint, distance_sq};
use rayon::prelude::*;
use std::ops::Range;

/// Slack for float comparisons against lattice boundaries, in cells.
const LATTICE_EPSILON: f64 = 1e-9;

/// A boolean value per grid cell, in the grid's linear order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellMask {
    dims: [usize; 3],
    cells: Vec<bool>,
}

impl CellMask {
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Value at a coordinate; `false` outside the grid.
    pub fn get(&self, coord: CellCoord) -> bool {
        linear_index(self.dims, coord)
            .map(|i| self.cells[i])
            .unwrap_or(false)
    }

    /// Number of `true` cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.cells
    }
}

/// Flat index for a coordinate in a grid of `dims`. `None` when out of bounds.
pub fn linear_index(dims: [usize; 3], coord: CellCoord) -> Option<usize> {
    if coord.x < 0 || coord.y < 0 || coord.z < 0 {
        return None;
    }
    let (x, y, z) = (coord.x as usize, coord.y as usize, coord.z as usize);
    if x >= dims[0] || y >= dims[1] || z >= dims[2] {
        return None;
    }
    Some((x * dims[1] + y) * dims[2] + z)
}

/// Inverse of `linear_index`.
pub fn coord_of(dims: [usize; 3], index: usize) -> CellCoord {
    let yz = dims[1] * dims[2];
    let x = index / yz;
    let rem = index % yz;
    CellCoord::new(x as i32, (rem / dims[2]) as i32, (rem % dims[2]) as i32)
}

/// Whether two cell sizes describe the same resolution.
fn same_cell_size(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

/// Dense 3D solid/non-solid grid.
#[derive(Clone, Debug, Default)]
pub struct OccupancyMap {
    /// Flat storage: index = x * size_y * size_z + y * size_z + z.
    cells: Vec<bool>,
    origin: WorldPoint,
    cell_size: f64,
    dims: [usize; 3],
    revision: u64,
    timestamp_ms: u64,
    contacts: Vec<Contact>,
}

impl OccupancyMap {
    /// Create an all-empty grid.
    pub fn new(origin: WorldPoint, cell_size: f64, dims: [usize; 3]) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(MapError::InvalidCellSize(cell_size));
        }
        if dims.contains(&0) {
            return Err(MapError::EmptyGrid(dims));
        }
        Ok(Self {
            cells: vec![false; dims[0] * dims[1] * dims[2]],
            origin,
            cell_size,
            dims,
            revision: 0,
            timestamp_ms: 0,
            contacts: Vec::new(),
        })
    }

    /// Build a map from a single scan.
    pub fn from_scan(scan: &ScanPayload) -> Result<Self> {
        let mut map = Self::default();
        map.ingest(scan)?;
        Ok(map)
    }

    /// Rebuild a map from persisted solid voxel centres.
    ///
    /// The lattice is anchored at world zero so maps rebuilt from the same
    /// points line up with each other. One empty cell of padding is left on
    /// every side so the top surface has standing room.
    pub fn from_solid_points(points: &[WorldPoint], cell_size: f64) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(MapError::InvalidCellSize(cell_size));
        }
        if points.is_empty() {
            return Err(MapError::EmptyGrid([0, 0, 0]));
        }
        let mut lo = [i64::MAX; 3];
        let mut hi = [i64::MIN; 3];
        for p in points {
            for a in 0..3 {
                let c = (p[a] / cell_size).floor() as i64;
                lo[a] = lo[a].min(c);
                hi[a] = hi[a].max(c);
            }
        }
        let origin = [
            (lo[0] - 1) as f64 * cell_size,
            (lo[1] - 1) as f64 * cell_size,
            (lo[2] - 1) as f64 * cell_size,
        ];
        let dims = [
            (hi[0] - lo[0] + 3) as usize,
            (hi[1] - lo[1] + 3) as usize,
            (hi[2] - lo[2] + 3) as usize,
        ];
        let mut map = Self::new(origin, cell_size, dims)?;
        for p in points {
            if let Some(coord) = map.world_to_index(*p) {
                map.set_solid(coord, true);
            }
        }
        Ok(map)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// True before the first ingestion (zero cells).
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn origin(&self) -> WorldPoint {
        self.origin
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Contacts from the most recent scan.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Number of solid cells.
    pub fn solid_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Raw occupancy in linear order.
    pub fn occupancy(&self) -> &[bool] {
        &self.cells
    }

    /// World-space box covered by the grid, `(min_corner, max_corner)`.
    pub fn bounds(&self) -> (WorldPoint, WorldPoint) {
        let max = [
            self.origin[0] + self.dims[0] as f64 * self.cell_size,
            self.origin[1] + self.dims[1] as f64 * self.cell_size,
            self.origin[2] + self.dims[2] as f64 * self.cell_size,
        ];
        (self.origin, max)
    }

    // -----------------------------------------------------------------------
    // Cell access
    // -----------------------------------------------------------------------

    /// Check whether a coordinate is within bounds.
    pub fn in_bounds(&self, coord: CellCoord) -> bool {
        linear_index(self.dims, coord).is_some()
    }

    /// Flat index for a coordinate. Returns `None` if out of bounds.
    pub fn linear_index(&self, coord: CellCoord) -> Option<usize> {
        linear_index(self.dims, coord)
    }

    /// Coordinate for a flat index.
    pub fn coord_of(&self, index: usize) -> CellCoord {
        coord_of(self.dims, index)
    }

    /// Read a cell. Returns `false` for out-of-bounds coordinates.
    pub fn is_solid(&self, coord: CellCoord) -> bool {
        self.linear_index(coord)
            .map(|i| self.cells[i])
            .unwrap_or(false)
    }

    /// Write a cell. No-op for out-of-bounds coordinates.
    pub fn set_solid(&mut self, coord: CellCoord, solid: bool) {
        if let Some(i) = self.linear_index(coord) {
            self.cells[i] = solid;
        }
    }

    // -----------------------------------------------------------------------
    // Coordinate transforms
    // -----------------------------------------------------------------------

    /// Grid cell containing a world point, without a bounds check.
    fn world_to_cell_unchecked(&self, point: WorldPoint) -> [i64; 3] {
        [
            ((point[0] - self.origin[0]) / self.cell_size).floor() as i64,
            ((point[1] - self.origin[1]) / self.cell_size).floor() as i64,
            ((point[2] - self.origin[2]) / self.cell_size).floor() as i64,
        ]
    }

    /// Cell containing a world point, or `None` outside the grid.
    pub fn world_to_index(&self, point: WorldPoint) -> Option<CellCoord> {
        if self.is_empty() {
            return None;
        }
        let c = self.world_to_cell_unchecked(point);
        for a in 0..3 {
            if c[a] < 0 || c[a] >= self.dims[a] as i64 {
                return None;
            }
        }
        Some(CellCoord::new(c[0] as i32, c[1] as i32, c[2] as i32))
    }

    /// Cell containing a world point, clamped onto the nearest boundary cell
    /// when the point lies outside. Returns `None` only for an empty map.
    pub fn world_to_index_clamped(&self, point: WorldPoint) -> Option<CellCoord> {
        if self.is_empty() {
            return None;
        }
        let c = self.world_to_cell_unchecked(point);
        let clamp = |v: i64, n: usize| v.clamp(0, n as i64 - 1) as i32;
        Some(CellCoord::new(
            clamp(c[0], self.dims[0]),
            clamp(c[1], self.dims[1]),
            clamp(c[2], self.dims[2]),
        ))
    }

    /// Centre of a cell in world space.
    pub fn index_to_world_center(&self, coord: CellCoord) -> WorldPoint {
        [
            self.origin[0] + (f64::from(coord.x) + 0.5) * self.cell_size,
            self.origin[1] + (f64::from(coord.y) + 0.5) * self.cell_size,
            self.origin[2] + (f64::from(coord.z) + 0.5) * self.cell_size,
        ]
    }

    /// Index ranges of the cells whose centres fall inside `[min, max)`,
    /// clipped to the grid. `None` when no cell qualifies.
    fn cells_centred_in(&self, min: WorldPoint, max: WorldPoint) -> Option<[Range<usize>; 3]> {
        let mut ranges: [Range<usize>; 3] = [0..0, 0..0, 0..0];
        for a in 0..3 {
            let lo = ((min[a] - self.origin[a]) / self.cell_size - 0.5 - LATTICE_EPSILON).ceil();
            let hi = ((max[a] - self.origin[a]) / self.cell_size - 0.5 - LATTICE_EPSILON).ceil();
            let n = self.dims[a] as f64;
            let lo = lo.clamp(0.0, n) as usize;
            let hi = hi.clamp(0.0, n) as usize;
            if lo >= hi {
                return None;
            }
            ranges[a] = lo..hi;
        }
        Some(ranges)
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Merge a scan into the map. See the module header for the rules.
    pub fn ingest(&mut self, scan: &ScanPayload) -> Result<()> {
        scan.validate()?;

        if self.is_empty() {
            *self = Self::new(scan.origin, scan.cell_size, scan.size)?;
        } else {
            if !same_cell_size(self.cell_size, scan.cell_size) {
                return Err(MapError::CellSizeMismatch {
                    expected: self.cell_size,
                    actual: scan.cell_size,
                });
            }
            let frame_max = scan.frame_max();
            self.grow_to_cover(scan.origin, frame_max);
            self.fill_centred_in(scan.origin, frame_max, false);
        }

        let skipped = self.mark_solids(scan);
        if skipped > 0 {
            tracing::warn!(
                skipped,
                revision = scan.revision,
                "scan solids fell outside the occupancy grid"
            );
        }
        for aabb in &scan.bounding_boxes {
            self.fill_aabb(aabb);
        }

        self.revision = scan.revision;
        self.timestamp_ms = scan.timestamp_ms;
        self.contacts = scan.contacts.clone();

        tracing::debug!(
            revision = self.revision,
            solid = scan.solid.len(),
            boxes = scan.bounding_boxes.len(),
            dims = ?self.dims,
            "ingested radar scan"
        );
        Ok(())
    }

    /// Reallocate the grid so it covers `[min, max]` as well as its current
    /// box. The lattice does not move: the new origin is the old origin
    /// shifted by a whole number of cells.
    fn grow_to_cover(&mut self, min: WorldPoint, max: WorldPoint) {
        let mut lo = [0i64; 3];
        let mut hi = [0i64; 3];
        for a in 0..3 {
            let rel_min = (min[a] - self.origin[a]) / self.cell_size;
            let rel_max = (max[a] - self.origin[a]) / self.cell_size;
            lo[a] = ((rel_min + LATTICE_EPSILON).floor() as i64).min(0);
            hi[a] = ((rel_max - LATTICE_EPSILON).ceil() as i64).max(self.dims[a] as i64);
        }
        let grows = (0..3).any(|a| lo[a] < 0 || hi[a] > self.dims[a] as i64);
        if !grows {
            return;
        }

        let new_dims = [
            (hi[0] - lo[0]) as usize,
            (hi[1] - lo[1]) as usize,
            (hi[2] - lo[2]) as usize,
        ];
        let offset = [(-lo[0]) as usize, (-lo[1]) as usize, (-lo[2]) as usize];
        let mut cells = vec![false; new_dims[0] * new_dims[1] * new_dims[2]];

        // Copy z-rows; each row is contiguous in both layouts.
        let [sx, sy, sz] = self.dims;
        for x in 0..sx {
            for y in 0..sy {
                let src = (x * sy + y) * sz;
                let dst =
                    ((x + offset[0]) * new_dims[1] + (y + offset[1])) * new_dims[2] + offset[2];
                cells[dst..dst + sz].copy_from_slice(&self.cells[src..src + sz]);
            }
        }

        tracing::info!(
            old_dims = ?self.dims,
            new_dims = ?new_dims,
            "occupancy grid grown to cover scan"
        );

        for a in 0..3 {
            self.origin[a] += lo[a] as f64 * self.cell_size;
        }
        self.dims = new_dims;
        self.cells = cells;
    }

    /// Set every cell whose centre lies in `[min, max)` to `solid`.
    fn fill_centred_in(&mut self, min: WorldPoint, max: WorldPoint, solid: bool) {
        let Some([rx, ry, rz]) = self.cells_centred_in(min, max) else {
            return;
        };
        let [_, sy, sz] = self.dims;
        for x in rx {
            for y in ry.clone() {
                let row = (x * sy + y) * sz;
                self.cells[row + rz.start..row + rz.end].fill(solid);
            }
        }
    }

    /// Mark scan solids. Returns how many fell outside the grid.
    fn mark_solids(&mut self, scan: &ScanPayload) -> usize {
        let mut skipped = 0;
        let mut mark = |map: &mut Self, point: WorldPoint| match map.world_to_index(point) {
            Some(coord) => map.set_solid(coord, true),
            None => skipped += 1,
        };
        match &scan.solid {
            SolidCells::Indices(indices) => {
                for &i in indices {
                    let centre = scan.cell_center(scan.decode_index(i));
                    mark(self, centre);
                }
            }
            SolidCells::Points(points) => {
                for &p in points {
                    mark(self, p);
                }
            }
        }
        skipped
    }

    /// Rasterize `[minx, miny, minz, maxx, maxy, maxz]` as solid. Both ends
    /// are inclusive of the cells containing them; the box is clipped.
    fn fill_aabb(&mut self, aabb: &[f64; 6]) {
        let lo = self.world_to_cell_unchecked([aabb[0], aabb[1], aabb[2]]);
        let hi = self.world_to_cell_unchecked([aabb[3], aabb[4], aabb[5]]);
        let mut ranges: [Range<usize>; 3] = [0..0, 0..0, 0..0];
        for a in 0..3 {
            let start = lo[a].max(0);
            let end = hi[a].min(self.dims[a] as i64 - 1);
            if end < start {
                return;
            }
            ranges[a] = start as usize..end as usize + 1;
        }
        let [rx, ry, rz] = ranges;
        let [_, sy, sz] = self.dims;
        for x in rx {
            for y in ry.clone() {
                let row = (x * sy + y) * sz;
                self.cells[row + rz.start..row + rz.end].fill(true);
            }
        }
    }

    /// Set every cell whose centre is within `radius` of `center` back to
    /// non-solid. Returns the number of cells that were solid.
    ///
    /// Errors on a non-finite centre or a negative or non-finite radius.
    pub fn clear_sphere(&mut self, center: WorldPoint, radius: f64) -> Result<usize> {
        check_region(center, radius)?;
        if self.is_empty() {
            return Ok(0);
        }
        // Widen the candidate box by half a cell; the distance test below is
        // the exact filter.
        let pad = radius + 0.5 * self.cell_size;
        let min = [center[0] - pad, center[1] - pad, center[2] - pad];
        let max = [center[0] + pad, center[1] + pad, center[2] + pad];
        let Some([rx, ry, rz]) = self.cells_centred_in(min, max) else {
            return Ok(0);
        };
        let r2 = radius * radius;
        let mut cleared = 0;
        for x in rx {
            for y in ry.clone() {
                for z in rz.clone() {
                    let coord = CellCoord::new(x as i32, y as i32, z as i32);
                    if distance_sq(self.index_to_world_center(coord), center) <= r2 {
                        let i = (x * self.dims[1] + y) * self.dims[2] + z;
                        if self.cells[i] {
                            self.cells[i] = false;
                            cleared += 1;
                        }
                    }
                }
            }
        }
        Ok(cleared)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Highest solid y-index in column `(ix, iz)`, if any.
    fn column_top(&self, ix: i64, iz: i64) -> Option<usize> {
        if ix < 0 || iz < 0 || ix >= self.dims[0] as i64 || iz >= self.dims[2] as i64 {
            return None;
        }
        let (x, z) = (ix as usize, iz as usize);
        let [_, sy, sz] = self.dims;
        (0..sy).rev().find(|&y| self.cells[(x * sy + y) * sz + z])
    }

    /// World-space Y of the highest solid cell centre in the column under
    /// `(world_x, world_z)`.
    ///
    /// When that column has no solid cell and `search_radius > 0`, columns
    /// within `search_radius` cells (square neighbourhood) are searched and
    /// the highest surface among them is returned.
    pub fn surface_height(&self, world_x: f64, world_z: f64, search_radius: u32) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let ix = ((world_x - self.origin[0]) / self.cell_size).floor() as i64;
        let iz = ((world_z - self.origin[2]) / self.cell_size).floor() as i64;

        let top = self.column_top(ix, iz).or_else(|| {
            let r = i64::from(search_radius);
            let mut best: Option<usize> = None;
            for dx in -r..=r {
                for dz in -r..=r {
                    if let Some(y) = self.column_top(ix + dx, iz + dz) {
                        best = Some(best.map_or(y, |b| b.max(y)));
                    }
                }
            }
            best
        })?;
        Some(self.origin[1] + (top as f64 + 0.5) * self.cell_size)
    }

    /// Cells an agent can stand in: non-solid with a solid cell directly
    /// below. Cells in the bottom layer have no support and never qualify.
    pub fn traversable_mask(&self) -> CellMask {
        let [_, sy, sz] = self.dims;
        let cells = (0..self.cells.len())
            .into_par_iter()
            .map(|i| {
                let y = (i / sz) % sy;
                !self.cells[i] && y > 0 && self.cells[i - sz]
            })
            .collect();
        CellMask {
            dims: self.dims,
            cells,
        }
    }

    /// Every non-solid cell.
    pub fn free_mask(&self) -> CellMask {
        CellMask {
            dims: self.dims,
            cells: self.cells.iter().map(|&c| !c).collect(),
        }
    }

    /// Centres of all solid cells, in linear order.
    pub fn solid_points(&self) -> Vec<WorldPoint> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &solid)| solid)
            .map(|(i, _)| self.index_to_world_center(self.coord_of(i)))
            .collect()
    }
}

/// Build a mask directly from raw cells; used by the pathfinder after
/// inflation.
pub(crate) fn mask_from_cells(dims: [usize; 3], cells: Vec<bool>) -> CellMask {
    debug_assert_eq!(cells.len(), dims[0] * dims[1] * dims[2]);
    CellMask { dims, cells }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(origin: WorldPoint, size: [usize; 3], solid: Vec<u64>) -> ScanPayload {
        ScanPayload {
            origin,
            cell_size: 1.0,
            size,
            solid: SolidCells::Indices(solid),
            ..Default::default()
        }
    }

    /// Linear index inside a scan frame.
    fn idx(size: [usize; 3], x: usize, y: usize, z: usize) -> u64 {
        ((x * size[1] + y) * size[2] + z) as u64
    }

    #[test]
    fn new_rejects_bad_parameters() {
        assert!(matches!(
            OccupancyMap::new([0.0; 3], 0.0, [1, 1, 1]),
            Err(MapError::InvalidCellSize(_))
        ));
        assert!(matches!(
            OccupancyMap::new([0.0; 3], 1.0, [4, 0, 4]),
            Err(MapError::EmptyGrid(_))
        ));
    }

    #[test]
    fn default_map_is_empty() {
        let map = OccupancyMap::default();
        assert!(map.is_empty());
        assert_eq!(map.world_to_index([0.0, 0.0, 0.0]), None);
        assert!(!map.is_solid(CellCoord::new(0, 0, 0)));
        assert_eq!(map.surface_height(0.0, 0.0, 3), None);
    }

    #[test]
    fn out_of_bounds_access_is_harmless() {
        let mut map = OccupancyMap::new([0.0; 3], 1.0, [4, 4, 4]).unwrap();
        map.set_solid(CellCoord::new(-1, 0, 0), true);
        map.set_solid(CellCoord::new(4, 0, 0), true);
        assert_eq!(map.solid_count(), 0);
        assert!(!map.is_solid(CellCoord::new(100, 100, 100)));
    }

    #[test]
    fn world_index_round_trip_stays_within_half_diagonal() {
        let map = OccupancyMap::new([-7.25, 3.0, 100.5], 0.75, [13, 9, 11]).unwrap();
        let (min, max) = map.bounds();
        let tolerance = map.cell_size() * 3f64.sqrt() / 2.0 + 1e-9;
        let steps = 17;
        for i in 0..steps {
            for j in 0..steps {
                for k in 0..steps {
                    let t = |n: usize, a: usize| {
                        min[a] + (max[a] - min[a]) * (n as f64 + 0.37) / (steps as f64 + 0.5)
                    };
                    let p = [t(i, 0), t(j, 1), t(k, 2)];
                    let coord = map.world_to_index(p).unwrap();
                    let back = map.index_to_world_center(coord);
                    assert!(crate::types::distance(p, back) <= tolerance, "{p:?} -> {back:?}");
                }
            }
        }
    }

    #[test]
    fn first_scan_defines_frame() {
        let s = scan([5.0, 0.0, -2.0], [3, 4, 5], vec![idx([3, 4, 5], 1, 2, 3)]);
        let map = OccupancyMap::from_scan(&s).unwrap();
        assert_eq!(map.origin(), [5.0, 0.0, -2.0]);
        assert_eq!(map.dims(), [3, 4, 5]);
        assert_eq!(map.solid_count(), 1);
        assert!(map.is_solid(CellCoord::new(1, 2, 3)));
    }

    #[test]
    fn reingesting_identical_scan_is_idempotent() {
        let size = [6, 6, 6];
        let mut s = scan([0.0; 3], size, vec![idx(size, 0, 0, 0), idx(size, 3, 2, 1)]);
        s.revision = 9;
        s.bounding_boxes = vec![[4.0, 4.0, 4.0, 5.5, 5.5, 5.5]];
        s.contacts = vec![Contact {
            kind: "grid".into(),
            id: 1,
            position: [1.0, 1.0, 1.0],
        }];
        let mut map = OccupancyMap::from_scan(&s).unwrap();
        let before = map.occupancy().to_vec();
        map.ingest(&s).unwrap();
        assert_eq!(map.occupancy(), &before[..]);
        assert_eq!(map.revision(), 9);
        assert_eq!(map.contacts(), &s.contacts[..]);
    }

    #[test]
    fn growth_preserves_existing_data() {
        let size = [4, 4, 4];
        let solids = vec![idx(size, 0, 0, 0), idx(size, 1, 2, 3), idx(size, 3, 3, 3)];
        let a = scan([0.0; 3], size, solids);
        let b = scan([20.0, -8.0, 6.0], size, vec![idx(size, 2, 2, 2)]);

        let mut map = OccupancyMap::from_scan(&a).unwrap();
        let local_pattern = |map: &OccupancyMap| -> Vec<bool> {
            let mut out = Vec::new();
            for x in 0..4 {
                for y in 0..4 {
                    for z in 0..4 {
                        let p = [x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5];
                        out.push(map.is_solid(map.world_to_index(p).unwrap()));
                    }
                }
            }
            out
        };
        let original = local_pattern(&map);

        map.ingest(&b).unwrap();
        assert_eq!(map.origin(), [0.0, -8.0, 0.0]);
        assert_eq!(map.dims(), [24, 12, 10]);
        assert_eq!(local_pattern(&map), original);
        assert!(map.is_solid(map.world_to_index([22.5, -5.5, 8.5]).unwrap()));

        map.ingest(&a).unwrap();
        assert_eq!(local_pattern(&map), original);
        assert_eq!(map.solid_count(), 4);
    }

    #[test]
    fn growth_keeps_lattice_for_unaligned_scan() {
        let size = [4, 4, 4];
        let mut map = OccupancyMap::from_scan(&scan([0.0; 3], size, vec![])).unwrap();
        // Origin off the lattice by a third of a cell.
        map.ingest(&scan([-2.33, 0.0, 0.0], size, vec![])).unwrap();
        assert_eq!(map.origin(), [-3.0, 0.0, 0.0]);
        assert_eq!(map.dims(), [7, 4, 4]);
    }

    #[test]
    fn scanned_region_is_overwritten_and_rest_preserved() {
        let big = [8, 4, 4];
        let mut map = OccupancyMap::from_scan(&scan(
            [0.0; 3],
            big,
            vec![idx(big, 1, 0, 0), idx(big, 6, 0, 0)],
        ))
        .unwrap();

        // Second scan covers only x in [4, 8) and sees nothing solid.
        let small = [4, 4, 4];
        map.ingest(&scan([4.0, 0.0, 0.0], small, vec![])).unwrap();
        assert!(map.is_solid(CellCoord::new(1, 0, 0)), "outside scan frame must survive");
        assert!(!map.is_solid(CellCoord::new(6, 0, 0)), "stale solid inside frame must clear");
    }

    #[test]
    fn empty_scan_contributes_nothing_but_updates_markers() {
        let size = [3, 3, 3];
        let mut map =
            OccupancyMap::from_scan(&scan([0.0; 3], size, vec![idx(size, 1, 1, 1)])).unwrap();
        let mut far = scan([50.0, 0.0, 0.0], size, vec![]);
        far.revision = 4;
        map.ingest(&far).unwrap();
        assert_eq!(map.solid_count(), 1);
        assert_eq!(map.revision(), 4);
    }

    #[test]
    fn revision_and_contacts_are_replaced_not_merged() {
        let size = [2, 2, 2];
        let mut first = scan([0.0; 3], size, vec![]);
        first.revision = 10;
        first.timestamp_ms = 500;
        first.contacts = vec![Contact {
            kind: "player".into(),
            id: 1,
            position: [0.0; 3],
        }];
        let mut map = OccupancyMap::from_scan(&first).unwrap();

        let mut second = scan([0.0; 3], size, vec![]);
        second.revision = 3;
        second.timestamp_ms = 200;
        map.ingest(&second).unwrap();
        assert_eq!(map.revision(), 3);
        assert_eq!(map.timestamp_ms(), 200);
        assert!(map.contacts().is_empty());
    }

    #[test]
    fn cell_size_mismatch_is_rejected() {
        let size = [2, 2, 2];
        let mut map = OccupancyMap::from_scan(&scan([0.0; 3], size, vec![])).unwrap();
        let mut other = scan([0.0; 3], size, vec![]);
        other.cell_size = 2.0;
        assert!(matches!(
            map.ingest(&other),
            Err(MapError::CellSizeMismatch { .. })
        ));
        assert_eq!(map.dims(), [2, 2, 2]);
    }

    #[test]
    fn bounding_boxes_rasterize_inclusively_and_clip() {
        let mut s = scan([0.0; 3], [10, 10, 10], vec![]);
        s.bounding_boxes = vec![[2.2, 0.0, 3.9, 4.1, 1.5, 3.9], [8.5, 8.5, 8.5, 40.0, 40.0, 40.0]];
        let map = OccupancyMap::from_scan(&s).unwrap();
        // First box: x 2..=4, y 0..=1, z 3..=3.
        assert_eq!(map.solid_count(), 3 * 2 + 2 * 2 * 2);
        assert!(map.is_solid(CellCoord::new(4, 1, 3)));
        assert!(!map.is_solid(CellCoord::new(5, 1, 3)));
        assert!(map.is_solid(CellCoord::new(9, 9, 9)));
    }

    #[test]
    fn point_encoded_solids_outside_grid_are_skipped() {
        let s = ScanPayload {
            origin: [0.0; 3],
            cell_size: 1.0,
            size: [2, 2, 2],
            solid: SolidCells::Points(vec![[0.5, 0.5, 0.5], [9.0, 9.0, 9.0]]),
            ..Default::default()
        };
        let map = OccupancyMap::from_scan(&s).unwrap();
        assert_eq!(map.solid_count(), 1);
    }

    #[test]
    fn surface_height_exact_and_searched() {
        let mut map = OccupancyMap::new([0.0, 10.0, 0.0], 2.0, [5, 5, 5]).unwrap();
        map.set_solid(CellCoord::new(1, 0, 1), true);
        map.set_solid(CellCoord::new(1, 2, 1), true);
        map.set_solid(CellCoord::new(3, 4, 3), true);

        // Column (1, 1): top at y index 2 -> 10 + 2.5 * 2.
        assert_eq!(map.surface_height(2.5, 2.5, 0), Some(15.0));
        // Column (2, 2) is empty.
        assert_eq!(map.surface_height(4.5, 4.5, 0), None);
        // Radius 1 reaches both (1,1) and (3,3); the higher one wins.
        assert_eq!(map.surface_height(4.5, 4.5, 1), Some(19.0));
        // Outside the grid with no radius.
        assert_eq!(map.surface_height(-5.0, 0.0, 0), None);
    }

    #[test]
    fn traversable_needs_solid_directly_below() {
        let mut map = OccupancyMap::new([0.0; 3], 1.0, [3, 4, 3]).unwrap();
        map.set_solid(CellCoord::new(1, 0, 1), true);
        map.set_solid(CellCoord::new(1, 1, 1), true);
        let mask = map.traversable_mask();
        assert!(mask.get(CellCoord::new(1, 2, 1)));
        assert!(!mask.get(CellCoord::new(1, 1, 1)), "solid cells are not walkable");
        assert!(!mask.get(CellCoord::new(1, 3, 1)), "floating air is not walkable");
        assert!(!mask.get(CellCoord::new(0, 0, 0)), "bottom layer has no support");
        assert_eq!(mask.count(), 1);
        assert_eq!(map.free_mask().count(), 3 * 4 * 3 - 2);
    }

    #[test]
    fn clear_sphere_drops_only_inside() {
        let mut map = OccupancyMap::new([0.0; 3], 1.0, [10, 1, 1]).unwrap();
        for x in 0..10 {
            map.set_solid(CellCoord::new(x, 0, 0), true);
        }
        // Centres at 0.5 .. 9.5; radius 2 around 4.5 drops 2.5 ..= 6.5.
        let cleared = map.clear_sphere([4.5, 0.5, 0.5], 2.0).unwrap();
        assert_eq!(cleared, 5);
        assert!(map.is_solid(CellCoord::new(1, 0, 0)));
        assert!(!map.is_solid(CellCoord::new(2, 0, 0)));
        assert!(!map.is_solid(CellCoord::new(6, 0, 0)));
        assert!(map.is_solid(CellCoord::new(7, 0, 0)));
        assert_eq!(map.dims(), [10, 1, 1]);
    }

    #[test]
    fn clear_sphere_rejects_bad_regions() {
        let mut map = OccupancyMap::new([0.0; 3], 1.0, [4, 1, 1]).unwrap();
        map.set_solid(CellCoord::new(0, 0, 0), true);
        for (center, radius) in [
            ([0.5, 0.5, 0.5], -5.0),
            ([0.5, 0.5, 0.5], f64::NAN),
            ([0.5, 0.5, 0.5], f64::INFINITY),
            ([f64::NAN, 0.5, 0.5], 1.0),
        ] {
            assert!(matches!(
                map.clear_sphere(center, radius),
                Err(MapError::InvalidRegion(_))
            ));
        }
        assert!(map.is_solid(CellCoord::new(0, 0, 0)));
        assert_eq!(map.clear_sphere([0.5, 0.5, 0.5], 0.0).unwrap(), 1);
    }

    #[test]
    fn rebuild_from_solid_points() {
        let points = vec![[0.5, 0.5, 0.5], [3.5, 0.5, 0.5], [-1.5, 2.5, 0.5]];
        let map = OccupancyMap::from_solid_points(&points, 1.0).unwrap();
        assert_eq!(map.solid_count(), 3);
        for p in &points {
            assert!(map.is_solid(map.world_to_index(*p).unwrap()));
        }
        // Padding leaves a free layer above the highest voxel.
        let top = map.world_to_index([-1.5, 3.5, 0.5]).unwrap();
        assert!(map.in_bounds(top));
        assert!(!map.is_solid(top));

        let mut rebuilt_points = map.solid_points();
        rebuilt_points.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut expected = points.clone();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rebuilt_points, expected);
        assert!(OccupancyMap::from_solid_points(&[], 1.0).is_err());
    }
}
