// A* pathfinding over an occupancy grid.
//
// `PathFinder` borrows one `OccupancyMap` read-only and one
// `PassabilityProfile` by value. At construction it derives, once:
// - `blocked`: occupancy dilated by the agent radius (cubic dilation in
//   free-flight mode, per-layer dilation in surface mode so the floor an
//   agent stands on never inflates into the layer it stands in);
// - `walkable`: the cells a search may visit. Surface mode uses the
//   traversable mask (free, solid directly below); free-flight mode uses
//   every unblocked cell.
//
// The search itself is standard A* using a `BinaryHeap` (min-heap via
// reversed ordering). Scores and came-from links live in `Vec`s indexed by
// the grid's linear index, so ties break on the lowest linear index and the
// output is identical across runs. Edge cost is the Euclidean length of the
// move in cells, and the heuristic is the Euclidean distance to the goal,
// which never overestimates.
//
// A move is legal when:
// - the target is walkable;
// - the y-change is at most `max_step_cells`;
// - rise over run is within `max_slope_degrees` (pure vertical moves need
//   `allow_vertical_movement`);
// - the column the agent rises or drops through is unblocked;
// - a diagonal move does not cut a corner: both orthogonal intermediate
//   cells at the upper level are unblocked.
//
// `get_reachable_indices` is a separate, cost-free 6-connected flood fill
// over every unblocked cell. It does not share state with A* and ignores
// step and slope rules, so its result is a superset of what A* can reach
// from the same start.
//
// See also: `occupancy.rs` for the grid, `passability.rs` for the profile.
//
// Borrowing the map for the finder's lifetime means the map cannot be
// mutated while a finder exists. Callers sharing a map across threads wrap
// it in an `RwLock` and hold the read guard for the finder's lifetime.

use crate::error::{MapError, Result};
use crate::occupancy::{CellMask, OccupancyMap, mask_from_cells};
use crate::passability::PassabilityProfile;
use crate::types::{CellCoord, WorldPoint, distance};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, VecDeque};

const FACE_OFFSETS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// Sentinel for "no predecessor" in the came-from table.
const NO_PARENT: usize = usize::MAX;

/// Entry in the A* open set (min-heap via reversed ordering).
struct OpenEntry {
    index: usize,
    f_score: f64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score.total_cmp(&other.f_score) == Ordering::Equal && self.index == other.index
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score, then smallest index, is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Grid pathfinder bound to one map snapshot and one profile.
#[derive(Clone, Debug)]
pub struct PathFinder<'a> {
    map: &'a OccupancyMap,
    profile: PassabilityProfile,
    /// Inflated occupancy, linear order.
    blocked: Vec<bool>,
    walkable: CellMask,
    /// Maximum node expansions per search; `None` is unbounded.
    search_budget: Option<usize>,
    /// Maximum shell radius, in cells, when snapping world points.
    snap_radius: Option<u32>,
}

impl<'a> PathFinder<'a> {
    /// Bind a finder to a map. Fails on an empty map or an invalid profile.
    pub fn new(map: &'a OccupancyMap, profile: PassabilityProfile) -> Result<Self> {
        if map.is_empty() {
            return Err(MapError::EmptyGrid(map.dims()));
        }
        profile.validate()?;

        let dims = map.dims();
        let r = profile.inflation_cells(map.cell_size());
        let blocked = if r == 0 {
            map.occupancy().to_vec()
        } else if profile.allow_vertical_movement {
            dilate(map.occupancy(), dims, [r, r, r])
        } else {
            dilate(map.occupancy(), dims, [r, 0, r])
        };

        let walkable = if profile.allow_vertical_movement {
            blocked.iter().map(|&b| !b).collect()
        } else {
            let solid = map.occupancy();
            let [_, sy, sz] = dims;
            (0..blocked.len())
                .map(|i| {
                    let y = (i / sz) % sy;
                    !blocked[i] && y > 0 && solid[i - sz]
                })
                .collect()
        };
        let walkable = mask_from_cells(dims, walkable);

        tracing::debug!(
            inflation_cells = r,
            walkable = walkable.count(),
            dims = ?dims,
            "pathfinder bound to occupancy map"
        );

        Ok(Self {
            map,
            profile,
            blocked,
            walkable,
            search_budget: None,
            snap_radius: None,
        })
    }

    /// Cap node expansions per search. Exhausting the cap yields an empty
    /// path.
    pub fn with_search_budget(mut self, max_expansions: usize) -> Self {
        self.search_budget = Some(max_expansions);
        self
    }

    /// Limit how far (in cells) world points are snapped to walkable cells.
    pub fn with_snap_radius(mut self, cells: u32) -> Self {
        self.snap_radius = Some(cells);
        self
    }

    pub fn map(&self) -> &OccupancyMap {
        self.map
    }

    pub fn profile(&self) -> &PassabilityProfile {
        &self.profile
    }

    /// The mask searches run over.
    pub fn walkable_mask(&self) -> &CellMask {
        &self.walkable
    }

    pub fn is_walkable(&self, coord: CellCoord) -> bool {
        self.walkable.get(coord)
    }

    /// Solid after inflation. Out-of-bounds cells are not blocked.
    pub fn is_blocked(&self, coord: CellCoord) -> bool {
        self.map
            .linear_index(coord)
            .map(|i| self.blocked[i])
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // World-space queries
    // -----------------------------------------------------------------------

    /// Nearest walkable cell to a world point.
    ///
    /// Points outside the grid are clamped first. Candidates are scanned in
    /// cube shells of growing radius around the clamped cell; the closest
    /// cell centre by Euclidean distance wins, ties going to the lowest
    /// linear index. Returns `None` when nothing walkable is in range.
    pub fn snap_to_walkable(&self, point: WorldPoint) -> Option<CellCoord> {
        let centre = self.map.world_to_index_clamped(point)?;
        if self.walkable.get(centre) && self.map.world_to_index(point) == Some(centre) {
            return Some(centre);
        }

        let dims = self.map.dims();
        let max_dim = dims.iter().copied().max().unwrap_or(0) as u32;
        let limit = self.snap_radius.map_or(max_dim, |r| r.min(max_dim));
        let cell_size = self.map.cell_size();

        let mut best: Option<(f64, usize, CellCoord)> = None;
        for r in 0..=limit {
            // Every cell in shell r is at least (r - 0.5) cells from the
            // clamped point, so once that exceeds the best we can stop.
            if best.is_some_and(|(d, _, _)| (f64::from(r) - 0.5) * cell_size > d) {
                break;
            }
            for_each_in_shell(centre, r as i32, |coord| {
                if !self.walkable.get(coord) {
                    return;
                }
                let d = distance(point, self.map.index_to_world_center(coord));
                let Some(i) = self.map.linear_index(coord) else {
                    return;
                };
                let better = match best {
                    None => true,
                    Some((bd, bi, _)) => d < bd || (d == bd && i < bi),
                };
                if better {
                    best = Some((d, i, coord));
                }
            });
        }
        best.map(|(_, _, coord)| coord)
    }

    /// Path between two world points as cell-centre waypoints.
    ///
    /// Both ends are snapped to the nearest walkable cell. Returns an empty
    /// list when either end has nothing walkable nearby or no path exists.
    pub fn find_path_world(&self, start: WorldPoint, goal: WorldPoint) -> Vec<WorldPoint> {
        let (Some(s), Some(g)) = (self.snap_to_walkable(start), self.snap_to_walkable(goal)) else {
            tracing::debug!(?start, ?goal, "no walkable cell near path endpoint");
            return Vec::new();
        };
        // Snapped cells are always in bounds, so this cannot fail.
        self.find_path_indices(s, g)
            .unwrap_or_default()
            .into_iter()
            .map(|c| self.map.index_to_world_center(c))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Index-space queries
    // -----------------------------------------------------------------------

    fn checked_index(&self, coord: CellCoord) -> Result<usize> {
        self.map
            .linear_index(coord)
            .ok_or(MapError::IndexOutOfBounds {
                coord,
                dims: self.map.dims(),
            })
    }

    /// Shortest path from `start` to `goal`, inclusive of both.
    ///
    /// Errors only when an index is outside the grid. An empty path means
    /// an endpoint is not walkable, the goal is unreachable, or the search
    /// budget ran out.
    pub fn find_path_indices(&self, start: CellCoord, goal: CellCoord) -> Result<Vec<CellCoord>> {
        let start_i = self.checked_index(start)?;
        let goal_i = self.checked_index(goal)?;
        let walkable = self.walkable.as_slice();
        if !walkable[start_i] || !walkable[goal_i] {
            tracing::debug!(%start, %goal, "path endpoint not walkable");
            return Ok(Vec::new());
        }
        if start_i == goal_i {
            return Ok(vec![start]);
        }

        let n = self.map.cell_count();
        // g_score[i] = cost of cheapest known path from start to i.
        let mut g_score = vec![f64::INFINITY; n];
        let mut came_from = vec![NO_PARENT; n];
        let mut closed = vec![false; n];
        let mut neighbours: SmallVec<[(CellCoord, f64); 32]> = SmallVec::new();
        let mut expansions = 0usize;

        g_score[start_i] = 0.0;
        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            index: start_i,
            f_score: start.euclidean_distance(goal),
        });

        while let Some(current) = open.pop() {
            let ci = current.index;
            if ci == goal_i {
                let path = reconstruct_path(&came_from, start_i, goal_i, |i| self.map.coord_of(i));
                tracing::debug!(%start, %goal, len = path.len(), cost = g_score[ci], "path found");
                return Ok(path);
            }
            if closed[ci] {
                continue;
            }
            closed[ci] = true;

            expansions += 1;
            if self.search_budget.is_some_and(|budget| expansions > budget) {
                tracing::warn!(%start, %goal, expansions, "search budget exhausted");
                return Ok(Vec::new());
            }

            let current_coord = self.map.coord_of(ci);
            let current_g = g_score[ci];
            neighbours.clear();
            self.expand(current_coord, &mut neighbours);

            for &(next, step_cost) in &neighbours {
                let Some(ni) = self.map.linear_index(next) else {
                    continue;
                };
                if closed[ni] {
                    continue;
                }
                let tentative_g = current_g + step_cost;
                if tentative_g < g_score[ni] {
                    g_score[ni] = tentative_g;
                    came_from[ni] = ci;
                    open.push(OpenEntry {
                        index: ni,
                        f_score: tentative_g + next.euclidean_distance(goal),
                    });
                }
            }
        }

        tracing::debug!(%start, %goal, expansions, "no path");
        Ok(Vec::new())
    }

    /// Every free cell 6-connected to `start`, including `start`.
    ///
    /// Floods the inflated free space rather than the walkable surface, so
    /// it never excludes a cell `find_path_indices` can reach. Empty when
    /// `start` itself is blocked. Errors when `start` is outside the grid.
    pub fn get_reachable_indices(&self, start: CellCoord) -> Result<BTreeSet<CellCoord>> {
        let start_i = self.checked_index(start)?;
        let mut reached = BTreeSet::new();
        if self.blocked[start_i] {
            return Ok(reached);
        }

        let mut visited = vec![false; self.map.cell_count()];
        let mut queue = VecDeque::new();
        visited[start_i] = true;
        queue.push_back(start);

        while let Some(coord) = queue.pop_front() {
            reached.insert(coord);
            for &(dx, dy, dz) in &FACE_OFFSETS {
                let next = coord.offset(dx, dy, dz);
                let Some(ni) = self.map.linear_index(next) else {
                    continue;
                };
                if !visited[ni] && !self.blocked[ni] {
                    visited[ni] = true;
                    queue.push_back(next);
                }
            }
        }
        Ok(reached)
    }

    // -----------------------------------------------------------------------
    // Neighbour expansion
    // -----------------------------------------------------------------------

    /// Push every legal move out of `from` with its cost.
    fn expand(&self, from: CellCoord, out: &mut SmallVec<[(CellCoord, f64); 32]>) {
        let max_step = (self.profile.max_step_cells as usize).min(self.map.dims()[1]) as i32;
        for &(dx, dz) in self.profile.horizontal_offsets() {
            let run = f64::from(dx * dx + dz * dz).sqrt();
            for dy in -max_step..=max_step {
                let to = from.offset(dx, dy, dz);
                if !self.walkable.get(to) {
                    continue;
                }
                if !self.profile.slope_allowed(f64::from(dy), run) {
                    continue;
                }
                if !self.sweep_clear(from, to) {
                    continue;
                }
                out.push((to, f64::from(dx * dx + dy * dy + dz * dz).sqrt()));
            }
        }
        if self.profile.allow_vertical_movement {
            for dy in [-1, 1] {
                let to = from.offset(0, dy, 0);
                if self.walkable.get(to) {
                    out.push((to, 1.0));
                }
            }
        }
    }

    /// Whether the cells swept between two horizontally adjacent cells are
    /// clear: the column the agent rises or drops through, and for diagonal
    /// moves both orthogonal corners at the upper level.
    fn sweep_clear(&self, from: CellCoord, to: CellCoord) -> bool {
        let dy = to.y - from.y;
        // Rise in the starting column, or drop in the target column.
        if dy > 0 && (1..=dy).any(|k| self.is_blocked(from.offset(0, k, 0))) {
            return false;
        }
        if dy < 0 && (1..=-dy).any(|k| self.is_blocked(to.offset(0, k, 0))) {
            return false;
        }

        let dx = to.x - from.x;
        let dz = to.z - from.z;
        if dx != 0 && dz != 0 {
            let y = from.y.max(to.y);
            if self.is_blocked(CellCoord::new(from.x + dx, y, from.z))
                || self.is_blocked(CellCoord::new(from.x, y, from.z + dz))
            {
                return false;
            }
        }
        true
    }
}

/// Visit every coordinate at Chebyshev distance exactly `r` from `centre`.
fn for_each_in_shell(centre: CellCoord, r: i32, mut f: impl FnMut(CellCoord)) {
    for dx in -r..=r {
        for dy in -r..=r {
            if dx.abs() == r || dy.abs() == r {
                for dz in -r..=r {
                    f(centre.offset(dx, dy, dz));
                }
            } else {
                f(centre.offset(dx, dy, -r));
                f(centre.offset(dx, dy, r));
            }
        }
    }
}

/// Reconstruct the path from came-from links.
fn reconstruct_path(
    came_from: &[usize],
    start: usize,
    goal: usize,
    coord_of: impl Fn(usize) -> CellCoord,
) -> Vec<CellCoord> {
    let mut nodes = Vec::new();
    let mut current = goal;
    loop {
        nodes.push(coord_of(current));
        if current == start {
            break;
        }
        let prev = came_from[current];
        if prev == NO_PARENT {
            break;
        }
        current = prev;
    }
    nodes.reverse();
    nodes
}

/// Dilate `cells` by a box of half-extent `radius[axis]` cells per axis.
///
/// Separable: a box dilation equals three 1D dilations, one per axis.
fn dilate(cells: &[bool], dims: [usize; 3], radius: [usize; 3]) -> Vec<bool> {
    let strides = [dims[1] * dims[2], dims[2], 1];
    let mut current = cells.to_vec();
    for axis in 0..3 {
        if radius[axis] > 0 {
            current = dilate_axis(&current, dims[axis], strides[axis], radius[axis]);
        }
    }
    current
}

/// 1D dilation of every line along one axis: a cell becomes set when a set
/// cell lies within `r` positions of it on that line.
fn dilate_axis(src: &[bool], len: usize, stride: usize, r: usize) -> Vec<bool> {
    let mut out = vec![false; src.len()];
    for start in 0..src.len() {
        // Lines start where the axis coordinate is zero.
        if (start / stride) % len != 0 {
            continue;
        }
        let mut last: Option<usize> = None;
        for p in 0..len {
            let i = start + p * stride;
            if src[i] {
                last = Some(p);
            }
            if last.is_some_and(|l| p - l <= r) {
                out[i] = true;
            }
        }
        let mut next: Option<usize> = None;
        for p in (0..len).rev() {
            let i = start + p * stride;
            if src[i] {
                next = Some(p);
            }
            if next.is_some_and(|n| n - p <= r) {
                out[i] = true;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Map with a solid floor at y = 0.
    fn floor_map(dims: [usize; 3]) -> OccupancyMap {
        let mut map = OccupancyMap::new([0.0; 3], 1.0, dims).unwrap();
        for x in 0..dims[0] as i32 {
            for z in 0..dims[2] as i32 {
                map.set_solid(CellCoord::new(x, 0, z), true);
            }
        }
        map
    }

    /// Solid column of cells at `(x, z)` for y in `ys`.
    fn pillar(map: &mut OccupancyMap, x: i32, z: i32, ys: std::ops::RangeInclusive<i32>) {
        for y in ys {
            map.set_solid(CellCoord::new(x, y, z), true);
        }
    }

    fn flat_profile(diagonal: bool) -> PassabilityProfile {
        PassabilityProfile {
            allow_vertical_movement: false,
            allow_diagonal: diagonal,
            max_step_cells: 0,
            max_slope_degrees: 0.0,
            agent_radius: 0.0,
        }
    }

    /// Consecutive cells are one legal move apart and every cell is walkable.
    fn assert_valid_path(finder: &PathFinder, path: &[CellCoord]) {
        let p = finder.profile();
        for c in path {
            assert!(finder.is_walkable(*c), "{c} not walkable");
        }
        for w in path.windows(2) {
            let (a, b) = (w[0], w[1]);
            let dx = (b.x - a.x).abs();
            let dy = (b.y - a.y).abs();
            let dz = (b.z - a.z).abs();
            assert!(dx <= 1 && dz <= 1, "{a} -> {b} not adjacent");
            if !p.allow_diagonal {
                assert!(dx + dz <= 1, "{a} -> {b} is diagonal");
            }
            if dx + dz == 0 {
                assert!(p.allow_vertical_movement && dy == 1, "{a} -> {b} vertical");
            } else {
                assert!(dy as u32 <= p.max_step_cells, "{a} -> {b} step too tall");
            }
        }
    }

    #[test]
    fn empty_map_is_a_configuration_error() {
        let map = OccupancyMap::default();
        assert!(matches!(
            PathFinder::new(&map, PassabilityProfile::default()),
            Err(MapError::EmptyGrid(_))
        ));
    }

    #[test]
    fn out_of_bounds_indices_are_errors() {
        let map = floor_map([4, 3, 4]);
        let finder = PathFinder::new(&map, PassabilityProfile::default()).unwrap();
        assert!(matches!(
            finder.find_path_indices(CellCoord::new(-1, 1, 0), CellCoord::new(1, 1, 1)),
            Err(MapError::IndexOutOfBounds { .. })
        ));
        assert!(finder
            .find_path_indices(CellCoord::new(0, 1, 0), CellCoord::new(4, 1, 0))
            .is_err());
        assert!(finder.get_reachable_indices(CellCoord::new(0, 9, 0)).is_err());
    }

    #[test]
    fn trivial_path() {
        let map = floor_map([3, 3, 3]);
        let finder = PathFinder::new(&map, PassabilityProfile::default()).unwrap();
        let c = CellCoord::new(1, 1, 1);
        assert_eq!(finder.find_path_indices(c, c).unwrap(), vec![c]);
    }

    #[test]
    fn four_connected_path_is_manhattan_optimal() {
        let map = floor_map([8, 3, 8]);
        let finder = PathFinder::new(&map, flat_profile(false)).unwrap();
        let start = CellCoord::new(0, 1, 0);
        let goal = CellCoord::new(7, 1, 4);
        let path = finder.find_path_indices(start, goal).unwrap();
        assert_eq!(path.len() - 1, 11);
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&goal));
        assert_valid_path(&finder, &path);
    }

    #[test]
    fn eight_connected_path_is_chebyshev_optimal() {
        let map = floor_map([8, 3, 8]);
        let finder = PathFinder::new(&map, flat_profile(true)).unwrap();
        let path = finder
            .find_path_indices(CellCoord::new(0, 1, 0), CellCoord::new(7, 1, 4))
            .unwrap();
        assert_eq!(path.len() - 1, 7);
        assert_valid_path(&finder, &path);
    }

    #[test]
    fn path_detours_through_wall_gap() {
        let mut map = floor_map([7, 5, 7]);
        for z in 0..7 {
            if z != 5 {
                pillar(&mut map, 3, z, 1..=3);
            }
        }
        let finder = PathFinder::new(&map, flat_profile(false)).unwrap();
        let path = finder
            .find_path_indices(CellCoord::new(0, 1, 0), CellCoord::new(6, 1, 0))
            .unwrap();
        assert!(path.contains(&CellCoord::new(3, 1, 5)));
        // 6 across + 5 out + 5 back.
        assert_eq!(path.len() - 1, 16);
        assert_valid_path(&finder, &path);
    }

    #[test]
    fn enclosed_goal_is_unreachable() {
        let mut map = floor_map([7, 6, 7]);
        for x in 2..=4 {
            for z in 2..=4 {
                if (x, z) != (3, 3) {
                    pillar(&mut map, x, z, 1..=3);
                }
            }
        }
        // Lid over the shaft so free space cannot flow in from above.
        map.set_solid(CellCoord::new(3, 4, 3), true);
        let finder = PathFinder::new(&map, PassabilityProfile::default()).unwrap();
        let goal = CellCoord::new(3, 1, 3);
        assert!(finder.is_walkable(goal));
        assert!(finder.find_path_world([0.5, 1.5, 0.5], [3.5, 1.5, 3.5]).is_empty());
        let reach = finder.get_reachable_indices(CellCoord::new(0, 1, 0)).unwrap();
        assert!(!reach.contains(&goal));
        assert!(reach.contains(&CellCoord::new(6, 1, 6)));
    }

    #[test]
    fn steps_respect_max_step_and_slope() {
        // Raised platform at x >= 3, one cell higher than the floor.
        let mut map = floor_map([6, 4, 1]);
        for x in 3..6 {
            map.set_solid(CellCoord::new(x, 1, 0), true);
        }
        let start = CellCoord::new(0, 1, 0);
        let goal = CellCoord::new(5, 2, 0);

        let climbing = PassabilityProfile {
            allow_diagonal: false,
            ..Default::default()
        };
        let finder = PathFinder::new(&map, climbing).unwrap();
        let path = finder.find_path_indices(start, goal).unwrap();
        assert_eq!(
            path,
            vec![
                CellCoord::new(0, 1, 0),
                CellCoord::new(1, 1, 0),
                CellCoord::new(2, 1, 0),
                CellCoord::new(3, 2, 0),
                CellCoord::new(4, 2, 0),
                CellCoord::new(5, 2, 0),
            ]
        );
        assert_valid_path(&finder, &path);

        let no_step = PassabilityProfile {
            max_step_cells: 0,
            ..climbing
        };
        let finder = PathFinder::new(&map, no_step).unwrap();
        assert!(finder.find_path_indices(start, goal).unwrap().is_empty());

        let gentle = PassabilityProfile {
            max_slope_degrees: 30.0,
            ..climbing
        };
        let finder = PathFinder::new(&map, gentle).unwrap();
        assert!(finder.find_path_indices(start, goal).unwrap().is_empty());
    }

    #[test]
    fn step_up_needs_head_clearance() {
        let mut map = floor_map([4, 4, 1]);
        map.set_solid(CellCoord::new(2, 1, 0), true);
        map.set_solid(CellCoord::new(3, 1, 0), true);
        // Ceiling right above the cell before the step.
        map.set_solid(CellCoord::new(1, 2, 0), true);
        let profile = PassabilityProfile {
            allow_diagonal: false,
            ..Default::default()
        };
        let finder = PathFinder::new(&map, profile).unwrap();
        assert!(finder
            .find_path_indices(CellCoord::new(0, 1, 0), CellCoord::new(3, 2, 0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn diagonal_moves_never_cut_blocked_corners() {
        let mut map = floor_map([4, 5, 4]);
        pillar(&mut map, 1, 0, 1..=3);
        pillar(&mut map, 0, 1, 1..=3);
        let finder = PathFinder::new(&map, flat_profile(true)).unwrap();
        let start = CellCoord::new(0, 1, 0);
        let goal = CellCoord::new(1, 1, 1);
        // The only way out of the corner is the cut, so there is no path.
        assert!(finder.find_path_indices(start, goal).unwrap().is_empty());

        // Open one side: the path must go around, never across the corner.
        let mut open = map.clone();
        for y in 1..=3 {
            open.set_solid(CellCoord::new(1, y, 0), false);
        }
        let finder = PathFinder::new(&open, flat_profile(true)).unwrap();
        let path = finder.find_path_indices(start, goal).unwrap();
        assert_eq!(path, vec![start, CellCoord::new(1, 1, 0), goal]);
        for w in path.windows(2) {
            let (a, b) = (w[0], w[1]);
            if a.x != b.x && a.z != b.z {
                assert!(!finder.is_blocked(CellCoord::new(b.x, a.y, a.z)));
                assert!(!finder.is_blocked(CellCoord::new(a.x, a.y, b.z)));
            }
        }
    }

    #[test]
    fn agent_radius_closes_narrow_corridor() {
        // Corridor of width 1 along z = 2 between two walls.
        let mut map = floor_map([6, 4, 5]);
        for x in 0..6 {
            pillar(&mut map, x, 1, 1..=2);
            pillar(&mut map, x, 3, 1..=2);
        }
        let start = CellCoord::new(0, 1, 2);
        let goal = CellCoord::new(5, 1, 2);

        let thin = PathFinder::new(&map, flat_profile(false)).unwrap();
        assert_eq!(thin.find_path_indices(start, goal).unwrap().len(), 6);

        let wide_profile = PassabilityProfile {
            agent_radius: 0.8,
            ..flat_profile(false)
        };
        let wide = PathFinder::new(&map, wide_profile).unwrap();
        assert!(wide.is_blocked(start));
        assert!(wide.find_path_indices(start, goal).unwrap().is_empty());

        // The floor does not inflate into the layer standing on it.
        let open = floor_map([3, 3, 3]);
        let finder = PathFinder::new(&open, wide_profile).unwrap();
        assert!(finder.is_walkable(CellCoord::new(1, 1, 1)));
    }

    #[test]
    fn free_flight_uses_vertical_moves() {
        let map = OccupancyMap::new([0.0; 3], 1.0, [3, 6, 3]).unwrap();
        let profile = PassabilityProfile {
            allow_vertical_movement: true,
            allow_diagonal: false,
            max_step_cells: 0,
            ..Default::default()
        };
        let finder = PathFinder::new(&map, profile).unwrap();
        let path = finder
            .find_path_indices(CellCoord::new(1, 0, 1), CellCoord::new(1, 5, 1))
            .unwrap();
        assert_eq!(path.len(), 6);
        assert!(path.iter().all(|c| c.x == 1 && c.z == 1));
        assert_valid_path(&finder, &path);
    }

    #[test]
    fn inflation_is_cubic_in_free_flight() {
        let mut map = OccupancyMap::new([0.0; 3], 1.0, [7, 7, 7]).unwrap();
        map.set_solid(CellCoord::new(3, 3, 3), true);
        let profile = PassabilityProfile {
            allow_vertical_movement: true,
            agent_radius: 1.5,
            ..Default::default()
        };
        let finder = PathFinder::new(&map, profile).unwrap();
        assert!(finder.is_blocked(CellCoord::new(1, 1, 1)));
        assert!(finder.is_blocked(CellCoord::new(5, 5, 5)));
        assert!(!finder.is_blocked(CellCoord::new(0, 3, 3)));
        assert_eq!(finder.walkable_mask().count(), 343 - 125);
    }

    #[test]
    fn search_budget_exhaustion_is_no_path() {
        let map = floor_map([10, 3, 10]);
        let finder = PathFinder::new(&map, flat_profile(false))
            .unwrap()
            .with_search_budget(3);
        assert!(finder
            .find_path_indices(CellCoord::new(0, 1, 0), CellCoord::new(9, 1, 9))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn snapping_prefers_closest_then_lowest_index() {
        let mut map = floor_map([5, 4, 5]);
        map.set_solid(CellCoord::new(2, 1, 2), true);
        let finder = PathFinder::new(&map, flat_profile(false)).unwrap();
        // Inside the solid cell: five candidates at distance 1; (1, 1, 2)
        // has the lowest linear index.
        assert_eq!(
            finder.snap_to_walkable([2.5, 1.5, 2.5]),
            Some(CellCoord::new(1, 1, 2))
        );
        // High in the air above the floor snaps down to the floor layer.
        assert_eq!(
            finder.snap_to_walkable([0.5, 3.5, 0.5]),
            Some(CellCoord::new(0, 1, 0))
        );
        // Far outside the grid still snaps onto it.
        assert_eq!(
            finder.snap_to_walkable([-50.0, 1.5, 0.5]),
            Some(CellCoord::new(0, 1, 0))
        );
    }

    #[test]
    fn snap_radius_limits_search() {
        let map = floor_map([5, 8, 5]);
        let finder = PathFinder::new(&map, flat_profile(false))
            .unwrap()
            .with_snap_radius(2);
        assert_eq!(finder.snap_to_walkable([0.5, 7.5, 0.5]), None);
        assert!(finder.find_path_world([0.5, 7.5, 0.5], [4.5, 1.5, 4.5]).is_empty());
    }

    #[test]
    fn reachability_is_six_connected_flood_fill() {
        let map = floor_map([4, 3, 5]);
        let finder = PathFinder::new(&map, PassabilityProfile::default()).unwrap();
        let reach = finder.get_reachable_indices(CellCoord::new(0, 1, 0)).unwrap();
        // Every free cell above the floor, not only the standing layer.
        assert_eq!(reach.len(), 40);
        assert!(reach.iter().all(|c| c.y >= 1));
        assert_eq!(
            finder.get_reachable_indices(CellCoord::new(3, 2, 4)).unwrap(),
            reach
        );
        // A blocked start reaches nothing.
        assert!(finder
            .get_reachable_indices(CellCoord::new(0, 0, 0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn reachability_covers_stepped_paths() {
        // Raised platform at x >= 3; A* climbs it with a one-cell step.
        let mut map = floor_map([6, 4, 1]);
        for x in 3..6 {
            map.set_solid(CellCoord::new(x, 1, 0), true);
        }
        let profile = PassabilityProfile {
            allow_diagonal: false,
            ..Default::default()
        };
        let finder = PathFinder::new(&map, profile).unwrap();
        let start = CellCoord::new(0, 1, 0);
        let goal = CellCoord::new(5, 2, 0);

        let path = finder.find_path_indices(start, goal).unwrap();
        assert_eq!(path.len(), 6);
        let reach = finder.get_reachable_indices(start).unwrap();
        for cell in &path {
            assert!(reach.contains(cell), "{cell} on the path but not reachable");
        }
        assert!(!reach.contains(&CellCoord::new(4, 1, 0)));
    }

    #[test]
    fn search_is_deterministic() {
        let mut map = floor_map([9, 4, 9]);
        pillar(&mut map, 4, 4, 1..=2);
        let finder = PathFinder::new(&map, PassabilityProfile::default()).unwrap();
        let a = finder
            .find_path_indices(CellCoord::new(0, 1, 0), CellCoord::new(8, 1, 8))
            .unwrap();
        let b = finder
            .find_path_indices(CellCoord::new(0, 1, 0), CellCoord::new(8, 1, 8))
            .unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert_valid_path(&finder, &a);
    }

    #[test]
    fn dilate_axis_marks_within_radius() {
        let src = [false, false, true, false, false, false, false];
        let out = dilate_axis(&src, 7, 1, 2);
        assert_eq!(out, vec![true, true, true, true, true, false, false]);
    }
}
