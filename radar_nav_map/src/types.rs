// Core types shared across the map, the pathfinder and the chunk store.
//
// Defines grid coordinates (`CellCoord`), world-space points (`WorldPoint`),
// and the small records a radar scan carries alongside its voxels:
// `Contact` (a transient grid or player sighting) and `OreHit` (a persisted
// resource location). All types derive `Serialize` and `Deserialize` so they
// can travel inside scan payloads and storage documents unchanged.
//
// World points are plain `[f64; 3]` arrays so they serialize as JSON
// triples, which is what the radar emits and what the stores persist.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A world-space position, `[x, y, z]`, in world units (metres in-game).
pub type WorldPoint = [f64; 3];

/// Squared Euclidean distance between two world points.
pub fn distance_sq(a: WorldPoint, b: WorldPoint) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Euclidean distance between two world points.
pub fn distance(a: WorldPoint, b: WorldPoint) -> f64 {
    distance_sq(a, b).sqrt()
}

/// A cell index in an occupancy grid. Each component counts cells from the
/// grid origin.
///
/// Axis conventions follow the radar export:
/// - X, Z: horizontal
/// - Y: up (positive) / down (negative)
///
/// The derived ordering is lexicographic on `(x, y, z)`, which matches the
/// grid's linear index order (`x * ny * nz + y * nz + z`). Sorting coords is
/// therefore the same as sorting linear indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset by a delta on each axis.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Manhattan distance between two coordinates.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        ((self.x - other.x).unsigned_abs())
            + ((self.y - other.y).unsigned_abs())
            + ((self.z - other.z).unsigned_abs())
    }

    /// Chebyshev (king-move) distance between two coordinates.
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
            .max((self.z - other.z).unsigned_abs())
    }

    /// Euclidean distance in index space.
    pub fn euclidean_distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Scan records
// ---------------------------------------------------------------------------

/// A dynamic entity reported by a radar scan (another grid, a player).
///
/// Contacts are never written into occupancy; the map keeps the latest
/// scan's list so callers can pick goals from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: i64,
    #[serde(alias = "pos", default)]
    pub position: WorldPoint,
}

/// A detected resource deposit.
///
/// `content` is whatever the detector attached (amount, block id, ...); the
/// core never interprets it. Identity is `(material, position)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OreHit {
    pub material: String,
    pub position: WorldPoint,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl OreHit {
    pub fn new(
        material: impl Into<String>,
        position: WorldPoint,
        content: serde_json::Value,
    ) -> Self {
        Self {
            material: material.into(),
            position,
            content,
        }
    }
}
