// Chunk addressing and the global chunk index.
//
// World space is bucketed into axis-aligned cubes of edge `chunk_size`.
// A point's chunk is `(floor(x / cs), floor(y / cs), floor(z / cs))`, written
// as the string `"x:y:z"` wherever it is persisted. Each chunk holds up to
// three independent records, one per `ChunkKind`.
//
// `ChunkIndex` lists, per kind, the chunks whose record is non-empty, plus
// the chunk size the store was created with. The store keeps it in memory
// and writes it back after every mutation so a restarted process can
// resume without listing every chunk.
//
// See also: `store.rs` which maintains the index, `backend.rs` for how it
// is persisted.

use crate::error::{Result, StoreError};
use radar_nav_map::WorldPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Record kinds stored per chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Solid voxel centres.
    Voxels,
    /// Positions the agent has been.
    Visited,
    /// Ore hit records.
    Ores,
}

impl ChunkKind {
    pub const ALL: [ChunkKind; 3] = [ChunkKind::Voxels, ChunkKind::Visited, ChunkKind::Ores];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voxels => "voxels",
            Self::Visited => "visited",
            Self::Ores => "ores",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "voxels" => Ok(Self::Voxels),
            "visited" => Ok(Self::Visited),
            "ores" => Ok(Self::Ores),
            other => Err(StoreError::UnknownKind(other.to_string())),
        }
    }
}

/// The two kinds that hold plain point sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointKind {
    Voxels,
    Visited,
}

impl From<PointKind> for ChunkKind {
    fn from(kind: PointKind) -> Self {
        match kind {
            PointKind::Voxels => ChunkKind::Voxels,
            PointKind::Visited => ChunkKind::Visited,
        }
    }
}

impl TryFrom<ChunkKind> for PointKind {
    type Error = StoreError;

    fn try_from(kind: ChunkKind) -> Result<Self> {
        match kind {
            ChunkKind::Voxels => Ok(PointKind::Voxels),
            ChunkKind::Visited => Ok(PointKind::Visited),
            ChunkKind::Ores => Err(StoreError::WrongKind(kind)),
        }
    }
}

/// Integer chunk coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl ChunkId {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing `point` for a given chunk size.
    pub fn for_point(point: WorldPoint, chunk_size: f64) -> Self {
        Self {
            x: (point[0] / chunk_size).floor() as i64,
            y: (point[1] / chunk_size).floor() as i64,
            z: (point[2] / chunk_size).floor() as i64,
        }
    }

    /// World-space `(min, max)` corners of this chunk.
    pub fn bounds(self, chunk_size: f64) -> (WorldPoint, WorldPoint) {
        let min = [
            self.x as f64 * chunk_size,
            self.y as f64 * chunk_size,
            self.z as f64 * chunk_size,
        ];
        (min, [min[0] + chunk_size, min[1] + chunk_size, min[2] + chunk_size])
    }

    /// Whether this chunk's cube comes within `radius` of `center`.
    pub fn intersects_sphere(self, chunk_size: f64, center: WorldPoint, radius: f64) -> bool {
        let (min, max) = self.bounds(chunk_size);
        let dist_sq: f64 = (0..3)
            .map(|a| {
                let d = (min[a] - center[a]).max(0.0).max(center[a] - max[a]);
                d * d
            })
            .sum();
        dist_sq <= radius * radius
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.z)
    }
}

impl FromStr for ChunkId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StoreError::InvalidChunkId(s.to_string());
        let mut parts = s.split(':');
        let mut next = || -> Result<i64> {
            parts
                .next()
                .and_then(|p| p.trim().parse().ok())
                .ok_or_else(invalid)
        };
        let id = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(id)
    }
}

impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which chunks hold data, per kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkIndex {
    pub chunk_size: f64,
    #[serde(default)]
    pub voxels: BTreeSet<ChunkId>,
    #[serde(default)]
    pub visited: BTreeSet<ChunkId>,
    #[serde(default)]
    pub ores: BTreeSet<ChunkId>,
}

impl ChunkIndex {
    pub fn new(chunk_size: f64) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }

    pub fn ids(&self, kind: ChunkKind) -> &BTreeSet<ChunkId> {
        match kind {
            ChunkKind::Voxels => &self.voxels,
            ChunkKind::Visited => &self.visited,
            ChunkKind::Ores => &self.ores,
        }
    }

    pub fn ids_mut(&mut self, kind: ChunkKind) -> &mut BTreeSet<ChunkId> {
        match kind {
            ChunkKind::Voxels => &mut self.voxels,
            ChunkKind::Visited => &mut self.visited,
            ChunkKind::Ores => &mut self.ores,
        }
    }

    /// Total chunk records across all kinds.
    pub fn chunk_count(&self) -> usize {
        self.voxels.len() + self.visited.len() + self.ores.len()
    }
}
