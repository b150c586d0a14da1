// radar_nav_store: chunked persistence and maintenance for radar maps.
//
// This crate keeps the sparse point data behind a radar map (solid voxels,
// flight history, ore hits, named paths, metadata) in fixed-size cubic
// chunks, so a mapper can resume after a restart and region queries only
// touch the chunks they need. It builds on `radar_nav_map` for the shared
// point, scan and occupancy types.
//
// Module overview:
// - `chunk.rs`:          ChunkId, ChunkKind and the persisted ChunkIndex.
// - `backend.rs`:        ChunkBackend: the persistence seam.
// - `sled_backend.rs`:   SledBackend: one document per key in a sled tree.
// - `sqlite_backend.rs`: SqliteBackend: one row per record in SQLite.
// - `store.rs`:          SpatialChunkStore: merge, load, region clear, thinning.
// - `thinning.rs`:       ThinningParams and the ore-sparing density rule.
// - `maintenance.rs`:    MapMaintenance: ingest, caps, routes, resource lookup.
// - `config.rs`:         StoreConfig: JSON-loaded store tunables.
// - `error.rs`:          StoreError.
//
// Single writer: every mutation takes `&mut self`. Backends tolerate
// concurrent readers on their own.

pub mod backend;
pub mod chunk;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod sled_backend;
pub mod sqlite_backend;
pub mod store;
pub mod thinning;

pub use backend::ChunkBackend;
pub use chunk::{ChunkId, ChunkIndex, ChunkKind, PointKind};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use maintenance::{ForgetSummary, IngestSummary, MapMaintenance, NearbyOre, ReduceStats};
pub use sled_backend::SledBackend;
pub use sqlite_backend::SqliteBackend;
pub use store::{ClearStats, MapSnapshot, SpatialChunkStore};
pub use thinning::{ThinningParams, ThinningStats};
