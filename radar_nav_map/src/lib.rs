// radar_nav_map: voxel occupancy and grid pathfinding for radar scans.
//
// This crate turns a stream of radar voxel scans into one growing 3D
// occupancy grid and searches it for paths an agent can actually follow.
// It does no I/O: persistence and multi-scan bookkeeping live in
// `radar_nav_store`, which depends on this crate.
//
// Module overview:
// - `types.rs`:       WorldPoint, CellCoord, Contact and OreHit.
// - `scan.rs`:        ScanPayload: one radar scan, in either solid-cell encoding.
// - `occupancy.rs`:   OccupancyMap: dense grid, incremental ingest, masks, surface queries.
// - `passability.rs`: PassabilityProfile: agent clearance, slope, step and move set.
// - `pathfinding.rs`: PathFinder: A* and reachability over an inflated grid.
// - `config.rs`:      NavConfig: JSON-loaded tunables and pathfinder construction.
// - `error.rs`:       MapError, the crate's configuration error.
//
// **Critical constraint: determinism.** Identical maps and profiles give
// identical paths. The open set breaks ties on the lowest linear index and
// no hash-ordered collection feeds a result.

pub mod config;
pub mod error;
pub mod occupancy;
pub mod passability;
pub mod pathfinding;
pub mod scan;
pub mod types;

pub use config::NavConfig;
pub use error::{MapError, Result, check_region};
pub use occupancy::{CellMask, OccupancyMap};
pub use passability::PassabilityProfile;
pub use pathfinding::PathFinder;
pub use scan::{ScanPayload, SolidCells};
pub use types::{CellCoord, Contact, OreHit, WorldPoint};
