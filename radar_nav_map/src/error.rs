// Error types for the occupancy map and pathfinder.
//
// Every variant is a configuration error: the caller handed in parameters
// or a payload the core cannot work with. "Nothing found" outcomes (no
// path, no surface, unreachable goal) are ordinary return values and never
// appear here.

use crate::types::{CellCoord, WorldPoint};

/// Result type alias
pub type Result<T> = std::result::Result<T, MapError>;

/// Map configuration errors
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// Cell size is zero, negative, or not finite
    #[error("invalid cell size: {0}")]
    InvalidCellSize(f64),

    /// Grid has a zero-length dimension
    #[error("grid has zero cells: dimensions {0:?}")]
    EmptyGrid([usize; 3]),

    /// Incoming scan uses a different resolution than the map
    #[error("cell size mismatch: map uses {expected}, scan uses {actual}")]
    CellSizeMismatch {
        /// Cell size the map was created with
        expected: f64,
        /// Cell size carried by the scan
        actual: f64,
    },

    /// Explicit cell index outside the grid
    #[error("cell index {coord} is outside grid dimensions {dims:?}")]
    IndexOutOfBounds {
        /// Offending index
        coord: CellCoord,
        /// Grid dimensions
        dims: [usize; 3],
    },

    /// Scan payload missing fields or internally inconsistent
    #[error("malformed scan payload: {0}")]
    MalformedPayload(String),

    /// Passability profile parameters out of range
    #[error("invalid passability profile: {0}")]
    InvalidProfile(String),

    /// Sphere query with a non-finite centre or a negative radius
    #[error("invalid region: {0}")]
    InvalidRegion(String),
}

/// Check a sphere query: finite centre, finite non-negative radius.
pub fn check_region(center: WorldPoint, radius: f64) -> Result<()> {
    if !center.iter().all(|c| c.is_finite()) {
        return Err(MapError::InvalidRegion(format!("centre {center:?} is not finite")));
    }
    if !(radius.is_finite() && radius >= 0.0) {
        return Err(MapError::InvalidRegion(format!(
            "radius must be finite and non-negative, got {radius}"
        )));
    }
    Ok(())
}

impl MapError {
    /// Every map error is a configuration error.
    pub fn is_configuration(&self) -> bool {
        true
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}
