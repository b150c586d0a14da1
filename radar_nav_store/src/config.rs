// Data-driven store configuration.
//
// `StoreConfig` carries the chunk size a store is bucketed at, the density
// thinning parameters, and an optional global cap on stored voxel points
// that `MapMaintenance::ingest_scan` enforces after every scan. Loaded from
// JSON; missing fields take their defaults.
//
// The chunk size is persisted with the index on first use. Reopening a
// store with a different value is refused rather than silently rebucketed.
//
// See also: `thinning.rs` for `ThinningParams`, `maintenance.rs` which
// consumes this config.

use crate::error::{Result, StoreError};
use crate::thinning::ThinningParams;
use serde::{Deserialize, Serialize};

/// Storage tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Edge length of a storage chunk in world units.
    pub chunk_size: f64,
    pub thinning: ThinningParams,
    /// When set, every ingest subsamples voxels down to roughly this many.
    pub max_voxel_points: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50.0,
            thinning: ThinningParams::default(),
            max_voxel_points: None,
        }
    }
}

impl StoreConfig {
    /// Parse and validate a config from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.chunk_size.is_finite() && self.chunk_size > 0.0) {
            return Err(StoreError::InvalidConfig(format!(
                "chunk size must be positive, got {}",
                self.chunk_size
            )));
        }
        if self.max_voxel_points == Some(0) {
            return Err(StoreError::InvalidConfig(
                "max_voxel_points must be at least 1".to_string(),
            ));
        }
        self.thinning.validate()
    }
}
