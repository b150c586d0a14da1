// Data-driven navigation configuration.
//
// `NavConfig` groups the tunables a host process hands the map and the
// pathfinder: the resolution maps are rebuilt at, the agent's
// `PassabilityProfile`, and the optional limits on search effort and on
// how far world points are snapped. Loaded from JSON; every field has a
// default so partial documents are accepted.
//
// See also: `passability.rs` for the profile fields, `pathfinding.rs` for
// the finder `NavConfig::path_finder` builds.

use crate::error::{MapError, Result};
use crate::occupancy::OccupancyMap;
use crate::passability::PassabilityProfile;
use crate::pathfinding::PathFinder;
use serde::{Deserialize, Serialize};

/// Navigation tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Cell edge length used when a map is rebuilt from stored points.
    pub cell_size: f64,
    pub passability: PassabilityProfile,
    /// Maximum A* node expansions per search. `None` searches exhaustively.
    pub search_budget: Option<usize>,
    /// Maximum distance, in cells, a world point is snapped to reach a
    /// walkable cell. `None` searches the whole grid.
    pub snap_radius_cells: Option<u32>,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            cell_size: 2.0,
            passability: PassabilityProfile::default(),
            search_budget: None,
            snap_radius_cells: None,
        }
    }
}

impl NavConfig {
    /// Parse and validate a config from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MapError::InvalidProfile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(MapError::InvalidCellSize(self.cell_size));
        }
        self.passability.validate()
    }

    /// Bind a pathfinder to `map` with this config's profile and limits.
    pub fn path_finder<'a>(&self, map: &'a OccupancyMap) -> Result<PathFinder<'a>> {
        let mut finder = PathFinder::new(map, self.passability)?;
        if let Some(budget) = self.search_budget {
            finder = finder.with_search_budget(budget);
        }
        if let Some(radius) = self.snap_radius_cells {
            finder = finder.with_snap_radius(radius);
        }
        Ok(finder)
    }
}
