// Movement constraints for the pathfinder.
//
// A `PassabilityProfile` describes the agent, not the terrain: how much
// clearance it needs, how steep a climb it accepts, how tall a step it can
// take, and which move directions it has. `PathFinder` reads it once at
// construction to pick the walkable mask (surface cells vs. all free cells),
// inflate obstacles, and build its neighbour offsets.
//
// See also: `pathfinding.rs` for where each field is enforced,
// `config.rs` which loads a profile from JSON.

use crate::error::{MapError, Result};
use serde::{Deserialize, Serialize};

/// Radii at or below this are treated as a point agent.
const MIN_AGENT_RADIUS: f64 = 1e-6;

const ORTHOGONAL: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const WITH_DIAGONALS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// How an agent is allowed to move through the grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassabilityProfile {
    /// Clearance around the agent in world units. Cells within this distance
    /// of a solid cell are not walkable.
    pub agent_radius: f64,
    /// Steepest climb or descent (rise over run) accepted between two cells.
    pub max_slope_degrees: f64,
    /// Largest change in y-index allowed on a single horizontal move.
    pub max_step_cells: u32,
    /// Free flight: every non-solid cell is walkable and pure vertical moves
    /// are allowed. When false the agent must stand on solid ground.
    pub allow_vertical_movement: bool,
    /// 8-neighbourhood horizontally instead of 4.
    pub allow_diagonal: bool,
}

impl Default for PassabilityProfile {
    fn default() -> Self {
        Self {
            agent_radius: 0.0,
            max_slope_degrees: 45.0,
            max_step_cells: 1,
            allow_vertical_movement: false,
            allow_diagonal: true,
        }
    }
}

impl PassabilityProfile {
    /// Reject parameters no search could honour.
    pub fn validate(&self) -> Result<()> {
        if !(self.agent_radius.is_finite() && self.agent_radius >= 0.0) {
            return Err(MapError::InvalidProfile(format!(
                "agent_radius must be finite and non-negative, got {}",
                self.agent_radius
            )));
        }
        if !(0.0..=90.0).contains(&self.max_slope_degrees) {
            return Err(MapError::InvalidProfile(format!(
                "max_slope_degrees must be within [0, 90], got {}",
                self.max_slope_degrees
            )));
        }
        Ok(())
    }

    /// Obstacle inflation in whole cells: `ceil(agent_radius / cell_size)`.
    pub fn inflation_cells(&self, cell_size: f64) -> usize {
        if self.agent_radius <= MIN_AGENT_RADIUS {
            return 0;
        }
        (self.agent_radius / cell_size).ceil() as usize
    }

    /// Horizontal `(dx, dz)` move offsets.
    pub fn horizontal_offsets(&self) -> &'static [(i32, i32)] {
        if self.allow_diagonal {
            &WITH_DIAGONALS
        } else {
            &ORTHOGONAL
        }
    }

    /// Whether a move rising `rise_cells` over a horizontal run of
    /// `run_cells` is within the slope limit. A zero run is a pure vertical
    /// move and is governed by `allow_vertical_movement` instead.
    pub fn slope_allowed(&self, rise_cells: f64, run_cells: f64) -> bool {
        if run_cells <= 0.0 {
            return self.allow_vertical_movement;
        }
        rise_cells.abs().atan2(run_cells).to_degrees() <= self.max_slope_degrees + 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_radar_tooling() {
        let p = PassabilityProfile::default();
        assert_eq!(p.max_step_cells, 1);
        assert_eq!(p.max_slope_degrees, 45.0);
        assert!(p.allow_diagonal);
        assert!(!p.allow_vertical_movement);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn inflation_rounds_up_and_ignores_tiny_radius() {
        let mut p = PassabilityProfile::default();
        assert_eq!(p.inflation_cells(2.0), 0);
        p.agent_radius = 1e-9;
        assert_eq!(p.inflation_cells(2.0), 0);
        p.agent_radius = 2.1;
        assert_eq!(p.inflation_cells(2.0), 2);
        p.agent_radius = 4.0;
        assert_eq!(p.inflation_cells(2.0), 2);
    }

    #[test]
    fn slope_limits() {
        let p = PassabilityProfile::default();
        assert!(p.slope_allowed(0.0, 1.0));
        assert!(p.slope_allowed(1.0, 1.0), "exactly 45 degrees is allowed");
        assert!(!p.slope_allowed(2.0, 1.0));
        assert!(p.slope_allowed(-1.0, 2f64.sqrt()), "descent uses the same limit");
        assert!(!p.slope_allowed(1.0, 0.0), "vertical needs allow_vertical_movement");

        let flat = PassabilityProfile {
            max_slope_degrees: 0.0,
            ..Default::default()
        };
        assert!(flat.slope_allowed(0.0, 1.0));
        assert!(!flat.slope_allowed(1.0, 5.0));
    }

    #[test]
    fn neighbourhood_size() {
        let four = PassabilityProfile {
            allow_diagonal: false,
            ..Default::default()
        };
        assert_eq!(four.horizontal_offsets().len(), 4);
        assert_eq!(PassabilityProfile::default().horizontal_offsets().len(), 8);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let steep = PassabilityProfile {
            max_slope_degrees: 120.0,
            ..Default::default()
        };
        assert!(steep.validate().is_err());
        let negative = PassabilityProfile {
            agent_radius: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let p: PassabilityProfile =
            serde_json::from_str(r#"{"agent_radius": 2.0, "allow_vertical_movement": true}"#)
                .unwrap();
        assert_eq!(p.agent_radius, 2.0);
        assert!(p.allow_vertical_movement);
        assert_eq!(p.max_step_cells, 1);
    }
}
