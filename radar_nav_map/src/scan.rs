// Radar scan payloads.
//
// A `ScanPayload` is one complete voxel scan as the radar exports it: the
// scan's own coordinate frame (`origin`, `cellSize`, `size`), its sequence
// markers (`revision`, `timestampMs`), the solid cells it saw, any
// axis-aligned boxes for large solid objects (parked grids), and the
// contacts and ore cells reported with it.
//
// Solid cells arrive in one of two encodings, distinguished by shape:
// - a list of linear indices into the scan's own frame, decoded as
//   `index = x * (ny * nz) + y * nz + z`;
// - a list of world-space points (solid voxel centres).
//
// The radar plugin uses short field names (`rev`, `tsMs`, `gridsAabb`,
// `oreCells`); both those and the long names are accepted.
//
// See also: `occupancy.rs` which merges payloads into the persistent grid,
// and `radar_nav_store::maintenance` which forwards voxels and ores into
// chunked storage.

use crate::error::{MapError, Result};
use crate::types::{CellCoord, Contact, OreHit, WorldPoint};
use serde::{Deserialize, Serialize};

/// Solid cell list in either of the radar's two encodings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SolidCells {
    /// Linear indices into the scan frame.
    Indices(Vec<u64>),
    /// World-space voxel centres.
    Points(Vec<WorldPoint>),
}

impl Default for SolidCells {
    fn default() -> Self {
        Self::Indices(Vec::new())
    }
}

impl SolidCells {
    pub fn len(&self) -> usize {
        match self {
            Self::Indices(v) => v.len(),
            Self::Points(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One radar voxel scan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    /// World position of the scan frame's cell (0, 0, 0) corner.
    pub origin: WorldPoint,
    /// Edge length of one cubic cell.
    pub cell_size: f64,
    /// Cell counts along x, y, z.
    pub size: [usize; 3],
    #[serde(default, alias = "rev")]
    pub revision: u64,
    #[serde(default, alias = "tsMs")]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub solid: SolidCells,
    /// `[minx, miny, minz, maxx, maxy, maxz]` boxes rasterized as solid.
    #[serde(default, alias = "gridsAabb")]
    pub bounding_boxes: Vec<[f64; 6]>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default, alias = "oreCells")]
    pub ores: Vec<OreHit>,
}

impl ScanPayload {
    /// Parse and validate a payload from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(json)?;
        payload.validate()?;
        Ok(payload)
    }

    /// Parse and validate a payload from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let payload: Self = serde_json::from_value(value)?;
        payload.validate()?;
        Ok(payload)
    }

    /// Check frame parameters and that every solid index fits the frame.
    pub fn validate(&self) -> Result<()> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(MapError::InvalidCellSize(self.cell_size));
        }
        if self.size.contains(&0) {
            return Err(MapError::EmptyGrid(self.size));
        }
        if !self.origin.iter().all(|v| v.is_finite()) {
            return Err(MapError::MalformedPayload(format!(
                "non-finite origin {:?}",
                self.origin
            )));
        }
        let total = self.total_cells() as u64;
        match &self.solid {
            SolidCells::Indices(indices) => {
                if let Some(bad) = indices.iter().find(|&&i| i >= total) {
                    return Err(MapError::MalformedPayload(format!(
                        "solid index {bad} outside frame of {total} cells"
                    )));
                }
            }
            SolidCells::Points(points) => {
                if points.iter().flatten().any(|v| !v.is_finite()) {
                    return Err(MapError::MalformedPayload(
                        "non-finite solid point".to_string(),
                    ));
                }
            }
        }
        if self.bounding_boxes.iter().flatten().any(|v| !v.is_finite()) {
            return Err(MapError::MalformedPayload(
                "non-finite bounding box".to_string(),
            ));
        }
        Ok(())
    }

    pub fn total_cells(&self) -> usize {
        self.size[0] * self.size[1] * self.size[2]
    }

    /// World-space corner opposite `origin`.
    pub fn frame_max(&self) -> WorldPoint {
        [
            self.origin[0] + self.size[0] as f64 * self.cell_size,
            self.origin[1] + self.size[1] as f64 * self.cell_size,
            self.origin[2] + self.size[2] as f64 * self.cell_size,
        ]
    }

    /// Decode a linear index into the scan frame.
    pub fn decode_index(&self, index: u64) -> CellCoord {
        let ny = self.size[1] as u64;
        let nz = self.size[2] as u64;
        let x = index / (ny * nz);
        let yz = index % (ny * nz);
        CellCoord::new(x as i32, (yz / nz) as i32, (yz % nz) as i32)
    }

    /// Centre of a scan-frame cell in world space.
    pub fn cell_center(&self, coord: CellCoord) -> WorldPoint {
        [
            self.origin[0] + (f64::from(coord.x) + 0.5) * self.cell_size,
            self.origin[1] + (f64::from(coord.y) + 0.5) * self.cell_size,
            self.origin[2] + (f64::from(coord.z) + 0.5) * self.cell_size,
        ]
    }

    /// Solid cells as world points, whichever encoding the scan used.
    pub fn solid_world_points(&self) -> Vec<WorldPoint> {
        match &self.solid {
            SolidCells::Points(points) => points.clone(),
            SolidCells::Indices(indices) => indices
                .iter()
                .map(|&i| self.cell_center(self.decode_index(i)))
                .collect(),
        }
    }

    /// True when the scan contributes no solid cells and no boxes.
    pub fn is_empty(&self) -> bool {
        self.solid.is_empty() && self.bounding_boxes.is_empty()
    }
}
