use std::fmt;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::GridConfig;
use crate::error::{BucketError, Result};
use crate::models::GeoPoint;

/// Stable identifier of one hexagonal grid cell at the configured
/// resolution. Serialized as the canonical lowercase hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(CellIndex);

impl CellId {
    #[must_use]
    pub(crate) const fn index(self) -> CellIndex {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CellId {
    type Err = BucketError;

    fn from_str(raw: &str) -> Result<Self> {
        raw.parse::<CellIndex>()
            .map(Self)
            .map_err(|err| BucketError::InvalidCell(format!("{raw}: {err}")))
    }
}

impl Serialize for CellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Pure lat/lng -> cell mapping on the hexagonal grid, plus ring
/// enumeration. Resolution is fixed at construction; no state.
#[derive(Debug, Clone, Copy)]
pub struct GridIndexer {
    resolution: Resolution,
}

impl GridIndexer {
    pub fn new(config: &GridConfig) -> Result<Self> {
        let resolution = Resolution::try_from(config.resolution).map_err(|err| {
            BucketError::Validation(format!("grid resolution {}: {err}", config.resolution))
        })?;
        Ok(Self { resolution })
    }

    #[must_use]
    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Deterministic cell for a point. Rejects out-of-range or non-finite
    /// coordinates before they reach the grid library.
    pub fn cell_of(&self, point: GeoPoint) -> Result<CellId> {
        if !point.lat.is_finite() || !(-90.0..=90.0).contains(&point.lat) {
            return Err(BucketError::InvalidCoordinate(format!(
                "latitude {} outside [-90, 90]",
                point.lat
            )));
        }
        if !point.lng.is_finite() || !(-180.0..=180.0).contains(&point.lng) {
            return Err(BucketError::InvalidCoordinate(format!(
                "longitude {} outside [-180, 180]",
                point.lng
            )));
        }
        let latlng = LatLng::new(point.lat, point.lng)
            .map_err(|err| BucketError::InvalidCoordinate(err.to_string()))?;
        Ok(CellId(latlng.to_cell(self.resolution)))
    }

    /// All cells within `k` hops of `cell`, center included. k=0 is the
    /// cell itself, k=1 yields 7 cells, k=2 yields 19.
    #[must_use]
    pub fn ring_of(&self, cell: CellId, k: u32) -> Vec<CellId> {
        cell.index().grid_disk_safe(k).map(CellId).collect()
    }

    /// Center of a cell; the bucket centroid.
    #[must_use]
    pub fn center_of(&self, cell: CellId) -> GeoPoint {
        let latlng = LatLng::from(cell.index());
        GeoPoint::new(latlng.lat(), latlng.lng())
    }
}
