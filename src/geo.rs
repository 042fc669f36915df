//! Great-circle helpers used to project vehicles onto route geometry.
//!
//! All functions are pure. Path functions accept any slice whose items can be
//! viewed as a [`Coordinate`], so they work on raw coordinate lists as well as
//! on [`PathVertex`](crate::geometry::PathVertex) sequences.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("coordinate ({lat}, {lon}) is not a finite number")]
    NotFinite { lat: f64, lon: f64 },

    #[error("coordinate ({lat}, {lon}) is outside the valid latitude/longitude range")]
    OutOfRange { lat: f64, lon: f64 },
}

impl Coordinate {
    /// Builds a coordinate without range checks. Use [`Coordinate::try_new`]
    /// for data coming from outside the process.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Builds a coordinate, rejecting NaN/infinite values and anything outside
    /// latitude [-90, 90] / longitude [-180, 180].
    pub fn try_new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(GeoError::NotFinite { lat, lon });
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::OutOfRange { lat, lon });
        }
        Ok(Self { lat, lon })
    }
}

impl AsRef<Coordinate> for Coordinate {
    fn as_ref(&self) -> &Coordinate {
        self
    }
}

/// Haversine distance between two coordinates in kilometres.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    // Rounding can push `h` a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

/// Index of the path vertex closest to `p`.
///
/// Ties go to the lowest index. An empty path returns 0; callers are expected
/// to only project onto non-empty paths.
pub fn nearest_vertex_index<P: AsRef<Coordinate>>(path: &[P], p: Coordinate) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;

    for (i, vertex) in path.iter().enumerate() {
        let d = distance_km(*vertex.as_ref(), p);
        if d < best_dist {
            best_dist = d;
            best_idx = i;
        }
    }

    best_idx
}

/// Distance travelled along `path` from vertex `from_idx` to vertex `to_idx`.
///
/// Paths are one-directional: when `to_idx <= from_idx` the result is 0.
/// An index past the end is clamped to the last vertex.
pub fn path_distance_km<P: AsRef<Coordinate>>(path: &[P], from_idx: usize, to_idx: usize) -> f64 {
    let Some(last) = path.len().checked_sub(1) else {
        return 0.0;
    };
    let to_idx = to_idx.min(last);
    if to_idx <= from_idx {
        return 0.0;
    }

    path[from_idx..=to_idx]
        .windows(2)
        .map(|pair| distance_km(*pair[0].as_ref(), *pair[1].as_ref()))
        .sum()
}
