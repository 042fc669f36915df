//! Row types for the static GTFS files the tracker reads.
//!
//! Only the columns the tracker uses are declared; any other column in the
//! file is ignored. Optional GTFS columns default to `None` when absent.

use serde::Deserialize;

/// A row of `stops.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: Option<String>,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

/// A row of `routes.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRecord {
    pub route_id: String,
    #[serde(default)]
    pub route_short_name: Option<String>,
    #[serde(default)]
    pub route_long_name: Option<String>,
}

/// A row of `trips.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct TripRecord {
    pub route_id: String,
    pub trip_id: String,
    #[serde(default)]
    pub shape_id: Option<String>,
}

/// A row of `stop_times.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
}

/// A row of `shapes.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShapePointRecord {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
}
