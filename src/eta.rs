//! Minutes-to-arrival estimates from a vehicle report and a stop position.
//!
//! Both the vehicle and the stop are projected onto the same [`RoutePath`]
//! (nearest vertex), which turns "how far is the bus from the stop" into a
//! distance along a single ordered polyline. Accuracy is bounded by the vertex
//! density of the path.

use std::time::Duration;

use serde::Serialize;

use crate::geo::{Coordinate, nearest_vertex_index, path_distance_km};
use crate::geometry::RoutePath;
use crate::vehicles::VehicleReport;

pub const DEFAULT_SPEED_KMPH: f64 = 18.0;
pub const MIN_SPEED_KMPH: f64 = 5.0;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaConfig {
    /// Used when a vehicle reports no speed (0, negative or not a number).
    pub default_speed_kmph: f64,
    /// Floor applied to every speed before dividing.
    pub min_speed_kmph: f64,
    /// Reports older than this are not considered live by queries.
    pub stale_after: Duration,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            default_speed_kmph: DEFAULT_SPEED_KMPH,
            min_speed_kmph: MIN_SPEED_KMPH,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Intermediate values of one estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EtaEstimate {
    pub bus_index: usize,
    pub stop_index: usize,
    pub distance_km: f64,
    pub speed_kmph: f64,
    pub minutes: u32,
}

impl EtaEstimate {
    /// The vehicle projects at or beyond the stop. Such estimates report 0
    /// minutes; this is not arrival detection.
    pub fn has_passed_stop(&self) -> bool {
        self.bus_index >= self.stop_index
    }
}

/// Speed used for the estimate: the reported speed when positive, the
/// configured default otherwise, never below the configured floor.
pub fn effective_speed_kmph(reported_kmph: f64, config: &EtaConfig) -> f64 {
    let speed = if reported_kmph.is_finite() && reported_kmph > 0.0 {
        reported_kmph
    } else {
        config.default_speed_kmph
    };
    speed.max(config.min_speed_kmph)
}

/// Converts a distance and speed into whole minutes, rounded half away from
/// zero and never negative.
pub fn minutes_for(distance_km: f64, speed_kmph: f64) -> u32 {
    let minutes = (distance_km / speed_kmph * 60.0).round();
    if minutes.is_finite() && minutes > 0.0 {
        // Saturating float-to-int cast.
        minutes as u32
    } else {
        0
    }
}

pub fn estimate_detailed(
    vehicle: &VehicleReport,
    stop: Coordinate,
    path: &RoutePath,
    config: &EtaConfig,
) -> EtaEstimate {
    let vertices = path.vertices();
    let bus_index = nearest_vertex_index(vertices, vehicle.position);
    let stop_index = nearest_vertex_index(vertices, stop);
    let distance_km = path_distance_km(vertices, bus_index, stop_index);
    let speed_kmph = effective_speed_kmph(vehicle.speed_kmph, config);

    EtaEstimate {
        bus_index,
        stop_index,
        distance_km,
        speed_kmph,
        minutes: minutes_for(distance_km, speed_kmph),
    }
}

/// Minutes until `vehicle` reaches `stop` along `path`.
pub fn estimate(
    vehicle: &VehicleReport,
    stop: Coordinate,
    path: &RoutePath,
    config: &EtaConfig,
) -> u32 {
    estimate_detailed(vehicle, stop, path, config).minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_vertex_path() -> RoutePath {
        RoutePath::from_coordinates([
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(0.0, 2.0),
        ])
        .unwrap()
    }

    fn vehicle_at(lat: f64, lon: f64, speed_kmph: f64) -> VehicleReport {
        VehicleReport {
            vehicle_id: "V1".to_string(),
            route_id: Some("R1".to_string()),
            position: Coordinate::new(lat, lon),
            speed_kmph,
            timestamp_ms: 0,
        }
    }

    /// Independent haversine used as the reference for the scenario check.
    fn reference_haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let r = 6371.0_f64;
        let d_lat = (lat2 - lat1).to_radians();
        let d_lon = (lon2 - lon1).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * r * a.sqrt().asin()
    }

    #[test]
    fn test_three_vertex_scenario() {
        let path = three_vertex_path();
        let vehicle = vehicle_at(0.0, 0.01, 30.0);
        let stop = Coordinate::new(0.0, 1.99);

        let est = estimate_detailed(&vehicle, stop, &path, &EtaConfig::default());

        let dist = reference_haversine(0.0, 0.0, 0.0, 1.0) + reference_haversine(0.0, 1.0, 0.0, 2.0);
        assert_eq!(est.bus_index, 0);
        assert_eq!(est.stop_index, 2);
        assert!((est.distance_km - dist).abs() < 1e-9);
        assert_eq!(est.minutes, (dist / 30.0 * 60.0).round() as u32);
        // 222.39 km at 30 km/h
        assert_eq!(est.minutes, 445);
        assert!(!est.has_passed_stop());
    }

    #[test]
    fn test_same_index_is_zero() {
        let path = three_vertex_path();
        let vehicle = vehicle_at(0.0, 1.02, 30.0);
        assert_eq!(
            estimate(&vehicle, Coordinate::new(0.01, 0.98), &path, &EtaConfig::default()),
            0
        );
    }

    #[test]
    fn test_passed_stop_is_zero() {
        let path = three_vertex_path();
        let vehicle = vehicle_at(0.0, 2.0, 30.0);
        let est = estimate_detailed(&vehicle, Coordinate::new(0.0, 0.0), &path, &EtaConfig::default());
        assert_eq!(est.minutes, 0);
        assert_eq!(est.distance_km, 0.0);
        assert!(est.has_passed_stop());
    }

    #[test]
    fn test_effective_speed_floor_and_default() {
        let config = EtaConfig::default();
        assert_eq!(effective_speed_kmph(0.0, &config), DEFAULT_SPEED_KMPH);
        assert_eq!(effective_speed_kmph(-12.0, &config), DEFAULT_SPEED_KMPH);
        assert_eq!(effective_speed_kmph(f64::NAN, &config), DEFAULT_SPEED_KMPH);
        assert_eq!(effective_speed_kmph(0.5, &config), MIN_SPEED_KMPH);
        assert_eq!(effective_speed_kmph(42.0, &config), 42.0);

        let slow_default = EtaConfig {
            default_speed_kmph: 1.0,
            ..EtaConfig::default()
        };
        assert_eq!(effective_speed_kmph(0.0, &slow_default), MIN_SPEED_KMPH);
    }

    #[test]
    fn test_monotonic_in_distance() {
        let path = RoutePath::from_coordinates((0..20).map(|i| Coordinate::new(0.0, i as f64 * 0.01)))
            .unwrap();
        let stop = Coordinate::new(0.0, 0.19);
        let config = EtaConfig::default();

        let mut previous = u32::MAX;
        for i in 0..20 {
            let minutes = estimate(&vehicle_at(0.0, i as f64 * 0.01, 25.0), stop, &path, &config);
            assert!(minutes <= previous);
            previous = minutes;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_monotonic_in_speed() {
        let path = three_vertex_path();
        let stop = Coordinate::new(0.0, 2.0);
        let config = EtaConfig::default();

        let mut previous = u32::MAX;
        for speed in [0.1, 3.0, 5.0, 10.0, 18.0, 30.0, 60.0, 120.0] {
            let minutes = estimate(&vehicle_at(0.0, 0.0, speed), stop, &path, &config);
            assert!(minutes <= previous, "speed {speed} gave {minutes} > {previous}");
            previous = minutes;
        }
    }

    #[test]
    fn test_minutes_for_rounds() {
        // 1 km at 60 km/h is exactly one minute.
        assert_eq!(minutes_for(1.0, 60.0), 1);
        assert_eq!(minutes_for(0.0, 60.0), 0);
        assert_eq!(minutes_for(0.75, 60.0), 1);
        assert_eq!(minutes_for(0.25, 60.0), 0);
    }

    #[test]
    fn test_single_vertex_path() {
        let path = RoutePath::from_coordinates([Coordinate::new(5.0, 5.0)]).unwrap();
        let vehicle = vehicle_at(0.0, 0.0, 20.0);
        assert_eq!(estimate(&vehicle, Coordinate::new(9.0, 9.0), &path, &EtaConfig::default()), 0);
    }
}
