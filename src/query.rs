//! Ranked arrival estimates for a stop.
//!
//! Resolves the stop, picks the live vehicles that can reach it, runs the ETA
//! engine for each one on its own route geometry and sorts the results.

use serde::Serialize;
use tracing::debug;

use crate::eta::{EtaConfig, estimate_detailed};
use crate::gtfs::{ReferenceData, Stop};
use crate::vehicles::{VehicleReport, VehicleStateTable};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown stop: {0}")]
    UnknownStop(String),

    #[error("unknown route: {0}")]
    UnknownRoute(String),
}

/// One row of a stop's arrival board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleEta {
    pub vehicle_id: String,
    pub route_id: String,
    pub eta_minutes: u32,
    pub distance_km: f64,
    pub speed_kmph: f64,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopEtas {
    pub stop: Stop,
    pub etas: Vec<VehicleEta>,
}

/// Arrival estimates for `stop_id`, best first.
///
/// Candidates are vehicles whose latest report is not stale and whose route
/// serves the stop, or only vehicles on `route_filter` when one is given.
/// Vehicles on routes without geometry are skipped. An empty list is a normal
/// answer.
pub fn stop_etas(
    reference: &ReferenceData,
    vehicles: &VehicleStateTable,
    stop_id: &str,
    route_filter: Option<&str>,
    now_ms: i64,
    config: &EtaConfig,
) -> Result<StopEtas, QueryError> {
    let stop = reference
        .stop(stop_id)
        .ok_or_else(|| QueryError::UnknownStop(stop_id.to_string()))?;

    let candidates: Vec<VehicleReport> = match route_filter {
        Some(route_id) => {
            if !reference.has_route(route_id) {
                return Err(QueryError::UnknownRoute(route_id.to_string()));
            }
            vehicles.by_route(route_id)
        }
        None => vehicles
            .snapshot()
            .into_iter()
            .filter(|v| {
                v.route_id
                    .as_deref()
                    .is_some_and(|route_id| reference.stop_serves_route(stop_id, route_id))
            })
            .collect(),
    };

    let mut etas: Vec<VehicleEta> = candidates
        .iter()
        .filter(|v| !v.is_stale(now_ms, config.stale_after))
        .filter_map(|v| {
            let route_id = v.route_id.as_deref()?;
            let path = reference.geometry().lookup(route_id)?;
            let est = estimate_detailed(v, stop.coordinate, path, config);
            Some(VehicleEta {
                vehicle_id: v.vehicle_id.clone(),
                route_id: route_id.to_string(),
                eta_minutes: est.minutes,
                distance_km: est.distance_km,
                speed_kmph: est.speed_kmph,
                last_seen_ms: v.timestamp_ms,
            })
        })
        .collect();

    etas.sort_by(|a, b| {
        a.eta_minutes
            .cmp(&b.eta_minutes)
            .then_with(|| a.distance_km.total_cmp(&b.distance_km))
            .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
    });

    debug!(
        stop_id,
        route = route_filter.unwrap_or("*"),
        candidates = candidates.len(),
        ranked = etas.len(),
        "Stop ETA query"
    );

    Ok(StopEtas {
        stop: stop.clone(),
        etas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::gtfs::GtfsFeed;
    use crate::gtfs::records::{RouteRecord, ShapePointRecord, StopRecord, StopTimeRecord, TripRecord};

    const NOW: i64 = 10_000_000;

    fn reference() -> ReferenceData {
        let stop = |id: &str, lon: f64| StopRecord {
            stop_id: id.into(),
            stop_name: Some(id.into()),
            stop_lat: 0.0,
            stop_lon: lon,
        };
        let call = |trip: &str, stop: &str, seq: u32| StopTimeRecord {
            trip_id: trip.into(),
            stop_id: stop.into(),
            stop_sequence: seq,
            arrival_time: None,
            departure_time: None,
        };
        let route = |id: &str| RouteRecord {
            route_id: id.into(),
            route_short_name: None,
            route_long_name: None,
        };

        ReferenceData::from_feed(GtfsFeed {
            stops: vec![stop("S0", 0.0), stop("S1", 0.1), stop("S2", 0.2)],
            routes: vec![route("R1"), route("R2"), route("EMPTY")],
            trips: vec![
                TripRecord {
                    route_id: "R1".into(),
                    trip_id: "T1".into(),
                    shape_id: Some("SH".into()),
                },
                TripRecord {
                    route_id: "R2".into(),
                    trip_id: "T2".into(),
                    shape_id: None,
                },
            ],
            stop_times: vec![
                call("T1", "S0", 1),
                call("T1", "S1", 2),
                call("T1", "S2", 3),
                call("T2", "S1", 1),
                call("T2", "S2", 2),
            ],
            shapes: (0..=20)
                .map(|i| ShapePointRecord {
                    shape_id: "SH".into(),
                    shape_pt_lat: 0.0,
                    shape_pt_lon: i as f64 * 0.01,
                    shape_pt_sequence: i,
                })
                .collect(),
        })
    }

    fn vehicle(id: &str, route: Option<&str>, lon: f64, speed: f64, ts: i64) -> VehicleReport {
        VehicleReport {
            vehicle_id: id.into(),
            route_id: route.map(Into::into),
            position: Coordinate::new(0.0, lon),
            speed_kmph: speed,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_ranks_by_eta() {
        let reference = reference();
        let table = VehicleStateTable::new();
        table.upsert(vehicle("far", Some("R1"), 0.0, 30.0, NOW));
        table.upsert(vehicle("near", Some("R1"), 0.15, 30.0, NOW));
        table.upsert(vehicle("mid", Some("R2"), 0.1, 30.0, NOW));

        let result = stop_etas(&reference, &table, "S2", None, NOW, &EtaConfig::default()).unwrap();

        let order: Vec<&str> = result.etas.iter().map(|e| e.vehicle_id.as_str()).collect();
        assert_eq!(order, vec!["near", "mid", "far"]);
        assert!(result.etas.windows(2).all(|w| w[0].eta_minutes <= w[1].eta_minutes));
        assert_eq!(result.stop.stop_id, "S2");
    }

    #[test]
    fn test_route_filter() {
        let reference = reference();
        let table = VehicleStateTable::new();
        table.upsert(vehicle("a", Some("R1"), 0.0, 30.0, NOW));
        table.upsert(vehicle("b", Some("R2"), 0.1, 30.0, NOW));

        let result =
            stop_etas(&reference, &table, "S2", Some("R2"), NOW, &EtaConfig::default()).unwrap();

        assert_eq!(result.etas.len(), 1);
        assert_eq!(result.etas[0].vehicle_id, "b");
        assert_eq!(result.etas[0].route_id, "R2");
    }

    #[test]
    fn test_stale_and_unrouted_vehicles_are_skipped() {
        let reference = reference();
        let table = VehicleStateTable::new();
        table.upsert(vehicle("stale", Some("R1"), 0.0, 30.0, NOW - 121_000));
        table.upsert(vehicle("no-route", None, 0.0, 30.0, NOW));
        table.upsert(vehicle("other-route", Some("R9"), 0.0, 30.0, NOW));

        let result = stop_etas(&reference, &table, "S2", None, NOW, &EtaConfig::default()).unwrap();
        assert!(result.etas.is_empty());
    }

    #[test]
    fn test_route_without_live_vehicles_is_empty_not_error() {
        let reference = reference();
        let table = VehicleStateTable::new();

        let result =
            stop_etas(&reference, &table, "S1", Some("R1"), NOW, &EtaConfig::default()).unwrap();
        assert!(result.etas.is_empty());

        let result =
            stop_etas(&reference, &table, "S1", Some("EMPTY"), NOW, &EtaConfig::default()).unwrap();
        assert!(result.etas.is_empty());
    }

    #[test]
    fn test_unknown_stop_and_route() {
        let reference = reference();
        let table = VehicleStateTable::new();
        let config = EtaConfig::default();

        assert_eq!(
            stop_etas(&reference, &table, "nope", None, NOW, &config),
            Err(QueryError::UnknownStop("nope".into()))
        );
        assert_eq!(
            stop_etas(&reference, &table, "S1", Some("R9"), NOW, &config),
            Err(QueryError::UnknownRoute("R9".into()))
        );
    }

    #[test]
    fn test_passed_vehicle_reports_zero() {
        let reference = reference();
        let table = VehicleStateTable::new();
        table.upsert(vehicle("past", Some("R1"), 0.2, 30.0, NOW));

        let result = stop_etas(&reference, &table, "S0", None, NOW, &EtaConfig::default()).unwrap();
        assert_eq!(result.etas.len(), 1);
        assert_eq!(result.etas[0].eta_minutes, 0);
    }
}
