//! Latest known state of every tracked vehicle.
//!
//! [`VehicleStateTable`] keeps exactly one [`VehicleReport`] per vehicle id.
//! It is backed by a sharded concurrent map: writers for different vehicles
//! rarely contend, and a report is always swapped in as a whole so readers
//! never see half of an update.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// One position report for one vehicle, as stored and as broadcast.
///
/// Serialises to the flat shape the web clients consume:
/// `{"bus_id", "route_id", "lat", "lon", "speedKmph", "ts"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleReport {
    #[serde(rename = "bus_id")]
    pub vehicle_id: String,
    pub route_id: Option<String>,
    #[serde(flatten)]
    pub position: Coordinate,
    /// km/h; 0 when the source did not report a usable speed.
    #[serde(rename = "speedKmph")]
    pub speed_kmph: f64,
    /// Wall-clock milliseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub timestamp_ms: i64,
}

impl VehicleReport {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }

    /// Whether the report is too old to count as a live position.
    pub fn is_stale(&self, now_ms: i64, threshold: Duration) -> bool {
        let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        self.age_ms(now_ms) > threshold_ms
    }

    pub fn is_on_route(&self, route_id: &str) -> bool {
        self.route_id.as_deref() == Some(route_id)
    }
}

/// Vehicle id to latest [`VehicleReport`].
#[derive(Debug, Default)]
pub struct VehicleStateTable {
    entries: DashMap<String, VehicleReport>,
}

impl VehicleStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever was stored for the report's vehicle and returns the
    /// previous report, if any.
    pub fn upsert(&self, report: VehicleReport) -> Option<VehicleReport> {
        self.entries.insert(report.vehicle_id.clone(), report)
    }

    /// Stores `report` and runs `then` on the stored value before the
    /// vehicle's entry is released.
    ///
    /// Two calls for the same vehicle never interleave, so whatever `then`
    /// does (e.g. broadcasting) happens in the same order as the writes.
    /// `then` must not touch this table.
    pub fn upsert_then<R>(
        &self,
        report: VehicleReport,
        then: impl FnOnce(&VehicleReport) -> R,
    ) -> (Option<VehicleReport>, R) {
        match self.entries.entry(report.vehicle_id.clone()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(report);
                let out = then(entry.get());
                (Some(previous), out)
            }
            Entry::Vacant(entry) => {
                let stored = entry.insert(report);
                let out = then(stored.value());
                (None, out)
            }
        }
    }

    pub fn get(&self, vehicle_id: &str) -> Option<VehicleReport> {
        self.entries.get(vehicle_id).map(|entry| entry.value().clone())
    }

    /// Point-in-time copy of every entry.
    ///
    /// Each entry is cloned under its shard's read lock; later upserts do not
    /// touch the returned values.
    pub fn snapshot(&self) -> Vec<VehicleReport> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot filtered to vehicles currently reporting `route_id`.
    pub fn by_route(&self, route_id: &str) -> Vec<VehicleReport> {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_on_route(route_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn report(id: &str, route: Option<&str>, lat: f64, lon: f64, ts: i64) -> VehicleReport {
        VehicleReport {
            vehicle_id: id.to_string(),
            route_id: route.map(str::to_string),
            position: Coordinate::new(lat, lon),
            speed_kmph: 20.0,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_upsert_replaces_previous_report() {
        let table = VehicleStateTable::new();
        assert!(table.upsert(report("V1", Some("R1"), 1.0, 1.0, 1)).is_none());

        let previous = table.upsert(report("V1", Some("R2"), 2.0, 2.0, 2));
        assert_eq!(previous.unwrap().timestamp_ms, 1);

        assert_eq!(table.len(), 1);
        let current = table.get("V1").unwrap();
        assert_eq!(current.route_id.as_deref(), Some("R2"));
        assert_eq!(current.position, Coordinate::new(2.0, 2.0));
    }

    #[test]
    fn test_upsert_then_sees_stored_report() {
        let table = VehicleStateTable::new();

        let (previous, seen) = table.upsert_then(report("V1", Some("R1"), 1.0, 1.0, 1), |r| r.timestamp_ms);
        assert!(previous.is_none());
        assert_eq!(seen, 1);

        let (previous, seen) = table.upsert_then(report("V1", Some("R1"), 2.0, 2.0, 2), |r| r.clone());
        assert_eq!(previous.unwrap().timestamp_ms, 1);
        assert_eq!(seen, table.get("V1").unwrap());
    }

    #[test]
    fn test_get_unknown_vehicle() {
        let table = VehicleStateTable::new();
        assert!(table.get("ghost").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_upserts() {
        let table = VehicleStateTable::new();
        table.upsert(report("V1", Some("R1"), 1.0, 1.0, 1));

        let snapshot = table.snapshot();
        table.upsert(report("V1", Some("R1"), 5.0, 5.0, 2));
        table.upsert(report("V2", Some("R1"), 6.0, 6.0, 2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].position, Coordinate::new(1.0, 1.0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_by_route_filters() {
        let table = VehicleStateTable::new();
        table.upsert(report("V1", Some("R1"), 1.0, 1.0, 1));
        table.upsert(report("V2", Some("R2"), 1.0, 1.0, 1));
        table.upsert(report("V3", None, 1.0, 1.0, 1));

        let on_r1 = table.by_route("R1");
        assert_eq!(on_r1.len(), 1);
        assert_eq!(on_r1[0].vehicle_id, "V1");
        assert!(table.by_route("R9").is_empty());
    }

    #[test]
    fn test_staleness() {
        let r = report("V1", None, 0.0, 0.0, 1_000);
        let threshold = Duration::from_secs(120);
        assert!(!r.is_stale(1_000 + 120_000, threshold));
        assert!(r.is_stale(1_000 + 120_001, threshold));
        // Reports from the future are not stale.
        assert!(!r.is_stale(0, threshold));
    }

    #[test]
    fn test_concurrent_upserts_never_mix_vehicles() {
        let table = Arc::new(VehicleStateTable::new());
        let mut handles = Vec::new();

        for (id, lat, lon) in [("V1", 10.0, 20.0), ("V2", -30.0, -40.0)] {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for ts in 0..2_000 {
                    table.upsert(VehicleReport {
                        vehicle_id: id.to_string(),
                        route_id: Some(format!("route-{id}")),
                        position: Coordinate::new(lat, lon),
                        speed_kmph: lat.abs(),
                        timestamp_ms: ts,
                    });
                }
            }));
        }

        let reader = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    if let Some(v1) = table.get("V1") {
                        assert_eq!(v1.position, Coordinate::new(10.0, 20.0));
                        assert_eq!(v1.route_id.as_deref(), Some("route-V1"));
                        assert_eq!(v1.speed_kmph, 10.0);
                    }
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("V1").unwrap().timestamp_ms, 1_999);
        assert_eq!(table.get("V2").unwrap().position, Coordinate::new(-30.0, -40.0));
    }

    #[test]
    fn test_report_wire_format() {
        let json = serde_json::to_value(report("V1", Some("R1"), 12.5, 77.25, 42)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "bus_id": "V1",
                "route_id": "R1",
                "lat": 12.5,
                "lon": 77.25,
                "speedKmph": 20.0,
                "ts": 42
            })
        );
    }
}
