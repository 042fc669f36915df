//! Single ingress point for vehicle reports.
//!
//! [`LiveTracker`] owns the [`VehicleStateTable`] and the [`BroadcastHub`]
//! and applies every accepted report to both: first the table write, then the
//! broadcast. The broadcast runs while the vehicle's table entry is still held,
//! so concurrent reports for one vehicle reach subscribers in the order they
//! were stored and the last update a subscriber sees is the table's current
//! value. Lock order is table entry, then hub registry; the hub never reads
//! the table.

use std::sync::Arc;

use tracing::trace;

use crate::hub::{BroadcastHub, PublishOutcome, Subscription};
use crate::vehicles::{VehicleReport, VehicleStateTable};

pub struct LiveTracker {
    vehicles: VehicleStateTable,
    hub: Arc<BroadcastHub>,
}

impl LiveTracker {
    pub fn new(hub: BroadcastHub) -> Self {
        Self {
            vehicles: VehicleStateTable::new(),
            hub: Arc::new(hub),
        }
    }

    /// Stores `report` as its vehicle's latest state and broadcasts it.
    ///
    /// Never fails once the report is valid; subscribers that cannot take the
    /// update are dropped by the hub and only show up in the outcome.
    pub fn ingest(&self, report: VehicleReport) -> PublishOutcome {
        trace!(
            vehicle_id = %report.vehicle_id,
            route_id = report.route_id.as_deref().unwrap_or("-"),
            lat = report.position.lat,
            lon = report.position.lon,
            "Ingesting vehicle report"
        );
        let (_, outcome) = self
            .vehicles
            .upsert_then(report, |stored| self.hub.publish(stored.clone()));
        outcome
    }

    pub fn vehicles(&self) -> &VehicleStateTable {
        &self.vehicles
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

impl Default for LiveTracker {
    fn default() -> Self {
        Self::new(BroadcastHub::default())
    }
}
