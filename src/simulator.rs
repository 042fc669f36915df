//! Fake fleet that drives buses along route geometry and posts telemetry.
//!
//! One vehicle per route (`<route_id>_V1`), stepping one path vertex per tick
//! and wrapping at the end of the path. Useful for demos and for exercising
//! the live streams without real devices.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::fetch::BasicClient;
use crate::geo::Coordinate;
use crate::geometry::RouteGeometryStore;

pub const DEFAULT_VEHICLE_LIMIT: usize = 20;
pub const DEFAULT_TICK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Base URL of the tracker, e.g. `http://localhost:8080`.
    pub backend_url: String,
    pub vehicle_limit: usize,
    pub tick: Duration,
}

impl SimulatorConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            vehicle_limit: DEFAULT_VEHICLE_LIMIT,
            tick: DEFAULT_TICK,
        }
    }

    fn telemetry_url(&self) -> String {
        format!("{}/api/telemetry", self.backend_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedVehicle {
    pub vehicle_id: String,
    pub route_id: String,
    path: Vec<Coordinate>,
    idx: usize,
}

impl SimulatedVehicle {
    pub fn new(route_id: &str, path: Vec<Coordinate>) -> Self {
        Self {
            vehicle_id: format!("{route_id}_V1"),
            route_id: route_id.to_string(),
            path,
            idx: 0,
        }
    }

    pub fn position(&self) -> Option<Coordinate> {
        self.path.get(self.idx).copied()
    }

    /// Telemetry for the current vertex, then moves to the next one.
    pub fn step(&mut self, speed_kmph: f64) -> Option<Value> {
        let p = self.position()?;
        self.idx = (self.idx + 1) % self.path.len();
        Some(json!({
            "vehicleId": self.vehicle_id,
            "routeId": self.route_id,
            "lat": p.lat,
            "lon": p.lon,
            "speedKmph": speed_kmph,
        }))
    }
}

/// One vehicle for each of the first `limit` routes (by id) with geometry.
pub fn fleet(geometry: &RouteGeometryStore, limit: usize) -> Vec<SimulatedVehicle> {
    let mut route_ids: Vec<&str> = geometry.route_ids().collect();
    route_ids.sort_unstable();

    route_ids
        .into_iter()
        .take(limit)
        .filter_map(|route_id| {
            let path = geometry.lookup(route_id)?;
            Some(SimulatedVehicle::new(route_id, path.coordinates().collect()))
        })
        .collect()
}

/// Random whole-number speed in [20, 35) km/h.
pub fn random_speed_kmph(rng: &mut impl Rng) -> f64 {
    f64::from(rng.random_range(20u32..35))
}

/// Posts telemetry for every vehicle each tick, forever. Failed posts are
/// logged and the vehicle still advances.
#[tracing::instrument(skip_all, fields(backend = %config.backend_url))]
pub async fn run(config: SimulatorConfig, geometry: &RouteGeometryStore) -> Result<()> {
    let mut vehicles = fleet(geometry, config.vehicle_limit);
    if vehicles.is_empty() {
        anyhow::bail!("no route geometry to simulate");
    }

    let client = BasicClient::with_timeout(Duration::from_secs(5))
        .context("Failed to build simulator HTTP client")?;
    let url = config.telemetry_url();
    info!(vehicles = vehicles.len(), %url, "Simulator started");

    let mut ticker = tokio::time::interval(config.tick);
    loop {
        ticker.tick().await;
        for v in &mut vehicles {
            let speed = random_speed_kmph(&mut rand::rng());
            let Some(body) = v.step(speed) else {
                continue;
            };
            match client.inner().post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(vehicle_id = %v.vehicle_id, "Telemetry posted");
                }
                Ok(resp) => warn!(vehicle_id = %v.vehicle_id, status = %resp.status(), "Telemetry rejected"),
                Err(e) => warn!(vehicle_id = %v.vehicle_id, error = %e, "Telemetry post failed"),
            }
        }
    }
}
