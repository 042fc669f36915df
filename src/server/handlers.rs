//! REST handlers.
//!
//! Map-facing listings are GeoJSON (`[lon, lat]` coordinate order); query
//! results are plain JSON.

use axum::Json;
use axum::extract::{Form, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;
use crate::geo::Coordinate;
use crate::query::{StopEtas, stop_etas};
use crate::sms::{reply_text, twiml_message};
use crate::telemetry::TelemetryPayload;
use crate::vehicles::VehicleReport;

/// Optional `?routeId=` filter. An empty value means no filter.
#[derive(Debug, Default, Deserialize)]
pub struct RouteFilter {
    #[serde(rename = "routeId")]
    pub route_id: Option<String>,
}

impl RouteFilter {
    fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref().filter(|r| !r.is_empty())
    }
}

fn lon_lat(c: Coordinate) -> [f64; 2] {
    [c.lon, c.lat]
}

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// `GET /api/stops?routeId=`
pub async fn list_stops(
    State(state): State<AppState>,
    Query(filter): Query<RouteFilter>,
) -> Json<Value> {
    let reference = &state.reference;
    let route_filter = filter.route_id();

    let features: Vec<Value> = reference
        .stops()
        .iter()
        .filter(|s| route_filter.is_none_or(|r| reference.stop_serves_route(&s.stop_id, r)))
        .map(|s| {
            let route_ids: Vec<&str> = reference.routes_serving(&s.stop_id).collect();
            let route_id = route_filter.or_else(|| route_ids.first().copied());
            json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": lon_lat(s.coordinate) },
                "properties": {
                    "stop_id": s.stop_id,
                    "name": s.name,
                    "route_id": route_id,
                    "route_ids": route_ids,
                },
            })
        })
        .collect();

    Json(json!({ "type": "FeatureCollection", "features": features }))
}

/// `GET /api/stops/{stop_id}/eta?routeId=`
pub async fn stop_eta(
    State(state): State<AppState>,
    Path(stop_id): Path<String>,
    Query(filter): Query<RouteFilter>,
) -> Result<Json<StopEtas>, ApiError> {
    let board = stop_etas(
        &state.reference,
        state.tracker.vehicles(),
        &stop_id,
        filter.route_id(),
        state.now_ms(),
        &state.eta,
    )?;
    Ok(Json(board))
}

/// `GET /api/routes`
pub async fn list_routes(State(state): State<AppState>) -> Json<Value> {
    let reference = &state.reference;
    let geometry = reference.geometry();

    let mut route_ids: Vec<&str> = geometry.route_ids().collect();
    route_ids.sort_unstable();

    let features: Vec<Value> = route_ids
        .into_iter()
        .filter_map(|route_id| {
            let path = geometry.lookup(route_id)?;
            let coordinates: Vec<[f64; 2]> = path.coordinates().map(lon_lat).collect();
            let route = reference.route(route_id);
            Some(json!({
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": coordinates },
                "properties": {
                    "route_id": route_id,
                    "short_name": route.and_then(|r| r.short_name.as_deref()),
                    "long_name": route.and_then(|r| r.long_name.as_deref()),
                },
            }))
        })
        .collect();

    Json(json!({ "type": "FeatureCollection", "features": features }))
}

/// `GET /api/routes/{route_id}/schedule`
pub async fn route_schedule(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let trips = state
        .reference
        .schedule(&route_id)
        .ok_or_else(|| ApiError::NotFound(format!("no trips for route: {route_id}")))?;
    Ok(Json(json!({ "route_id": route_id, "trips": trips })))
}

/// `GET /api/routes/{route_id}/vehicles`
pub async fn route_vehicles(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
) -> Json<Vec<VehicleReport>> {
    let mut vehicles = state.tracker.vehicles().by_route(&route_id);
    vehicles.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
    Json(vehicles)
}

/// `GET /api/vehicles`
pub async fn list_vehicles(State(state): State<AppState>) -> Json<Vec<VehicleReport>> {
    let mut vehicles = state.tracker.vehicles().snapshot();
    vehicles.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
    Json(vehicles)
}

/// `POST /api/telemetry`
///
/// The body is parsed by hand so malformed JSON gets the same error shape as
/// a missing field.
pub async fn post_telemetry(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let report = TelemetryPayload::from_text(&body)?.into_report(state.now_ms())?;
    let vehicle_id = report.vehicle_id.clone();
    let outcome = state.tracker.ingest(report);
    debug!(
        %vehicle_id,
        delivered = outcome.delivered,
        dropped = outcome.dropped,
        "Telemetry accepted"
    );
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct SmsForm {
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// `POST /twilio/sms`
pub async fn sms_webhook(State(state): State<AppState>, Form(form): Form<SmsForm>) -> impl IntoResponse {
    let reply = reply_text(
        &form.body,
        &state.reference,
        state.tracker.vehicles(),
        state.now_ms(),
        &state.eta,
    );
    debug!(body = %form.body, %reply, "SMS request answered");
    ([(header::CONTENT_TYPE, "text/xml")], twiml_message(&reply))
}
