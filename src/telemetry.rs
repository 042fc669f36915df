//! Validation of inbound telemetry before it reaches the tracker.
//!
//! Both the HTTP endpoint and WebSocket frames carry the same JSON object.
//! Driver apps use either camelCase (`vehicleId`, `routeId`) or the
//! broadcast field names (`bus_id`, `route_id`); both are accepted.

use serde::Deserialize;
use serde_json::Value;

use crate::geo::{Coordinate, GeoError};
use crate::vehicles::VehicleReport;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry payload is not a JSON object: {0}")]
    Malformed(String),

    #[error("vehicleId, lat, lon required")]
    MissingField,

    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),
}

/// Telemetry as received, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    #[serde(default, alias = "bus_id")]
    pub vehicle_id: Option<Value>,
    #[serde(default, alias = "route_id")]
    pub route_id: Option<Value>,
    #[serde(default)]
    pub lat: Option<Value>,
    #[serde(default)]
    pub lon: Option<Value>,
    #[serde(default, alias = "speed_kmph")]
    pub speed_kmph: Option<Value>,
    #[serde(default)]
    pub ts: Option<Value>,
}

impl TelemetryPayload {
    pub fn from_json(value: Value) -> Result<Self, TelemetryError> {
        if !value.is_object() {
            return Err(TelemetryError::Malformed(value.to_string()));
        }
        serde_json::from_value(value).map_err(|e| TelemetryError::Malformed(e.to_string()))
    }

    pub fn from_text(text: &str) -> Result<Self, TelemetryError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| TelemetryError::Malformed(e.to_string()))?;
        Self::from_json(value)
    }

    /// Turns the payload into a report stamped with `now_ms` when it carries
    /// no timestamp of its own.
    ///
    /// `vehicleId` must be a non-empty string and `lat`/`lon` JSON numbers.
    /// A missing, negative or non-numeric speed becomes 0 ("unknown").
    pub fn into_report(self, now_ms: i64) -> Result<VehicleReport, TelemetryError> {
        let vehicle_id = match self.vehicle_id {
            Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
            // Numeric ids are common in driver apps.
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(TelemetryError::MissingField),
        };

        let (Some(lat), Some(lon)) = (
            self.lat.as_ref().and_then(Value::as_f64),
            self.lon.as_ref().and_then(Value::as_f64),
        ) else {
            return Err(TelemetryError::MissingField);
        };
        let position = Coordinate::try_new(lat, lon)?;

        let route_id = match self.route_id {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let speed_kmph = self
            .speed_kmph
            .as_ref()
            .and_then(loose_number)
            .filter(|s| s.is_finite() && *s >= 0.0)
            .unwrap_or(0.0);

        let timestamp_ms = self
            .ts
            .as_ref()
            .and_then(loose_number)
            .filter(|ts| ts.is_finite() && *ts > 0.0)
            .map_or(now_ms, |ts| ts as i64);

        Ok(VehicleReport {
            vehicle_id,
            route_id,
            position,
            speed_kmph,
            timestamp_ms,
        })
    }
}

/// Numbers, or strings holding a number.
fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
