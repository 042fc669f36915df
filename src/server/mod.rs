//! HTTP surface: REST queries, telemetry ingress, live streams and the SMS
//! webhook.
//!
//! [`start_server`] binds the configured address and serves the router from
//! [`build_router`] until the process is stopped.

pub mod error;
pub mod handlers;
pub mod live;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Builds the complete router.
///
/// - `GET /api/health`
/// - `GET /api/stops`, `GET /api/stops/{stop_id}/eta`
/// - `GET /api/routes`, `GET /api/routes/{route_id}/schedule`,
///   `GET /api/routes/{route_id}/vehicles`
/// - `GET /api/vehicles`, `POST /api/telemetry`
/// - `GET /api/live` (SSE), `GET /ws` (WebSocket)
/// - `POST /twilio/sms`
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allow_origin(cors_origin))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/stops", get(handlers::list_stops))
        .route("/api/stops/{stop_id}/eta", get(handlers::stop_eta))
        .route("/api/routes", get(handlers::list_routes))
        .route("/api/routes/{route_id}/schedule", get(handlers::route_schedule))
        .route("/api/routes/{route_id}/vehicles", get(handlers::route_vehicles))
        .route("/api/vehicles", get(handlers::list_vehicles))
        .route("/api/telemetry", post(handlers::post_telemetry))
        .route("/api/live", get(live::sse_live))
        .route("/ws", get(live::ws_live))
        .route("/twilio/sms", post(handlers::sms_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn allow_origin(origin: &str) -> AllowOrigin {
    if origin == "*" {
        return AllowOrigin::from(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            warn!(origin, error = %e, "Invalid CORS origin, allowing any");
            AllowOrigin::from(Any)
        }
    }
}

/// Serves the API until the process is terminated.
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<(), ServerError> {
    let addr = config
        .socket_addr()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    let router = build_router(state, &config.cors_origin);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, cors_origin = %config.cors_origin, "Tracker server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(String),

    #[error("serve error: {0}")]
    Serve(String),
}
