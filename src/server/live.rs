//! Live position streams.
//!
//! `GET /api/live` is a Server-Sent Events stream and `GET /ws` a WebSocket.
//! Each connection holds its own [`Subscription`](crate::hub::Subscription);
//! when the client goes away the subscription is dropped and the hub forgets
//! it. A client that falls too far behind is dropped by the hub and its
//! stream ends.
//!
//! Every update is framed as `{"event": "bus_update", "data": <report>}`.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::state::AppState;
use crate::telemetry::TelemetryPayload;
use crate::vehicles::VehicleReport;

pub const BUS_UPDATE: &str = "bus_update";

pub fn bus_update(report: &VehicleReport) -> Value {
    json!({ "event": BUS_UPDATE, "data": report })
}

/// `GET /api/live`
pub async fn sse_live(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.tracker.subscribe();
    debug!(subscriber = %subscription.id(), "SSE client connected");

    let connected = stream::once(async { Event::default().json_data(json!({ "msg": "connected" })) });
    let updates = stream::unfold(subscription, |mut sub| async move {
        let report = sub.recv().await?;
        Some((Event::default().json_data(bus_update(&report)), sub))
    });

    Sse::new(connected.chain(updates)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// `GET /ws`
pub async fn ws_live(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Forwards hub updates to the client and ingests telemetry frames sent by
/// it, until either side goes away.
async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut subscription = state.tracker.subscribe();
    let id = subscription.id();
    debug!(subscriber = %id, "WebSocket client connected");

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(report) = update else {
                    debug!(subscriber = %id, "Subscriber dropped by hub, closing WebSocket");
                    return;
                };
                let msg = Message::Text(bus_update(&report).to_string().into());
                if socket.send(msg).await.is_err() {
                    debug!(subscriber = %id, "WebSocket client disconnected (send failed)");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = ingest_frame(&state, text.as_str()) {
                            if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(subscriber = %id, "WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(subscriber = %id, "WebSocket client disconnected");
                        return;
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %id, "WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Ingests one inbound telemetry frame. Returns an error frame for the
/// client when the frame is rejected.
fn ingest_frame(state: &AppState, text: &str) -> Option<Value> {
    let parsed = TelemetryPayload::from_text(text).and_then(|p| p.into_report(state.now_ms()));
    match parsed {
        Ok(report) => {
            state.tracker.ingest(report);
            None
        }
        Err(e) => {
            warn!(error = %e, "Rejected WebSocket telemetry frame");
            Some(json!({ "error": e.to_string() }))
        }
    }
}
