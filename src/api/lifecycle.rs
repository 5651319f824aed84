//! Connect/disconnect callbacks for an external WebSocket gateway.
//!
//! The gateway must never see these fail: malformed bodies and registry
//! outages still get `200`, and the outcome only shows up in logs and
//! metrics.

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use serde_json::Value;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub status: &'static str,
}

fn parse_event(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Lifecycle event body is not JSON");
        Value::Null
    })
}

/// POST /api/v1/connections/connect
#[tracing::instrument(name = "api.connect", skip(state, body))]
pub async fn connect(State(state): State<AppState>, body: Bytes) -> Json<LifecycleResponse> {
    let outcome = state.engine.on_connect_event(&parse_event(&body)).await;
    tracing::debug!(outcome = outcome.as_str(), "Connect event handled");
    Json(LifecycleResponse {
        status: "connected",
    })
}

/// POST /api/v1/connections/disconnect
#[tracing::instrument(name = "api.disconnect", skip(state, body))]
pub async fn disconnect(State(state): State<AppState>, body: Bytes) -> Json<LifecycleResponse> {
    let outcome = state.engine.on_disconnect_event(&parse_event(&body)).await;
    tracing::debug!(outcome = outcome.as_str(), "Disconnect event handled");
    Json(LifecycleResponse {
        status: "disconnected",
    })
}
