//! Prometheus scrape endpoint.
//!
//! Counters move where events happen. Gauges describing current state (local
//! sockets, registry size, Redis reachability) are sampled on each scrape.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::error::{AppError, Result};
use crate::metrics::{self, RegistryMetrics};
use crate::server::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<Response> {
    sample_gauges(&state).await;

    let body = metrics::encode_metrics()
        .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response())
}

async fn sample_gauges(state: &AppState) {
    metrics::LOCAL_CONNECTIONS.set(state.hub.len() as i64);

    // An unreachable registry keeps the last sampled size
    if let Some(connections) = state.engine.registry().stats().await.connections {
        RegistryMetrics::set_size(connections);
    }

    if let Some(pool) = &state.redis_pool {
        RegistryMetrics::set_redis_status(pool.status(), pool.circuit_breaker().state());
    }
}
