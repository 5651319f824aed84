//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection::HubStats;
use crate::fanout::FanoutStatsSnapshot;
use crate::redis::{RedisPoolStats, RedisStatus};
use crate::registry::RegistryStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub registry_backend: String,
    pub delivery_channel: String,
    /// Present only with the Redis registry backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisStatus>,
    pub local_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub fanout: FanoutStatsSnapshot,
    pub registry: RegistryStats,
    pub hub: HubStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisPoolStats>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // Broadcasts fail while the registry store is unreachable
    let redis = state.redis_pool.as_ref().map(|pool| pool.status());
    let healthy = redis.map_or(true, |status| status == RedisStatus::Connected);
    let status = if healthy { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        registry_backend: state.engine.registry().backend_name().to_string(),
        delivery_channel: state.engine.channel_name().to_string(),
        redis,
        local_connections: state.hub.len(),
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry = state.engine.registry().stats().await;

    let redis = state.redis_pool.as_ref().map(|pool| pool.stats());

    Json(StatsResponse {
        fanout: state.engine.stats(),
        registry,
        hub: state.hub.stats(),
        redis,
    })
}
