use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::broadcast::broadcast;
use super::health::{health, stats};
use super::lifecycle::{connect, disconnect};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health, stats & metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Gateway lifecycle callbacks
                .route("/connections/connect", post(connect))
                .route("/connections/disconnect", post(disconnect))
                // Manual trigger
                .route("/broadcast", post(broadcast)),
        )
}
