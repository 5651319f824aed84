//! API layer - HTTP endpoint handlers organized by domain.

mod broadcast;
mod health;
mod lifecycle;
mod metrics;
mod routes;

pub use broadcast::{broadcast, BroadcastRequest};
pub use health::{health, stats, HealthResponse, StatsResponse};
pub use lifecycle::{connect, disconnect, LifecycleResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
