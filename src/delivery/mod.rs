//! Delivery channels: how a payload reaches one connection.
//!
//! - `LocalDeliveryChannel`: sockets accepted by this process on `/ws`
//! - `HttpDeliveryChannel`: an external management API (`POST @connections/{id}`)

mod channel;
mod http;
mod local;

use std::sync::Arc;

use thiserror::Error;

use crate::config::DeliveryConfig;
use crate::connection::ConnectionHub;

pub use channel::{DeliveryChannel, DeliveryError};
pub use http::HttpDeliveryChannel;
pub use local::LocalDeliveryChannel;

/// Errors raised while building a delivery channel at startup
#[derive(Debug, Error)]
pub enum DeliverySetupError {
    #[error("Delivery mode \"http\" requires delivery.endpoint")]
    MissingEndpoint,

    #[error("Invalid delivery endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Unknown delivery mode: {0}")]
    UnknownMode(String),
}

/// Create the delivery channel selected by `delivery.mode`.
pub fn create_delivery_channel(
    settings: &DeliveryConfig,
    hub: Arc<ConnectionHub>,
) -> Result<Arc<dyn DeliveryChannel>, DeliverySetupError> {
    match settings.mode.as_str() {
        "websocket" => {
            tracing::info!(mode = "websocket", "Creating local delivery channel");
            Ok(Arc::new(LocalDeliveryChannel::new(hub)))
        }
        "http" => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .ok_or(DeliverySetupError::MissingEndpoint)?;
            tracing::info!(mode = "http", endpoint = %endpoint, "Creating HTTP delivery channel");
            Ok(Arc::new(HttpDeliveryChannel::new(endpoint)?))
        }
        other => Err(DeliverySetupError::UnknownMode(other.to_string())),
    }
}
