use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::connection::ConnectionId;
use crate::fanout::Payload;

/// Why a single push did not land.
///
/// Only `Gone` is authoritative for eviction. Every other variant means the
/// connection may still be alive and must stay registered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The transport says the endpoint no longer exists
    #[error("Connection is gone")]
    Gone,

    /// The send did not finish before its deadline
    #[error("Delivery deadline exceeded")]
    Timeout,

    /// Any other failure (5xx, network error, full buffer, throttling)
    #[error("Transient delivery error: {0}")]
    Transient(String),
}

/// Per-connection push primitive offered by the transport.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Attempt one push of `payload` to `id`, giving up at `deadline`.
    async fn send(
        &self,
        id: &ConnectionId,
        payload: &Payload,
        deadline: Instant,
    ) -> Result<(), DeliveryError>;

    /// Channel identifier for logs and health output
    fn channel_name(&self) -> &'static str;
}
