//! Delivery over sockets held by the embedded WebSocket transport.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};

use crate::connection::{ConnectionHub, ConnectionId};
use crate::fanout::Payload;
use crate::websocket::OutboundMessage;

use super::channel::{DeliveryChannel, DeliveryError};

/// Pushes payloads into the outbound queue of a local socket.
///
/// - id not in the hub, or its socket task has ended: `Gone`
/// - outbound queue still full at the deadline: `Timeout`
pub struct LocalDeliveryChannel {
    hub: Arc<ConnectionHub>,
}

impl LocalDeliveryChannel {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl DeliveryChannel for LocalDeliveryChannel {
    async fn send(
        &self,
        id: &ConnectionId,
        payload: &Payload,
        deadline: Instant,
    ) -> Result<(), DeliveryError> {
        let sender = self.hub.sender(id).ok_or(DeliveryError::Gone)?;

        match timeout_at(deadline, sender.send(OutboundMessage::payload(payload))).await {
            Ok(Ok(())) => Ok(()),
            // Receiver dropped: the socket closed before the hub entry went away
            Ok(Err(_)) => Err(DeliveryError::Gone),
            Err(_) => Err(DeliveryError::Timeout),
        }
    }

    fn channel_name(&self) -> &'static str {
        "websocket"
    }
}
