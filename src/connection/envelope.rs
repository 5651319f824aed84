//! Typed envelope for lifecycle events arriving from an external transport.
//!
//! Transports post loosely-shaped JSON. The accepted shapes are
//! `{"id": ...}`, `{"connectionId": ...}` and the gateway style
//! `{"requestContext": {"connectionId": ...}}`. Anything else yields `None`
//! and the caller treats the event as a no-op.

use serde::Deserialize;
use serde_json::Value;

use super::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEnvelope {
    pub id: ConnectionId,
}

#[derive(Deserialize)]
struct FlatEnvelope {
    #[serde(alias = "connectionId", alias = "connection_id")]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayEnvelope {
    request_context: GatewayRequestContext,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayRequestContext {
    connection_id: String,
}

impl ConnectionEnvelope {
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw = FlatEnvelope::deserialize(value)
            .map(|e| e.id)
            .or_else(|_| GatewayEnvelope::deserialize(value).map(|e| e.request_context.connection_id))
            .ok()?;

        ConnectionId::parse(raw).map(|id| Self { id })
    }
}
