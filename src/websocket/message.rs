use axum::extract::ws::Message;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;
use crate::fanout::Payload;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

/// Control messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome { connection_id: ConnectionId },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "shutdown")]
    Shutdown {
        reason: String,
        reconnect_after_seconds: u64,
    },
}

/// Anything queued for a local socket's writer task
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Broadcast payload, written as-is
    Payload(Bytes),
    Welcome { connection_id: ConnectionId },
    Pong,
    Error { code: String, message: String },
    Shutdown {
        reason: String,
        reconnect_after_seconds: u64,
    },
}

impl OutboundMessage {
    pub fn payload(payload: &Payload) -> Self {
        Self::Payload(payload.bytes())
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Frame for the wire. Payloads that are valid UTF-8 go out as text.
    pub fn to_ws_message(&self) -> Result<Message, serde_json::Error> {
        let control = match self {
            OutboundMessage::Payload(bytes) => {
                return Ok(match std::str::from_utf8(bytes) {
                    Ok(text) => Message::Text(text.into()),
                    Err(_) => Message::Binary(bytes.clone()),
                });
            }
            OutboundMessage::Welcome { connection_id } => ServerMessage::Welcome {
                connection_id: connection_id.clone(),
            },
            OutboundMessage::Pong => ServerMessage::Pong,
            OutboundMessage::Error { code, message } => ServerMessage::Error {
                code: code.clone(),
                message: message.clone(),
            },
            OutboundMessage::Shutdown {
                reason,
                reconnect_after_seconds,
            } => ServerMessage::Shutdown {
                reason: reason.clone(),
                reconnect_after_seconds: *reconnect_after_seconds,
            },
        };
        Ok(Message::Text(serde_json::to_string(&control)?.into()))
    }
}
