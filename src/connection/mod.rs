//! Connection identity and local socket tracking
//!
//! - `ConnectionId`: the opaque id every other component keys on
//! - `ConnectionEnvelope`: validation of untyped lifecycle input
//! - `ConnectionHub`: sockets owned by the embedded WebSocket transport

mod envelope;
mod hub;
mod id;

pub use envelope::ConnectionEnvelope;
pub use hub::{ConnectionHub, HubStats, LocalConnection};
pub use id::ConnectionId;
