// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
pub mod telemetry;

// Core: registry, delivery and fan-out
pub mod connection;
pub mod delivery;
pub mod fanout;
pub mod registry;
pub mod source;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
