//! Producers of the payload a broadcast pass fans out.

mod open_meteo;

use async_trait::async_trait;
use thiserror::Error;

use crate::fanout::{Payload, PayloadError};

pub use open_meteo::{OpenMeteoSource, WeatherReading};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Payload encoding failed: {0}")]
    Payload(#[from] PayloadError),
}

/// Something that can produce the next broadcast payload
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn next_payload(&self) -> Result<Payload, SourceError>;

    fn source_name(&self) -> &'static str;
}
