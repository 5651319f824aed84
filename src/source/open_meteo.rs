use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::fanout::Payload;
use crate::metrics::SourceMetrics;

use super::{PayloadSource, SourceError};

/// Current conditions pushed to every client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReading {
    /// Unix seconds when the reading was taken
    pub ts: i64,
    pub temp_c: Option<f64>,
    pub windspeed: Option<f64>,
    pub winddir: Option<f64>,
    pub weathercode: Option<i64>,
}

#[derive(Debug, Serialize)]
struct WeatherEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a WeatherReading,
}

#[derive(Debug, Default, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current_weather: CurrentWeather,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentWeather {
    temperature: Option<f64>,
    windspeed: Option<f64>,
    winddirection: Option<f64>,
    weathercode: Option<i64>,
}

impl WeatherReading {
    fn from_current(current: CurrentWeather, ts: i64) -> Self {
        Self {
            ts,
            temp_c: current.temperature,
            windspeed: current.windspeed,
            winddir: current.winddirection,
            weathercode: current.weathercode,
        }
    }

    /// `{"type":"weather","data":{...}}` as JSON bytes
    pub fn to_payload(&self) -> Result<Payload, SourceError> {
        Ok(Payload::json(&WeatherEnvelope {
            kind: "weather",
            data: self,
        })?)
    }
}

/// Open-Meteo forecast API (no key required)
pub struct OpenMeteoSource {
    client: reqwest::Client,
    url: String,
    latitude: f64,
    longitude: f64,
}

impl OpenMeteoSource {
    pub fn new(config: &WeatherConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
        })
    }

    pub async fn fetch(&self) -> Result<WeatherReading, SourceError> {
        debug!(lat = self.latitude, lon = self.longitude, "Fetching current weather");

        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Weather API error");
            return Err(SourceError::Status(status.as_u16()));
        }

        let body: ForecastResponse = resp.json().await?;
        Ok(WeatherReading::from_current(
            body.current_weather,
            chrono::Utc::now().timestamp(),
        ))
    }
}

#[async_trait]
impl PayloadSource for OpenMeteoSource {
    async fn next_payload(&self) -> Result<Payload, SourceError> {
        let started = Instant::now();
        let result = self.fetch().await;
        SourceMetrics::record_fetch(self.source_name(), result.is_ok(), started.elapsed());
        result?.to_payload()
    }

    fn source_name(&self) -> &'static str {
        "open-meteo"
    }
}
