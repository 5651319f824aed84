use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_cb_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    /// Successes in half-open state before the circuit closes
    #[serde(default = "default_cb_success_threshold")]
    pub circuit_breaker_success_threshold: u32,
    /// Seconds to wait before probing an open circuit
    #[serde(default = "default_cb_reset_timeout")]
    pub circuit_breaker_reset_timeout_seconds: u64,
    /// Bound on establishing the connection
    #[serde(default = "default_redis_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Bound on each command round trip
    #[serde(default = "default_redis_response_timeout")]
    pub response_timeout_ms: u64,
}

/// Backing store for the connection registry
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// "memory" or "redis"
    #[serde(default = "default_registry_backend")]
    pub backend: String,
    #[serde(default = "default_registry_prefix")]
    pub redis_prefix: String,
    /// Separates registries of independent deployments sharing one Redis
    #[serde(default = "default_registry_namespace")]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// "websocket" (embedded transport) or "http" (external management API)
    #[serde(default = "default_delivery_mode")]
    pub mode: String,
    /// Base URL of the management API, required in "http" mode
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Outbound buffer per WebSocket connection
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Upper bound on in-flight sends during one pass
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// Deadline for a single send in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Attempts for a failed connect/disconnect write, 0 disables retries
    #[serde(default = "default_lifecycle_retry_attempts")]
    pub lifecycle_retry_attempts: u32,
    #[serde(default = "default_lifecycle_retry_queue_size")]
    pub lifecycle_retry_queue_size: usize,
    #[serde(default = "default_backoff_initial_delay_ms")]
    pub backoff_initial_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay_ms")]
    pub backoff_max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_enabled")]
    pub enabled: bool,
    #[serde(default = "default_weather_url")]
    pub url: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    /// Seconds between broadcast passes
    #[serde(default = "default_weather_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_weather_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    2
}

fn default_cb_reset_timeout() -> u64 {
    30
}

fn default_redis_connect_timeout() -> u64 {
    2000
}

fn default_redis_response_timeout() -> u64 {
    2000
}

fn default_registry_backend() -> String {
    "memory".to_string()
}

fn default_registry_prefix() -> String {
    "fanout:connections".to_string()
}

fn default_registry_namespace() -> String {
    "default".to_string()
}

fn default_delivery_mode() -> String {
    "websocket".to_string()
}

fn default_channel_buffer() -> usize {
    32
}

fn default_max_concurrent_sends() -> usize {
    100
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_lifecycle_retry_attempts() -> u32 {
    5
}

fn default_lifecycle_retry_queue_size() -> usize {
    1024
}

fn default_backoff_initial_delay_ms() -> u64 {
    100
}

fn default_backoff_max_delay_ms() -> u64 {
    30_000
}

fn default_weather_enabled() -> bool {
    true
}

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

// Bratislava
fn default_latitude() -> f64 {
    48.1486
}

fn default_longitude() -> f64 {
    17.1077
}

fn default_weather_interval() -> u64 {
    60
}

fn default_weather_request_timeout() -> u64 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "weather-fanout-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("registry.backend", default_registry_backend())?
            .set_default("delivery.mode", default_delivery_mode())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // FANOUT__SERVER__PORT, FANOUT__REGISTRY__BACKEND, FANOUT__WEATHER__INTERVAL_SECONDS, ...
            .add_source(
                Environment::with_prefix("FANOUT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: RedisConfig::default(),
            registry: RegistryConfig::default(),
            delivery: DeliveryConfig::default(),
            fanout: FanoutConfig::default(),
            weather: WeatherConfig::default(),
            logging: LoggingConfig::default(),
            otel: OtelConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            circuit_breaker_failure_threshold: default_cb_failure_threshold(),
            circuit_breaker_success_threshold: default_cb_success_threshold(),
            circuit_breaker_reset_timeout_seconds: default_cb_reset_timeout(),
            connect_timeout_ms: default_redis_connect_timeout(),
            response_timeout_ms: default_redis_response_timeout(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: default_registry_backend(),
            redis_prefix: default_registry_prefix(),
            namespace: default_registry_namespace(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: default_delivery_mode(),
            endpoint: None,
            channel_buffer_size: default_channel_buffer(),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sends: default_max_concurrent_sends(),
            send_timeout_ms: default_send_timeout_ms(),
            lifecycle_retry_attempts: default_lifecycle_retry_attempts(),
            lifecycle_retry_queue_size: default_lifecycle_retry_queue_size(),
            backoff_initial_delay_ms: default_backoff_initial_delay_ms(),
            backoff_max_delay_ms: default_backoff_max_delay_ms(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: default_weather_enabled(),
            url: default_weather_url(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            interval_seconds: default_weather_interval(),
            request_timeout_seconds: default_weather_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
