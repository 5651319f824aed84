mod settings;

pub use settings::{
    DeliveryConfig, FanoutConfig, LoggingConfig, OtelConfig, RedisConfig, RegistryConfig,
    ServerConfig, Settings, WeatherConfig,
};
