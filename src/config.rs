//! Service configuration for realtime-strategies

use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bus: BusConfig,
    pub store: StoreConfig,
    pub strategies: StrategiesConfig,
    pub publisher: PublisherConfig,
    pub breaker: BreakerConfig,
    pub api: ApiConfig,
    pub telemetry: TelemetryConfig,
}

/// Message bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub url: String,
    pub consumer_topic: String,
    pub publisher_topic: String,
    pub consumer_name: String,
    /// Queue group for load-balanced delivery across replicas.
    /// Losing this causes duplicate processing.
    pub queue_group: String,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub mongodb_uri: String,
    pub database: String,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
}

/// Strategy enablement flags
#[derive(Debug, Clone, Deserialize)]
pub struct StrategiesConfig {
    pub orderbook_skew: bool,
    pub trade_momentum: bool,
    pub ticker_velocity: bool,
    pub spread_liquidity: bool,
    pub iceberg_detector: bool,
}

/// Outbound publishing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub queue_capacity: usize,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

/// REST API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub metrics_port: u16,
    pub log_level: String,
    pub heartbeat_interval_secs: u64,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Built-in defaults, used when no config file is present
    pub fn default_config() -> Self {
        let mut config: Config =
            toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid");
        config.apply_env_overrides();
        config
    }

    /// Environment variables take precedence over the file for deployment
    /// settings (bus endpoints, store URI, queue group).
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("NATS_URL") {
            self.bus.url = url;
        }
        if let Ok(topic) = std::env::var("NATS_CONSUMER_TOPIC") {
            self.bus.consumer_topic = topic;
        }
        if let Ok(topic) = std::env::var("NATS_PUBLISHER_TOPIC") {
            self.bus.publisher_topic = topic;
        }
        if let Ok(group) = std::env::var("NATS_QUEUE_GROUP") {
            self.bus.queue_group = group;
        }
        if let Ok(uri) = std::env::var("MONGODB_URI") {
            self.store.mongodb_uri = uri;
        }
        if let Ok(db) = std::env::var("MONGODB_DATABASE") {
            self.store.database = db;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.store.cache_ttl_secs)
    }

    /// Names of the enabled strategies, in dispatch order
    pub fn enabled_strategies(&self) -> Vec<&'static str> {
        let mut enabled = Vec::new();
        if self.strategies.orderbook_skew {
            enabled.push("orderbook_skew");
        }
        if self.strategies.spread_liquidity {
            enabled.push("spread_liquidity");
        }
        if self.strategies.iceberg_detector {
            enabled.push("iceberg_detector");
        }
        if self.strategies.trade_momentum {
            enabled.push("trade_momentum");
        }
        if self.strategies.ticker_velocity {
            enabled.push("ticker_velocity");
        }
        enabled
    }
}

/// Default configuration, compiled in
pub const DEFAULT_CONFIG: &str = r#"
[bus]
url = "nats://localhost:4222"
consumer_topic = "binance.websocket.data"
publisher_topic = "signals.trading"
consumer_name = "realtime-strategies-consumer"
queue_group = "realtime-strategies-group"

[store]
mongodb_uri = "mongodb://localhost:27017"
database = "strategies"
timeout_ms = 5000
cache_ttl_secs = 60

[strategies]
orderbook_skew = true
trade_momentum = true
ticker_velocity = true
spread_liquidity = true
iceberg_detector = true

[publisher]
max_retries = 3
retry_delay_ms = 1000
queue_capacity = 1000

[breaker]
failure_threshold = 5
recovery_timeout_secs = 60

[api]
port = 8000

[telemetry]
metrics_port = 9090
log_level = "info"
heartbeat_interval_secs = 60
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.bus.queue_group, "realtime-strategies-group");
        assert_eq!(config.bus.publisher_topic, "signals.trading");
        assert_eq!(config.store.cache_ttl_secs, 60);
        assert_eq!(config.publisher.max_retries, 3);
    }

    #[test]
    fn test_enabled_strategies_order() {
        let mut config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(
            config.enabled_strategies(),
            vec![
                "orderbook_skew",
                "spread_liquidity",
                "iceberg_detector",
                "trade_momentum",
                "ticker_velocity",
            ]
        );

        config.strategies.iceberg_detector = false;
        assert!(!config.enabled_strategies().contains(&"iceberg_detector"));
    }

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [bus]
            url = "nats://bus:4222"
            consumer_topic = "market.events"
            publisher_topic = "signals.out"
            consumer_name = "test-consumer"
            queue_group = "test-group"

            [store]
            mongodb_uri = "mongodb://db:27017"
            database = "test"
            timeout_ms = 2500
            cache_ttl_secs = 30

            [strategies]
            orderbook_skew = true
            trade_momentum = false
            ticker_velocity = true
            spread_liquidity = false
            iceberg_detector = false

            [publisher]
            max_retries = 5
            retry_delay_ms = 500
            queue_capacity = 100

            [breaker]
            failure_threshold = 3
            recovery_timeout_secs = 30

            [api]
            port = 8080

            [telemetry]
            metrics_port = 9100
            log_level = "debug"
            heartbeat_interval_secs = 15
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bus.queue_group, "test-group");
        assert_eq!(config.store.timeout_ms, 2500);
        assert!(!config.strategies.trade_momentum);
        assert_eq!(config.breaker.failure_threshold, 3);
    }
}
