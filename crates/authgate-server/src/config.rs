use std::time::Duration;

use authgate_domain::MessageServiceConfig;
use authgate_mqtt::{IngressTopics, MqttSettings};
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Telemetry
    #[serde(default)]
    pub otel_enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // Processing
    /// Number of measurement handler slots
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Polling interval between processing cycles in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum messages drained per cycle; also the ingress buffer capacity
    #[serde(default = "default_internal_batch_size")]
    pub internal_batch_size: usize,

    /// Maximum accepted measurements per outgoing publication
    #[serde(default = "default_publish_chunk_size")]
    pub publish_chunk_size: usize,

    /// Entity cache staleness threshold in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Repository fallback lookup timeout in milliseconds
    #[serde(default = "default_repository_timeout_ms")]
    pub repository_timeout_ms: u64,

    /// Bulk-load all credential families into the cache at startup
    #[serde(default = "default_preload_cache")]
    pub preload_cache: bool,

    // MQTT configuration
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,
    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,
    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,
    #[serde(default = "default_mqtt_channel_capacity")]
    pub mqtt_channel_capacity: usize,

    /// Inbound raw measurement topic
    #[serde(default = "default_measurement_topic")]
    pub measurement_topic: String,

    /// Outbound topic for authorized measurement batches
    #[serde(default = "default_bulk_measurement_topic")]
    pub bulk_measurement_topic: String,

    /// Inbound control-plane command topic
    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,
    #[serde(default = "default_postgres_pool_size")]
    pub postgres_pool_size: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "authgate".to_string()
}

fn default_workers() -> usize {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_internal_batch_size() -> usize {
    10_000
}

fn default_publish_chunk_size() -> usize {
    1_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_repository_timeout_ms() -> u64 {
    2000
}

fn default_preload_cache() -> bool {
    true
}

fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "authgate".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_channel_capacity() -> usize {
    100
}

fn default_measurement_topic() -> String {
    "sensors/measurements".to_string()
}

fn default_bulk_measurement_topic() -> String {
    "internal/measurements/bulk".to_string()
}

fn default_command_topic() -> String {
    "internal/commands".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "authgate".to_string()
}

fn default_postgres_username() -> String {
    "postgres".to_string()
}

fn default_postgres_password() -> String {
    "postgres".to_string()
}

fn default_postgres_pool_size() -> usize {
    5
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("AUTHGATE"))
            .build()?
            .try_deserialize()
    }

    pub fn message_service_config(&self) -> MessageServiceConfig {
        MessageServiceConfig {
            workers: self.workers,
            internal_batch_size: self.internal_batch_size,
            publish_chunk_size: self.publish_chunk_size,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            repository_timeout: Duration::from_millis(self.repository_timeout_ms),
        }
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            broker_url: self.mqtt_broker_url.clone(),
            client_id: self.mqtt_client_id.clone(),
            keep_alive_secs: self.mqtt_keep_alive_secs,
            channel_capacity: self.mqtt_channel_capacity,
        }
    }

    pub fn ingress_topics(&self) -> IngressTopics {
        IngressTopics {
            measurement_topic: self.measurement_topic.clone(),
            command_topic: self.command_topic.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; run these serially.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::remove_var("AUTHGATE_WORKERS");
        std::env::remove_var("AUTHGATE_POLL_INTERVAL_MS");
        std::env::remove_var("AUTHGATE_MQTT_BROKER_URL");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.internal_batch_size, 10_000);
        assert_eq!(config.mqtt_broker_url, "mqtt://localhost:1883");
        assert!(config.preload_cache);
        assert!(!config.otel_enabled);
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::set_var("AUTHGATE_WORKERS", "8");
        std::env::set_var("AUTHGATE_POLL_INTERVAL_MS", "250");
        std::env::set_var("AUTHGATE_MQTT_BROKER_URL", "mqtt://broker:8883");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.mqtt_broker_url, "mqtt://broker:8883");

        std::env::remove_var("AUTHGATE_WORKERS");
        std::env::remove_var("AUTHGATE_POLL_INTERVAL_MS");
        std::env::remove_var("AUTHGATE_MQTT_BROKER_URL");
    }

    #[test]
    fn test_conversion_helpers() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::remove_var("AUTHGATE_WORKERS");
        let config = ServiceConfig::from_env().unwrap();

        let service = config.message_service_config();
        assert_eq!(service.workers, 3);
        assert_eq!(service.cache_ttl, Duration::from_secs(300));

        let topics = config.ingress_topics();
        assert_eq!(topics.measurement_topic, "sensors/measurements");
    }
}
