//! Configuration for the web analyzer service, loaded from environment
//! variables. No file-based config layer — matches the recognised options
//! in the external interfaces (`outbox.*`, `backoff.*`, `queue.*`, `sse.*`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub kafka: KafkaConfig,
    pub outbox: OutboxConfig,
    pub backoff: BackoffConfig,
    pub sse: SseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    pub processor_interval_ms: u64,
    pub batch_size: i64,
    pub max_retries_by_priority: HashMap<String, i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    pub heartbeat_interval_ms: u64,
    pub events_interval_ms: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let mut max_retries_by_priority = HashMap::new();
        max_retries_by_priority.insert("low".to_string(), env_parsed("OUTBOX_MAX_RETRIES_LOW", 2));
        max_retries_by_priority.insert(
            "normal".to_string(),
            env_parsed("OUTBOX_MAX_RETRIES_NORMAL", 3),
        );
        max_retries_by_priority.insert(
            "high".to_string(),
            env_parsed("OUTBOX_MAX_RETRIES_HIGH", 5),
        );
        max_retries_by_priority.insert(
            "urgent".to_string(),
            env_parsed("OUTBOX_MAX_RETRIES_URGENT", 8),
        );

        Ok(Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                host: env_or("SERVICE_HOST", "0.0.0.0"),
                port: env_parsed("SERVICE_PORT", 8080),
            },
            cors: CorsConfig {
                allowed_origins: env_or("CORS_ALLOWED_ORIGINS", "*"),
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "postgresql://localhost/web_analyzer"),
                max_connections: env_parsed("DATABASE_MAX_CONNECTIONS", 20),
            },
            cache: CacheConfig {
                url: env_or("REDIS_URL", "redis://localhost:6379"),
            },
            kafka: KafkaConfig {
                brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
                topic_prefix: env_or("KAFKA_TOPIC_PREFIX", "web-analyzer"),
            },
            outbox: OutboxConfig {
                processor_interval_ms: env_parsed("OUTBOX_PROCESSOR_INTERVAL_MS", 5000),
                batch_size: env_parsed("OUTBOX_BATCH_SIZE", 10),
                max_retries_by_priority,
            },
            backoff: BackoffConfig {
                base_delay_ms: env_parsed("BACKOFF_BASE_DELAY_MS", 1000),
                max_delay_ms: env_parsed("BACKOFF_MAX_DELAY_MS", 300_000),
                multiplier: env_parsed("BACKOFF_MULTIPLIER", 2.0),
                jitter: env_parsed("BACKOFF_JITTER", 0.2),
            },
            sse: SseConfig {
                heartbeat_interval_ms: env_parsed("SSE_HEARTBEAT_INTERVAL_MS", 15_000),
                events_interval_ms: env_parsed("SSE_EVENTS_INTERVAL_MS", 1000),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn default_config_has_expected_ports() {
        std::env::remove_var("SERVICE_PORT");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.app.port, 8080);
        assert_eq!(cfg.outbox.batch_size, 10);
        assert_eq!(cfg.backoff.jitter, 0.2);
    }

    #[test]
    #[serial]
    fn max_retries_by_priority_has_all_four_tiers() {
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.outbox.max_retries_by_priority.len(), 4);
        assert_eq!(cfg.outbox.max_retries_by_priority["urgent"], 8);
    }
}
