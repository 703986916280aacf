//! Operator configuration.
//!
//! Settings are TOML, loaded once at process start (see `src/bin/consumer.rs`). Every field has a
//! sensible default except the two addresses the operator must supply (`kafka.brokers`,
//! `redis.url`), matching the load/parse error split already used for this service's config file.
//!
//! Environment variables prefixed `VOTING_` override the parsed file, letting a container
//! override individual settings without mounting a different file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_votes_topic")]
    pub votes_topic: String,
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Worker pool sizing for the Vote Processor. `None` defers to
/// `std::thread::available_parallelism` at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub worker_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_votes_topic() -> String {
    "votes".to_string()
}

fn default_dead_letter_topic() -> String {
    "votes-dead-letter".to_string()
}

fn default_consumer_group() -> String {
    "vote-processor-group".to_string()
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8081".parse().unwrap()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for environment override {key}: {message}")]
    EnvOverride { key: String, message: String },
}

impl Config {
    /// Load configuration from a TOML file on disk, then apply any `VOTING_*` overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&contents, path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overrides individual fields from `VOTING_*`-prefixed environment variables, for
    /// containerized deployments that shouldn't need to mount a different config file per
    /// environment.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("VOTING_KAFKA_BROKERS") {
            self.kafka.brokers = value.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(value) = std::env::var("VOTING_KAFKA_VOTES_TOPIC") {
            self.kafka.votes_topic = value;
        }
        if let Ok(value) = std::env::var("VOTING_KAFKA_DEAD_LETTER_TOPIC") {
            self.kafka.dead_letter_topic = value;
        }
        if let Ok(value) = std::env::var("VOTING_KAFKA_CONSUMER_GROUP") {
            self.kafka.consumer_group = value;
        }
        if let Ok(value) = std::env::var("VOTING_REDIS_URL") {
            self.redis.url = value;
        }
        if let Ok(value) = std::env::var("VOTING_HUB_BIND_ADDR") {
            self.hub.bind_addr = value.parse().map_err(|e| ConfigError::EnvOverride {
                key: "VOTING_HUB_BIND_ADDR".to_string(),
                message: format!("{e}"),
            })?;
        }
        if let Ok(value) = std::env::var("VOTING_PROCESSING_WORKER_COUNT") {
            let count = value.parse::<usize>().map_err(|e| ConfigError::EnvOverride {
                key: "VOTING_PROCESSING_WORKER_COUNT".to_string(),
                message: format!("{e}"),
            })?;
            self.processing.worker_count = Some(count);
        }
        if let Ok(value) = std::env::var("VOTING_LOGGING_LEVEL") {
            self.logging.level = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let file = write_toml(
            r#"
            [kafka]
            brokers = ["localhost:9092"]

            [redis]
            url = "redis://localhost:6379"
            "#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.kafka.votes_topic, "votes");
        assert_eq!(config.kafka.dead_letter_topic, "votes-dead-letter");
        assert_eq!(config.processing.worker_count, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = Config::load(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let file = write_toml("not = [valid");
        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn voting_prefixed_env_var_overrides_the_parsed_file() {
        let file = write_toml(
            r#"
            [kafka]
            brokers = ["localhost:9092"]

            [redis]
            url = "redis://localhost:6379"
            "#,
        );
        std::env::set_var("VOTING_REDIS_URL", "redis://override:6379");
        let config = Config::load(file.path());
        std::env::remove_var("VOTING_REDIS_URL");

        assert_eq!(config.unwrap().redis.url, "redis://override:6379");
    }

    #[test]
    fn invalid_env_override_is_rejected() {
        let file = write_toml(
            r#"
            [kafka]
            brokers = ["localhost:9092"]

            [redis]
            url = "redis://localhost:6379"
            "#,
        );
        std::env::set_var("VOTING_HUB_BIND_ADDR", "not-an-address");
        let result = Config::load(file.path());
        std::env::remove_var("VOTING_HUB_BIND_ADDR");

        assert!(matches!(result, Err(ConfigError::EnvOverride { .. })));
    }
}
