//! Broker configuration.
//!
//! Supports configuration from:
//! - TOML file (default: `mqgate.toml`)
//! - Environment variables with `MQGATE__` prefix (double underscore for
//!   nesting)
//!
//! Environment variable examples:
//! - `MQGATE__SERVER__BIND=0.0.0.0:1883`
//! - `MQGATE__LIMITS__MAX_PACKET_SIZE=2097152`
//! - `MQGATE__LOG__LEVEL=debug`

mod limits;
mod log;
mod mqtt;
mod server;

use std::path::Path;

use config::{Environment, File, FileFormat};
use serde::Deserialize;

pub use limits::{LimitsConfig, DEFAULT_MAX_PACKET_SIZE};
pub use log::LogConfig;
pub use mqtt::MqttConfig;
pub use server::{ServerConfig, DEFAULT_BIND};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub log: LogConfig,
    /// Server configuration.
    pub server: ServerConfig,
    /// Limits configuration.
    pub limits: LimitsConfig,
    /// MQTT capability configuration, advertised in CONNACK.
    pub mqtt: MqttConfig,
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// Config parsing/loading error.
    Config(config::ConfigError),
    /// Invalid configuration value.
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable
    /// overrides. A missing file is not an error; defaults apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("server.bind", DEFAULT_BIND)?
            .set_default("limits.max_packet_size", DEFAULT_MAX_PACKET_SIZE as i64)?
            .set_default("mqtt.max_qos", 0)?
            .set_default("mqtt.retain_available", false)?
            .set_default("mqtt.wildcard_subscriptions", false)?
            .set_default("mqtt.subscription_identifiers", false)?
            .set_default("mqtt.shared_subscriptions", false)?;

        let path = path.as_ref();
        if path.exists() {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        // Override with environment variables (MQGATE__SERVER__BIND, etc.)
        let cfg = builder
            .add_source(
                Environment::with_prefix("MQGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate().map_err(ConfigError::Validation)?;
        self.mqtt.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind.port(), 8883);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.limits.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
        assert_eq!(config.mqtt.max_qos, 0);
        assert!(!config.mqtt.retain_available);
        assert!(!config.mqtt.wildcard_subscriptions);
        assert!(!config.mqtt.subscription_identifiers);
        assert!(!config.mqtt.shared_subscriptions);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("definitely-not-a-real-config.toml").unwrap();
        assert_eq!(config.server.bind.port(), 8883);
    }
}
