//! Configuration Loading
//!
//! memkv reads its settings once at startup from a TOML file, then lets
//! environment variables override individual fields.
//!
//! ## File Format
//!
//! ```toml
//! [network]
//! address = "localhost:8080"
//! max_connections = 100
//! max_message_size = 4096
//! idle_timeout = 300        # seconds, 0 disables
//!
//! [logger]
//! level = "info"
//! output_file_path = "memkv.log"
//! ```
//!
//! ## Precedence
//!
//! defaults < config file < environment:
//!
//! | Variable                        | Field                      |
//! |---------------------------------|----------------------------|
//! | `KVDB_ADDRESS`                  | `network.address`          |
//! | `KVDB_MAX_CONNECTIONS`          | `network.max_connections`  |
//! | `KVDB_NETWORK_MAX_MESSAGE_SIZE` | `network.max_message_size` |
//! | `KVDB_NETWORK_IDLE_TIMEOUT`     | `network.idle_timeout`     |
//! | `LOG_LEVEL`                     | `logger.level`             |
//! | `LOG_OUTPUT_FILE_PATH`          | `logger.output_file_path`  |
//!
//! The file is `$CONFIG_FILE` when set, otherwise `config.toml` in the
//! working directory. A missing default file is not an error.

use crate::client::ClientConfig;
use crate::server::ServerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Config file used when neither a path nor `$CONFIG_FILE` is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable naming the config file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Log levels accepted by `logger.level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub network: NetworkConfig,
    pub logger: LoggerConfig,
}

/// Network settings shared by the server and the CLI client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Address to listen on (server) or connect to (client).
    pub address: String,
    /// Ceiling on simultaneously live connections.
    pub max_connections: usize,
    /// Largest request or reply, in bytes. Also the read buffer size.
    pub max_message_size: usize,
    /// Idle timeout in seconds. 0 disables it.
    pub idle_timeout: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            max_connections: 100,
            max_message_size: 4096,
            idle_timeout: 300,
        }
    }
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    pub level: String,
    /// When set, log lines are also appended to this file.
    pub output_file_path: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output_file_path: None,
        }
    }
}

impl Config {
    /// Loads, merges and validates the configuration.
    ///
    /// `path` wins over `$CONFIG_FILE`, which wins over [`DEFAULT_CONFIG_FILE`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_toml_file(&path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_toml_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file, without env overrides.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides. `lookup` returns the raw value of a variable.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("KVDB_ADDRESS") {
            self.network.address = address;
        }
        override_parsed(&lookup, "KVDB_MAX_CONNECTIONS", &mut self.network.max_connections)?;
        override_parsed(
            &lookup,
            "KVDB_NETWORK_MAX_MESSAGE_SIZE",
            &mut self.network.max_message_size,
        )?;
        override_parsed(&lookup, "KVDB_NETWORK_IDLE_TIMEOUT", &mut self.network.idle_timeout)?;
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logger.level = level;
        }
        if let Some(path) = lookup("LOG_OUTPUT_FILE_PATH") {
            self.logger.output_file_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        Ok(())
    }

    /// Checks every field once, so constructors downstream can trust them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.address.trim().is_empty() {
            return Err(ConfigError::Invalid("network.address is empty".into()));
        }
        if self.network.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "network.max_connections must be at least 1".into(),
            ));
        }
        if self.network.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "network.max_message_size must be at least 1".into(),
            ));
        }
        let level = self.logger.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logger.level must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.logger.level
            )));
        }
        Ok(())
    }
}

impl NetworkConfig {
    /// Idle timeout as a duration; `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            address: self.address.clone(),
            max_connections: self.max_connections,
            idle_timeout: self.idle_timeout(),
            buffer_size: self.max_message_size,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            idle_timeout: self.idle_timeout(),
            buffer_size: self.max_message_size,
        }
    }
}

fn override_parsed<T, F>(lookup: &F, key: &'static str, field: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *field = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw })?;
    }
    Ok(())
}
