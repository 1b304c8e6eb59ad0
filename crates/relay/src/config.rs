//! Configuration management for the presence relay.
//!
//! This module handles loading, validation, and conversion of relay
//! configuration from TOML files. Missing keys fall back to their defaults,
//! so a file only needs the settings it changes.

use relay_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Network and connection settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Liveness and introduction settings
    #[serde(default)]
    pub presence: PresenceSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the relay to (e.g., "127.0.0.1:8835")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Largest accepted text frame, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Seconds to wait for connections to close on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Presence tracking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSettings {
    /// Seconds of silence after which a participant is evicted
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
    /// Seconds between liveness sweeps
    #[serde(default = "default_liveness_sweep_interval_secs")]
    pub liveness_sweep_interval_secs: u64,
    /// Minimum milliseconds between roster introductions per connection
    #[serde(default = "default_introduce_throttle_ms")]
    pub introduce_throttle_ms: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_bind_address() -> String {
    "127.0.0.1:8835".to_string()
}
fn default_max_connections() -> usize { 1000 }
fn default_max_message_size() -> usize { 16 * 1024 }
fn default_shutdown_grace_secs() -> u64 { 5 }
fn default_liveness_timeout_secs() -> u64 { 30 }
fn default_liveness_sweep_interval_secs() -> u64 { 5 }
fn default_introduce_throttle_ms() -> u64 { 1000 }
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            liveness_timeout_secs: default_liveness_timeout_secs(),
            liveness_sweep_interval_secs: default_liveness_sweep_interval_secs(),
            introduce_throttle_ms: default_introduce_throttle_ms(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to the
    /// specified path and returns it.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration into the relay server's
    /// configuration.
    ///
    /// # Returns
    ///
    /// A `ServerConfig`, or an error if the bind address does not parse.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            max_message_size: self.server.max_message_size,
            liveness_timeout_secs: self.presence.liveness_timeout_secs,
            liveness_sweep_interval_secs: self.presence.liveness_sweep_interval_secs,
            introduce_throttle_ms: self.presence.introduce_throttle_ms,
            shutdown_grace_secs: self.server.shutdown_grace_secs,
        })
    }

    /// Validates the configuration settings.
    ///
    /// # Returns
    ///
    /// `Ok(())` if every setting is usable, or a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.server.max_message_size == 0 {
            return Err("server.max_message_size must be greater than 0".to_string());
        }

        if self.presence.liveness_timeout_secs == 0 {
            return Err("presence.liveness_timeout_secs must be greater than 0".to_string());
        }

        if self.presence.liveness_sweep_interval_secs == 0 {
            return Err("presence.liveness_sweep_interval_secs must be greater than 0".to_string());
        }

        if self.presence.liveness_timeout_secs < self.presence.liveness_sweep_interval_secs {
            return Err(format!(
                "presence.liveness_timeout_secs ({}) must not be shorter than the sweep interval ({})",
                self.presence.liveness_timeout_secs, self.presence.liveness_sweep_interval_secs
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
