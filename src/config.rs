//! # Configuration Management
//!
//! Centralized configuration for the realtime engine.
//!
//! This module provides structured configuration for the engine: heartbeat
//! timings, payload limits, enabled transports, configured namespaces, and
//! logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Liveness Considerations
//! - A silent client is detected no later than `ping_interval + ping_timeout`
//! - `max_payload` bounds both polling bodies and socket frames

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Transport-layer protocol revision accepted in the `EIO` query parameter
pub const PROTOCOL_VERSION: u8 = 4;

/// Default max payload advertised in the open packet (bytes)
pub const MAX_PAYLOAD_SIZE: usize = 1_000_000;

/// Default cap on the attachments one binary packet may declare
pub const MAX_ATTACHMENTS: usize = 10;

/// Path of the main namespace, always connectable
pub const MAIN_NAMESPACE: &str = "/";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    /// Session / heartbeat configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REALTIME_PROTOCOL_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(interval) = std::env::var("REALTIME_PROTOCOL_PING_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.server.ping_interval = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("REALTIME_PROTOCOL_PING_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.ping_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("REALTIME_PROTOCOL_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(max) = std::env::var("REALTIME_PROTOCOL_MAX_PAYLOAD") {
            if let Ok(val) = max.parse::<usize>() {
                config.transport.max_payload = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Session and namespace configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address used by the bundled demo server (e.g., "127.0.0.1:3000")
    pub address: String,

    /// Mount path of the engine endpoints
    pub path: String,

    /// Interval between server pings
    #[serde(with = "duration_serde")]
    pub ping_interval: Duration,

    /// How long to wait for a pong after each ping; also bounds an upgrade probe
    #[serde(with = "duration_serde")]
    pub ping_timeout: Duration,

    /// How long a session may stay without any namespace connection
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Age after which pending outgoing acks are dropped
    #[serde(with = "duration_serde")]
    pub ack_timeout: Duration,

    /// Maximum number of concurrent sessions
    pub max_sessions: usize,

    /// Extra namespaces accepted besides the main one
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:3000"),
            path: String::from("/socket.io/"),
            ping_interval: timeout::PING_INTERVAL,
            ping_timeout: timeout::PING_TIMEOUT,
            connect_timeout: timeout::CONNECT_TIMEOUT,
            ack_timeout: timeout::ACK_TIMEOUT,
            max_sessions: 10_000,
            namespaces: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:3000')",
                self.address
            ));
        }

        if !self.path.starts_with('/') {
            errors.push(format!("Endpoint path must start with '/': '{}'", self.path));
        }

        if self.ping_interval.as_millis() < 10 {
            errors.push("Ping interval too short (minimum: 10ms)".to_string());
        } else if self.ping_interval.as_secs() > 3600 {
            errors.push("Ping interval too long (maximum: 1 hour)".to_string());
        }

        if self.ping_timeout.as_millis() < 10 {
            errors.push("Ping timeout too short (minimum: 10ms)".to_string());
        } else if self.ping_timeout.as_secs() > 3600 {
            errors.push("Ping timeout too long (maximum: 1 hour)".to_string());
        }

        if self.connect_timeout.as_millis() < 10 {
            errors.push("Connect timeout too short (minimum: 10ms)".to_string());
        }

        if self.max_sessions == 0 {
            errors.push("Max sessions must be greater than 0".to_string());
        }

        for nsp in &self.namespaces {
            if !nsp.starts_with('/') {
                errors.push(format!("Namespace must start with '/': '{nsp}'"));
            } else if nsp.contains(',') {
                errors.push(format!("Namespace cannot contain ',': '{nsp}'"));
            }
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum accepted payload (polling body or socket frame) in bytes
    pub max_payload: usize,

    /// Whether new sessions may open over HTTP long-polling
    pub allow_polling: bool,

    /// Whether new sessions may open over the socket transport
    pub allow_websocket: bool,

    /// Whether polling sessions are offered an upgrade to the socket transport
    pub allow_upgrades: bool,

    /// Most binary attachments a single application packet may declare
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
}

fn default_max_attachments() -> usize {
    MAX_ATTACHMENTS
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_SIZE,
            allow_polling: true,
            allow_websocket: true,
            allow_upgrades: true,
            max_attachments: MAX_ATTACHMENTS,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_payload
            ));
        }

        if self.max_attachments == 0 {
            errors.push("Max attachments must be greater than 0".to_string());
        }

        if !self.allow_polling && !self.allow_websocket {
            errors.push("At least one transport must be enabled".to_string());
        }

        if self.allow_upgrades && !self.allow_websocket {
            errors.push("Upgrades require the websocket transport".to_string());
        }

        errors
    }

    /// Upgrade targets advertised to a session opened over `kind`
    pub fn upgrades_for(&self, kind: crate::transport::TransportKind) -> Vec<String> {
        match kind {
            crate::transport::TransportKind::Polling
                if self.allow_upgrades && self.allow_websocket =>
            {
                vec![crate::transport::TransportKind::Websocket.name().to_string()]
            }
            _ => Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("realtime-protocol"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
