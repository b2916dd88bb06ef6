//! # Configuration Management
//!
//! Centralized configuration for a game node.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`TTT_P2P_*` variables)
//!
//! Durations are written as integer milliseconds.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Current wire version carried in every frame header
pub const PROTOCOL_VERSION: u8 = 1;

/// Magic bytes that open every frame (0xFF followed by "TTT")
pub const MAGIC_BYTES: [u8; 4] = [0xFF, 0x54, 0x54, 0x54];

/// Default maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Default listening port
pub const DEFAULT_PORT: u16 = 2222;

/// Main configuration structure for a node
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NodeConfig {
    /// Listening socket and identity
    #[serde(default)]
    pub node: NodeSettings,

    /// Timeouts and frame limits
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
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

    /// Start from defaults and apply `TTT_P2P_*` environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Apply `TTT_P2P_*` environment overrides on top of this configuration.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("TTT_P2P_BIND_ADDRESS") {
            self.node.bind_address = addr;
        }

        if let Ok(port) = std::env::var("TTT_P2P_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                self.node.port = val;
            }
        }

        if let Ok(identity) = std::env::var("TTT_P2P_IDENTITY") {
            self.node.identity = Some(identity);
        }

        if let Ok(timeout) = std::env::var("TTT_P2P_HANDSHAKE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.transport.handshake_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("TTT_P2P_WRITE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.transport.write_timeout = Duration::from_millis(val);
            }
        }
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
        errors.extend(self.node.validate());
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

/// Listening socket and identity of the local node
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSettings {
    /// Interface to listen on (e.g., "0.0.0.0")
    pub bind_address: String,

    /// Port to listen on; 0 picks an ephemeral port
    pub port: u16,

    /// Identity announced to peers; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            identity: None,
        }
    }
}

impl NodeSettings {
    /// Validate node settings
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address: '{}' (expected an IP such as '0.0.0.0')",
                self.bind_address
            ));
        }

        if let Some(identity) = &self.identity {
            if let Err(e) = crate::protocol::identity::NodeId::new(identity.as_str()) {
                errors.push(e.to_string());
            }
        }

        errors
    }
}

/// Timeouts and frame limits for peer connections
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Timeout for the outbound TCP connect
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Time allowed for the remote side to send its identity
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Upper bound on a single frame write to one peer
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,

    /// Maximum allowed payload size in bytes
    pub max_payload_size: usize,

    /// Capacity of the node event channel before slow subscribers lag
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: timeout::CONNECT_TIMEOUT,
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            write_timeout: timeout::WRITE_TIMEOUT,
            max_payload_size: MAX_PAYLOAD_SIZE,
            event_capacity: 128,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.connect_timeout.as_millis() < 10 {
            errors.push("Connect timeout too short (minimum: 10ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.handshake_timeout.as_millis() < 10 {
            errors.push("Handshake timeout too short (minimum: 10ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 60 {
            errors.push("Handshake timeout too long (maximum: 60s)".to_string());
        }

        if self.write_timeout.as_millis() < 10 {
            errors.push("Write timeout too short (minimum: 10ms)".to_string());
        } else if self.write_timeout.as_secs() > 60 {
            errors.push("Write timeout too long (maximum: 60s)".to_string());
        }

        // HELLO with the longest identity must fit
        if self.max_payload_size < 72 {
            errors.push("Max payload size too small (minimum: 72 bytes)".to_string());
        } else if self.max_payload_size > u16::MAX as usize {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum: {})",
                self.max_payload_size,
                u16::MAX
            ));
        }

        if self.event_capacity == 0 {
            errors.push("Event capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level, used when `RUST_LOG` is not set
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to print the event target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("ttt-mesh"),
            log_level: Level::INFO,
            with_target: false,
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
