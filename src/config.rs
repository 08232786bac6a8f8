//! # Configuration Management
//!
//! Centralized configuration for codecs, framing, host discovery and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()` (`NETWIRE_*`)
//! - Direct instantiation with defaults
//!
//! Durations are written as milliseconds, log levels as lowercase names.

use crate::core::serialization::WireFormat;
use crate::error::{Result, WireError};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed frame body size (16 MB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Default UDP port servers listen on for discovery requests
pub const DEFAULT_DISCOVERY_PORT: u16 = 54777;

/// Default receive buffer for a single discovery reply
pub const DEFAULT_REPLY_BUFFER_SIZE: usize = 1024;

/// Largest payload a UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub framing: FramingConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| WireError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| WireError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| WireError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(format) = std::env::var("NETWIRE_CODEC_FORMAT") {
            config.codec.format = match format.to_ascii_lowercase().as_str() {
                "json" => WireFormat::Json,
                "binary" => WireFormat::Binary,
                other => {
                    return Err(WireError::Config(format!(
                        "Unknown codec format in NETWIRE_CODEC_FORMAT: '{other}'"
                    )))
                }
            };
        }

        if let Ok(logging) = std::env::var("NETWIRE_CODEC_LOGGING") {
            if let Ok(val) = logging.parse::<bool>() {
                config.codec.logging = val;
            }
        }

        if let Ok(port) = std::env::var("NETWIRE_DISCOVERY_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                config.discovery.port = val;
            }
        }

        if let Ok(timeout) = std::env::var("NETWIRE_DISCOVERY_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.discovery.timeout = Duration::from_millis(val);
            }
        }

        if let Ok(len) = std::env::var("NETWIRE_MAX_FRAME_LEN") {
            if let Ok(val) = len.parse::<usize>() {
                config.framing.max_frame_len = val;
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
            .map_err(|e| WireError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| WireError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.codec.validate());
        errors.extend(self.framing.validate());
        errors.extend(self.discovery.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(WireError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Codec selection and diagnostics
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CodecConfig {
    /// Wire encoding used for payloads
    #[serde(default)]
    pub format: WireFormat,

    /// Log each payload after encoding it
    #[serde(default)]
    pub logging: bool,

    /// Pretty-print logged JSON payloads
    #[serde(default)]
    pub pretty: bool,
}

impl CodecConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.pretty && !self.logging {
            errors.push("codec.pretty has no effect unless codec.logging is enabled".to_string());
        }
        errors
    }
}

/// Stream framing limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FramingConfig {
    /// Largest frame body accepted or produced, in bytes
    pub max_frame_len: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl FramingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_frame_len == 0 {
            errors.push("Max frame length cannot be 0".to_string());
        } else if self.max_frame_len > u32::MAX as usize {
            errors.push(format!(
                "Max frame length {} does not fit the 4-byte length prefix",
                self.max_frame_len
            ));
        }
        errors
    }
}

/// How a requester picks among discovery replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Return the first accepted reply immediately
    #[default]
    FirstReply,
    /// Listen for the whole window, then let the handler pick
    CollectAll,
}

/// Host discovery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// UDP port servers listen on for discovery requests
    pub port: u16,

    /// How long a requester waits for replies
    #[serde(with = "duration_serde")]
    pub timeout: Duration,

    /// Local address the requester binds its ephemeral socket to
    pub bind_address: IpAddr,

    /// Explicit broadcast targets. Empty means automatic.
    #[serde(default)]
    pub broadcast_targets: Vec<IpAddr>,

    /// Add each interface's /24 and /16 directed broadcast addresses
    pub include_interface_broadcasts: bool,

    /// Receive buffer size for one reply datagram
    pub reply_buffer_size: usize,

    #[serde(default)]
    pub mode: DiscoveryMode,

    /// Ignore further replies from an endpoint that was already accepted
    #[serde(default)]
    pub dedupe_by_endpoint: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            timeout: timeout::DISCOVERY_TIMEOUT,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            broadcast_targets: Vec::new(),
            include_interface_broadcasts: true,
            reply_buffer_size: DEFAULT_REPLY_BUFFER_SIZE,
            mode: DiscoveryMode::FirstReply,
            dedupe_by_endpoint: false,
        }
    }
}

impl DiscoveryConfig {
    /// Configuration aimed at explicit targets only, e.g. loopback in tests.
    pub fn with_targets(targets: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            broadcast_targets: targets.into_iter().collect(),
            include_interface_broadcasts: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("Discovery port cannot be 0".to_string());
        }

        if self.timeout.is_zero() {
            errors.push("Discovery timeout cannot be 0".to_string());
        } else if self.timeout > timeout::MAX_DISCOVERY_TIMEOUT {
            errors.push(format!(
                "Discovery timeout too long (maximum: {}s)",
                timeout::MAX_DISCOVERY_TIMEOUT.as_secs()
            ));
        }

        if self.reply_buffer_size == 0 {
            errors.push("Reply buffer size cannot be 0".to_string());
        } else if self.reply_buffer_size > MAX_DATAGRAM_SIZE {
            errors.push(format!(
                "Reply buffer size {} exceeds the largest UDP datagram ({MAX_DATAGRAM_SIZE})",
                self.reply_buffer_size
            ));
        }

        if self.bind_address.is_ipv6() {
            errors.push("Discovery requires an IPv4 bind address (broadcast is IPv4-only)".to_string());
        }

        for target in &self.broadcast_targets {
            if target.is_ipv6() {
                errors.push(format!("Broadcast target {target} is not IPv4"));
            }
        }

        errors
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
            app_name: String::from("netwire"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
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
        let level_str = level.as_str().to_ascii_lowercase();
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
