//! # Configuration
//!
//! Wire constants plus the settings a server, a client and the log output
//! are built from.
//!
//! Settings come from a TOML document (`[server]`, `[client]`, `[logging]`
//! tables, each optional), from `NETWORK_RPC_*` environment variables, or
//! from [`RpcConfig::default_with_overrides`] in code. Durations are written
//! as milliseconds and log levels as lowercase names.
//!
//! ```
//! use network_rpc::config::RpcConfig;
//! use network_rpc::transport::TransportKind;
//!
//! let config = RpcConfig::from_toml(
//!     r#"
//!     [server]
//!     address = "0.0.0.0:9000"
//!     transport = "http"
//!     serialization = "json"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.server.transport, TransportKind::Bridge);
//! assert!(config.validate().is_empty());
//! ```
//!
//! `ClientConfig::call_timeout` is inert unless `enforce_call_timeout` is set.

use crate::core::serialization::SerializationFormat;
use crate::error::{Result, RpcError};
use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// First four bytes of every frame header
pub const MAGIC_NUMBER: u32 = 0x5C2F_3E1D;

/// Version byte written by this implementation; never checked on read
pub const PROTOCOL_VERSION: u8 = 0x01;

/// magic(4) version(1) type(1) serialize(1) service_len(2) method_len(2) payload_len(4)
pub const HEADER_SIZE: usize = 15;

/// Largest frame the stream envelope accepts in either direction
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest UDP payload, envelope included
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;

/// Path the bridge transport accepts calls on
pub const BRIDGE_PATH: &str = "/rpc";

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_ADDRESS: &str = "127.0.0.1:8972";
const MAX_MAILBOX_CAPACITY: usize = 100_000;
const MAX_APP_NAME_LEN: usize = 64;

/// Everything needed to stand up a server, a client and logging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RpcError::Config(format!("Failed to open config file: {e}")))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RpcError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults, overridden by any of:
    ///
    /// | variable | field |
    /// |---|---|
    /// | `NETWORK_RPC_SERVER_ADDRESS` | `server.address` |
    /// | `NETWORK_RPC_CLIENT_ADDRESS` | `client.address` |
    /// | `NETWORK_RPC_TRANSPORT` | both transports |
    /// | `NETWORK_RPC_SERIALIZATION` | both formats |
    /// | `NETWORK_RPC_CALL_TIMEOUT_MS` | `client.call_timeout` |
    /// | `NETWORK_RPC_MAILBOX_CAPACITY` | `server.bridge_mailbox_capacity` |
    ///
    /// A variable that is set but does not parse is an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = env_var("NETWORK_RPC_SERVER_ADDRESS") {
            config.server.address = addr;
        }
        if let Some(addr) = env_var("NETWORK_RPC_CLIENT_ADDRESS") {
            config.client.address = addr;
        }
        if let Some(kind) = env_parse::<TransportKind>("NETWORK_RPC_TRANSPORT")? {
            config.server.transport = kind;
            config.client.transport = kind;
        }
        if let Some(format) = env_parse::<SerializationFormat>("NETWORK_RPC_SERIALIZATION")? {
            config.server.serialization = format;
            config.client.serialization = format;
        }
        if let Some(millis) = env_parse::<u64>("NETWORK_RPC_CALL_TIMEOUT_MS")? {
            config.client.call_timeout = Duration::from_millis(millis);
        }
        if let Some(capacity) = env_parse::<usize>("NETWORK_RPC_MAILBOX_CAPACITY")? {
            config.server.bridge_mailbox_capacity = capacity;
        }

        Ok(config)
    }

    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// The defaults rendered as TOML, as a starting point for a config file
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| RpcError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| RpcError::Config(format!("Failed to write config file: {e}")))
    }

    /// Every problem found, one message each; empty when usable
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.server.validate();
        problems.extend(self.client.validate());
        problems.extend(self.logging.validate());
        problems
    }

    /// [`validate`](Self::validate), folded into a single `Config` error
    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        Err(RpcError::Config(format!(
            "Configuration validation failed:\n  - {}",
            problems.join("\n  - ")
        )))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name).map(|raw| parse_setting(name, &raw)).transpose()
}

fn parse_setting<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| RpcError::Config(format!("{name}={raw}: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address; must be a literal `ip:port`
    pub address: String,

    pub transport: TransportKind,

    /// Format used when the request's tag is not honored
    pub serialization: SerializationFormat,

    /// Decode each request with the format its header tag names
    #[serde(default)]
    pub honor_serialize_tag: bool,

    #[serde(default = "default_mailbox_capacity")]
    pub bridge_mailbox_capacity: usize,
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            transport: TransportKind::Stream,
            serialization: SerializationFormat::Json,
            honor_serialize_tag: false,
            bridge_mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.address.is_empty() {
            problems.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<SocketAddr>().is_err() {
            problems.push(format!("Invalid server address '{}': expected ip:port", self.address));
        }

        match self.bridge_mailbox_capacity {
            0 => problems.push("Bridge mailbox capacity must be greater than 0".to_string()),
            n if n > MAX_MAILBOX_CAPACITY => problems.push(format!(
                "Bridge mailbox capacity too large: {n} (limit {MAX_MAILBOX_CAPACITY})"
            )),
            _ => {}
        }

        problems
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server to dial; `host:port`, the host may be a name
    pub address: String,

    pub transport: TransportKind,

    pub serialization: SerializationFormat,

    /// Round-trip deadline, in milliseconds in config files
    #[serde(with = "millis")]
    pub call_timeout: Duration,

    #[serde(default)]
    pub enforce_call_timeout: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            transport: TransportKind::Stream,
            serialization: SerializationFormat::Json,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            enforce_call_timeout: false,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.address.is_empty() {
            problems.push("Client address cannot be empty".to_string());
        } else if self.address.rsplit_once(':').is_none() {
            problems.push(format!("Invalid client address '{}': expected host:port", self.address));
        }

        if self.call_timeout < Duration::from_millis(10) {
            problems.push("Call timeout too short (minimum 10ms)".to_string());
        } else if self.call_timeout > Duration::from_secs(3600) {
            problems.push("Call timeout too long (maximum 1h)".to_string());
        }

        problems
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Reported when logging starts
    pub app_name: String,

    /// Fallback level when `RUST_LOG` is unset
    #[serde(with = "level_name")]
    pub log_level: Level,

    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: "network-rpc".to_string(),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        match self.app_name.len() {
            0 => vec!["Application name cannot be empty".to_string()],
            n if n > MAX_APP_NAME_LEN => vec![format!(
                "Application name too long: {n} characters (limit {MAX_APP_NAME_LEN})"
            )],
            _ => Vec::new(),
        }
    }
}

/// `Duration` as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `tracing::Level` as a lowercase name such as `"debug"`
mod level_name {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Level, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(|_| D::Error::custom(format!("unknown log level '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_roundtrip_lowercase() {
        let config = RpcConfig::default_with_overrides(|c| c.logging.log_level = Level::TRACE);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("log_level = \"trace\""));
        let back = RpcConfig::from_toml(&text).unwrap();
        assert_eq!(back.logging.log_level, Level::TRACE);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let err = RpcConfig::from_toml(
            "[logging]\napp_name = \"x\"\nlog_level = \"loud\"\njson_format = false",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown log level"));
    }

    #[test]
    fn env_values_that_do_not_parse_are_errors() {
        let err = parse_setting::<u64>("NETWORK_RPC_CALL_TIMEOUT_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("NETWORK_RPC_CALL_TIMEOUT_MS=soon"));
        assert_eq!(parse_setting::<u64>("X", "250").unwrap(), 250);

        let err = parse_setting::<TransportKind>("NETWORK_RPC_TRANSPORT", "quic").unwrap_err();
        assert!(matches!(err, RpcError::Config(_)));
    }
}
