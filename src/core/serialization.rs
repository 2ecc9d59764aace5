//! # Serialization Formats
//!
//! Payload serialization for arguments and responses.
//!
//! Two interchangeable formats are supported and selected per client or server
//! instance; the chosen format's tag is written into every frame header.
//!
//! | Format  | Tag | Notes                                   |
//! |---------|-----|-----------------------------------------|
//! | JSON    | 0   | self-describing, human-readable         |
//! | Bincode | 1   | schema-based binary, both ends share the type |
//!
//! ## Usage
//! ```
//! use network_rpc::core::serialization::SerializationFormat;
//!
//! let format = SerializationFormat::Json;
//! let bytes = format.encode(&(1u32, "two")).unwrap();
//! let back: (u32, String) = format.decode(&bytes).unwrap();
//! assert_eq!(back, (1, "two".to_string()));
//! ```

use crate::error::{Result, RpcError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Human-readable JSON format (default)
    #[default]
    Json,
    /// Schema-based binary format
    #[serde(alias = "binary", alias = "schema-binary")]
    Bincode,
}

impl SerializationFormat {
    /// Get the serialize tag written into frame headers
    pub fn tag(self) -> u8 {
        match self {
            SerializationFormat::Json => 0x00,
            SerializationFormat::Bincode => 0x01,
        }
    }

    /// Detect format from a header serialize tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(SerializationFormat::Json),
            0x01 => Some(SerializationFormat::Bincode),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Json => "JSON",
            SerializationFormat::Bincode => "Bincode",
        }
    }

    /// Serialize a value to bytes
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializationFormat::Json => {
                serde_json::to_vec(value).map_err(|e| RpcError::Encode(e.to_string()))
            }
            SerializationFormat::Bincode => {
                bincode::serialize(value).map_err(|e| RpcError::Encode(e.to_string()))
            }
        }
    }

    /// Deserialize a value from bytes
    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            SerializationFormat::Json => {
                serde_json::from_slice(data).map_err(|e| RpcError::Decode(e.to_string()))
            }
            SerializationFormat::Bincode => {
                bincode::deserialize(data).map_err(|e| RpcError::Decode(e.to_string()))
            }
        }
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SerializationFormat {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(SerializationFormat::Json),
            "bincode" | "binary" | "schema-binary" => Ok(SerializationFormat::Bincode),
            other => Err(RpcError::Config(format!(
                "Unknown serialization format: {other}"
            ))),
        }
    }
}
