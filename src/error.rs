//! # Error Types
//!
//! Error handling for the RPC runtime.
//!
//! This module defines every failure a call can run into, from a truncated
//! header on the wire to an error reported by the remote handler itself.
//!
//! ## Error Categories
//! - **Malformed input**: truncated headers, bad magic, ill-formed `Service.Method`
//! - **Encode/Decode**: values that could not be serialized or deserialized
//! - **Lookup**: unknown service or method
//! - **Application**: the handler method reported an error
//! - **Transport**: connection reset, dial refusal, incomplete datagram
//!
//! Application failures travel as ordinary response frames; only transport
//! failures invalidate a client connection (see [`RpcError::is_transport`]).
//!
//! ## Example Usage
//! ```rust
//! use network_rpc::error::{RpcError, Result};
//!
//! fn divide(a: i64, b: i64) -> Result<i64> {
//!     if b == 0 {
//!         return Err(RpcError::Application("division by zero".into()));
//!     }
//!     Ok(a / b)
//! }
//!
//! let err = divide(1, 0).unwrap_err();
//! assert_eq!(err.to_string(), "division by zero");
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Registry lock errors
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on service registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on service registry";

    /// Connection errors
    pub const ERR_NO_PENDING_RESPONSE: &str = "no response pending on connection";
    pub const ERR_ALREADY_ANSWERED: &str = "request already answered";
    pub const ERR_CLOSED_WITHOUT_RESPONSE: &str = "connection closed without response";

    /// Bridge debug endpoints without an attached source
    pub const STATS_PLACEHOLDER: &str = "RPC Stats: Not implemented yet";
    pub const SERVICES_PLACEHOLDER: &str = "RPC Services: Not implemented yet";
}

/// RpcError is the primary error type for all runtime operations
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid header data: too short ({0} bytes)")]
    MalformedHeader(usize),

    #[error("invalid magic number: {0:#010x}")]
    BadMagic(u32),

    #[error("truncated frame: {0}")]
    TruncatedFrame(String),

    #[error("invalid frame: {0}")]
    InvalidName(&'static str),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("service/method request ill-formed: {0}")]
    MalformedServiceMethod(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("decode argument error: {0}")]
    ArgDecode(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("service already defined: {0}")]
    DuplicateService(String),

    #[error("service has no qualifying methods: {0}")]
    NoQualifyingMethods(String),

    /// Error reported by a handler method; displayed verbatim.
    #[error("{0}")]
    Application(String),

    /// Error string carried back in a response message; displayed verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("unexpected message type: {0}")]
    UnexpectedMessageType(u8),

    #[error("unknown serialize type: {0}")]
    UnknownSerializeTag(u8),

    #[error("incomplete datagram: declared {declared} bytes, received {received}")]
    IncompleteDatagram { declared: usize, received: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("transport not listening")]
    NotListening,

    #[error("transport closed")]
    TransportClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(&'static str),
}

impl RpcError {
    /// Whether this failure invalidates the connection it occurred on.
    ///
    /// A client that sees one of these drops its connection and re-dials on
    /// the next call; a server worker that sees one stops serving that peer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_)
                | RpcError::Transport(_)
                | RpcError::ConnectionClosed
                | RpcError::NotListening
                | RpcError::TransportClosed
                | RpcError::IncompleteDatagram { .. }
                | RpcError::Timeout
        )
    }
}

/// Type alias for Results using RpcError
pub type Result<T> = std::result::Result<T, RpcError>;
