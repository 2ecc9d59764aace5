//! # Transport Layer
//!
//! A uniform listen/accept/dial/close contract over three back ends.
//!
//! Every [`Connection::read`] returns exactly one frame, never a partial frame
//! and never two, whatever the back end does underneath:
//!
//! - **[`stream`]**: persistent TCP connection, `[len u32 BE][frame]` envelope
//! - **[`bridge`]**: HTTP POST endpoint, one request body is one frame
//! - **[`datagram`]**: UDP, `[len u32 BE][frame]` inside each datagram
//!
//! ## Example
//! ```no_run
//! use network_rpc::transport::{new_transport, TransportKind};
//!
//! # async fn run() -> network_rpc::error::Result<()> {
//! let transport = new_transport(TransportKind::Stream);
//! let mut conn = transport.dial("127.0.0.1:8972").await?;
//! conn.write(b"frame bytes").await?;
//! let reply = conn.read().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod datagram;
pub mod stream;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, RpcError};

pub use bridge::{BridgeTransport, DebugSource};
pub use datagram::DatagramTransport;
pub use stream::StreamTransport;

/// Server- and client-side entry point of a transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start accepting peers on `addr`
    async fn listen(&self, addr: &str) -> Result<()>;

    /// Wait for the next peer. Fails with `NotListening` before `listen`
    /// and `TransportClosed` after `close`.
    async fn accept(&self) -> Result<Box<dyn Connection>>;

    /// Open a connection to a listening peer
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>>;

    /// Stop listening
    async fn close(&self) -> Result<()>;

    /// Bound address once listening
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// One logical channel to a peer
#[async_trait]
pub trait Connection: Send {
    /// Receive exactly one frame
    async fn read(&mut self) -> Result<Vec<u8>>;

    /// Send exactly one frame
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Which transport back end to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    #[serde(alias = "tcp")]
    Stream,
    #[serde(alias = "http")]
    Bridge,
    #[serde(alias = "udp")]
    Datagram,
}

impl TransportKind {
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Stream => "stream",
            TransportKind::Bridge => "bridge",
            TransportKind::Datagram => "datagram",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stream" | "tcp" => Ok(TransportKind::Stream),
            "bridge" | "http" => Ok(TransportKind::Bridge),
            "datagram" | "udp" => Ok(TransportKind::Datagram),
            other => Err(RpcError::Config(format!("Unknown transport: {other}"))),
        }
    }
}

/// Create a transport instance of the given kind
pub fn new_transport(kind: TransportKind) -> Arc<dyn Transport> {
    match kind {
        TransportKind::Stream => Arc::new(StreamTransport::new()),
        TransportKind::Bridge => Arc::new(BridgeTransport::new()),
        TransportKind::Datagram => Arc::new(DatagramTransport::new()),
    }
}
