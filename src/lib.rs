//! # network-rpc
//!
//! A minimal RPC runtime: named `Service.Method` calls carried in a fixed
//! binary frame over a pluggable transport, with pluggable payload
//! serialization.
//!
//! ## Layers
//! - [`core`]: frame header, frame layout, transport envelopes, serialization
//! - [`protocol`]: response messages and the service registry
//! - [`transport`]: stream (TCP), bridge (HTTP POST) and datagram (UDP)
//! - [`service`]: [`Server`] and [`Client`]
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```no_run
//! use network_rpc::config::{ClientConfig, ServerConfig};
//! use network_rpc::error::{Result, RpcError};
//! use network_rpc::protocol::dispatcher::{MethodSet, RpcService};
//! use network_rpc::{Client, Server};
//!
//! struct Arith;
//!
//! impl Arith {
//!     fn div(&self, args: (i64, i64), reply: &mut i64) -> Result<()> {
//!         if args.1 == 0 {
//!             return Err(RpcError::Application("division by zero".into()));
//!         }
//!         *reply = args.0 / args.1;
//!         Ok(())
//!     }
//! }
//!
//! impl RpcService for Arith {
//!     fn methods(set: &mut MethodSet<Self>) {
//!         set.method("Div", Self::div);
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let server = std::sync::Arc::new(Server::new(&ServerConfig::default()));
//! server.register(Arith)?;
//! let addr = server.listen("127.0.0.1:0").await?.expect("bound address");
//! let runner = std::sync::Arc::clone(&server);
//! tokio::spawn(async move { runner.run().await });
//!
//! let client = Client::new(&ClientConfig {
//!     address: addr.to_string(),
//!     ..ClientConfig::default()
//! });
//! let quotient: i64 = client.call("Arith.Div", &(10, 3)).await?;
//! assert_eq!(quotient, 3);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::frame::Frame;
pub use crate::core::header::{Header, MessageType};
pub use crate::core::serialization::SerializationFormat;
pub use crate::error::{Result, RpcError};
pub use crate::protocol::dispatcher::{MethodSet, RpcService, ServiceRegistry};
pub use crate::protocol::message::ResponseMessage;
pub use crate::service::{Client, Server};
pub use crate::transport::{Connection, Transport, TransportKind};
