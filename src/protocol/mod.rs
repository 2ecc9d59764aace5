//! # RPC Protocol Layer
//!
//! Response messages and the server-side service registry.
//!
//! ## Components
//! - **Message**: the `ResponseMessage` envelope carried in response payloads
//! - **Dispatcher**: service registration and call-by-name dispatch

pub mod dispatcher;
pub mod message;
