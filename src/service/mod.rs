//! # Service Layer
//!
//! The two ends of a call.
//!
//! ## Components
//! - **Server**: accept loop, per-connection workers, error responses
//! - **Client**: connection management and the call round trip

pub mod client;
pub mod server;

pub use client::Client;
pub use server::Server;
