//! Demo RPC server exposing `ArithService` and `EchoService`.
//!
//! ```text
//! NETWORK_RPC_TRANSPORT=bridge cargo run --example arith_server
//! ```

#[path = "services.rs"]
mod services;

use network_rpc::config::RpcConfig;
use network_rpc::utils::logging::init_logging;
use network_rpc::Server;
use services::{ArithService, EchoService};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> network_rpc::Result<()> {
    let config = RpcConfig::from_env()?;
    init_logging(&config.logging);
    config.validate_strict()?;

    let server = Arc::new(Server::new(&config.server));
    server.register(ArithService)?;
    server.register(EchoService)?;
    info!(services = ?server.registry().service_names(), "Registered services");

    server.listen(&config.server.address).await?;
    info!(
        address = %config.server.address,
        transport = %config.server.transport,
        format = %config.server.serialization,
        "Press Ctrl+C to stop"
    );

    let runner = Arc::clone(&server);
    let accept_loop = tokio::spawn(async move { runner.run().await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to wait for Ctrl+C");
    }
    info!("Shutting down");
    server.close().await?;

    match accept_loop.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Accept loop panicked");
            Ok(())
        }
    }
}
