//! Demo RPC client calling the services of `arith_server`.

#[path = "services.rs"]
mod services;

use network_rpc::config::RpcConfig;
use network_rpc::utils::logging::init_logging;
use network_rpc::{Client, RpcError};
use services::{Args, ArithResult, EchoArgs, EchoResult};

#[tokio::main]
async fn main() -> network_rpc::Result<()> {
    let config = RpcConfig::from_env()?;
    init_logging(&config.logging);
    config.validate_strict()?;

    let client = Client::new(&config.client);
    println!(
        "Connecting to {} over {} ({})",
        client.address(),
        config.client.transport,
        client.format()
    );
    client.connect().await?;

    let args = Args { a: 10, b: 20 };
    for method in ["Add", "Sub", "Mul", "Div"] {
        let result: ArithResult = client
            .call(&format!("ArithService.{method}"), &args)
            .await?;
        println!("ArithService.{method}({}, {}) = {}", args.a, args.b, result.value);
    }

    match client
        .call::<_, ArithResult>("ArithService.Div", &Args { a: 10, b: 0 })
        .await
    {
        Err(RpcError::Remote(message)) => println!("ArithService.Div(10, 0) failed: {message}"),
        other => println!("ArithService.Div(10, 0) unexpectedly returned {other:?}"),
    }

    let mut echo = EchoResult::default();
    let args = EchoArgs {
        message: "Hello, RPC!".to_string(),
    };
    client.call_into("EchoService.Echo", &args, &mut echo).await?;
    println!("EchoService.Echo: sent '{}', received '{}'", args.message, echo.message);

    client.close().await
}
