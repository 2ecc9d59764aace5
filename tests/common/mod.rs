//! Services and server helpers shared by the integration tests
#![allow(dead_code)]

use network_rpc::config::{ClientConfig, ServerConfig};
use network_rpc::error::{Result, RpcError};
use network_rpc::protocol::dispatcher::{MethodSet, RpcService};
use network_rpc::transport::TransportKind;
use network_rpc::{Client, SerializationFormat, Server};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Args {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArithResult {
    pub value: i64,
}

pub struct ArithService;

impl RpcService for ArithService {
    fn methods(set: &mut MethodSet<Self>) {
        set.method("Add", |_: &ArithService, args: Args, r: &mut ArithResult| {
            r.value = args.a + args.b;
            Ok(())
        })
        .method("Sub", |_: &ArithService, args: Args, r: &mut ArithResult| {
            r.value = args.a - args.b;
            Ok(())
        })
        .method("Mul", |_: &ArithService, args: Args, r: &mut ArithResult| {
            r.value = args.a * args.b;
            Ok(())
        })
        .method("Div", |_: &ArithService, args: Args, r: &mut ArithResult| {
            if args.b == 0 {
                return Err(RpcError::Application("division by zero".to_string()));
            }
            r.value = args.a / args.b;
            Ok(())
        });
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EchoArgs {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EchoResult {
    pub message: String,
}

pub struct EchoService;

impl RpcService for EchoService {
    fn methods(set: &mut MethodSet<Self>) {
        set.method("Echo", |_: &EchoService, args: EchoArgs, r: &mut EchoResult| {
            r.message = format!("Echo: {}", args.message);
            Ok(())
        });
    }
}

/// Sleeps for the requested number of milliseconds before answering
pub struct SlowService;

impl RpcService for SlowService {
    fn methods(set: &mut MethodSet<Self>) {
        set.method("Sleep", |_: &SlowService, millis: u64, r: &mut u64| {
            std::thread::sleep(Duration::from_millis(millis));
            *r = millis;
            Ok(())
        });
    }
}

/// Service registered under a caller-chosen name
pub struct NamedService(pub String);

impl RpcService for NamedService {
    fn service_name(&self) -> String {
        self.0.clone()
    }

    fn methods(set: &mut MethodSet<Self>) {
        set.method("Name", |svc: &NamedService, _: (), r: &mut String| {
            *r = svc.0.clone();
            Ok(())
        });
    }
}

pub struct TestServer {
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    pub accept_loop: JoinHandle<Result<()>>,
}

/// Start a server with the arithmetic and echo services on an ephemeral port
pub async fn start_server(kind: TransportKind, format: SerializationFormat) -> TestServer {
    let config = ServerConfig {
        address: "127.0.0.1:0".to_string(),
        transport: kind,
        serialization: format,
        ..ServerConfig::default()
    };
    let server = Arc::new(Server::new(&config));
    server.register(ArithService).unwrap();
    server.register(EchoService).unwrap();
    server.register(SlowService).unwrap();

    let addr = server.listen(&config.address).await.unwrap().unwrap();
    let runner = Arc::clone(&server);
    let accept_loop = tokio::spawn(async move { runner.run().await });

    TestServer {
        server,
        addr,
        accept_loop,
    }
}

pub fn client_for(addr: SocketAddr, kind: TransportKind, format: SerializationFormat) -> Client {
    Client::new(&ClientConfig {
        address: addr.to_string(),
        transport: kind,
        serialization: format,
        ..ClientConfig::default()
    })
}

pub const ALL_TRANSPORTS: [TransportKind; 3] = [
    TransportKind::Stream,
    TransportKind::Bridge,
    TransportKind::Datagram,
];

pub const ALL_FORMATS: [SerializationFormat; 2] =
    [SerializationFormat::Json, SerializationFormat::Bincode];
