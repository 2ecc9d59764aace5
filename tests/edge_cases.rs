#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Boundary conditions on the wire and at the transport seams

mod common;

use bytes::Bytes;
use common::*;
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use network_rpc::config::{HEADER_SIZE, MAGIC_NUMBER};
use network_rpc::core::codec::LengthPrefixCodec;
use network_rpc::protocol::dispatcher::{MethodSet, RpcService};
use network_rpc::transport::{StreamTransport, Transport, TransportKind};
use network_rpc::{Frame, Header, ResponseMessage, RpcError, SerializationFormat};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

// ============================================================================
// STREAM FRAMING
// ============================================================================

async fn stream_pair() -> (
    Box<dyn network_rpc::Connection>,
    Box<dyn network_rpc::Connection>,
) {
    let transport = Arc::new(StreamTransport::new());
    transport.listen("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap().to_string();

    let acceptor = Arc::clone(&transport);
    let accepted = tokio::spawn(async move { acceptor.accept().await.unwrap() });
    let dialed = StreamTransport::new().dial(&addr).await.unwrap();
    (dialed, accepted.await.unwrap())
}

#[tokio::test]
async fn test_stream_preserves_frame_sizes() {
    let (mut client, mut server) = stream_pair().await;
    let sizes = [0usize, 1, 15, 4096, 1 << 20];
    let pattern = |size: usize| (0..size).map(|i| (i % 251) as u8).collect::<Vec<u8>>();

    let writer = tokio::spawn(async move {
        for size in sizes {
            client.write(&pattern(size)).await.unwrap();
        }
        client
    });

    for size in sizes {
        let received = server.read().await.unwrap();
        assert_eq!(received.len(), size);
        assert_eq!(received, pattern(size));
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn test_stream_reassembles_byte_by_byte_writes() {
    let transport = Arc::new(StreamTransport::new());
    transport.listen("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();

    let acceptor = Arc::clone(&transport);
    let reader = tokio::spawn(async move {
        let mut conn = acceptor.accept().await.unwrap();
        (conn.read().await.unwrap(), conn.read().await.unwrap())
    });

    let mut raw = TcpStream::connect(addr).await.unwrap();
    let mut wire = Vec::new();
    for frame in [&b"first"[..], &b"second frame"[..]] {
        wire.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        wire.extend_from_slice(frame);
    }
    for byte in wire {
        raw.write_all(&[byte]).await.unwrap();
        raw.flush().await.unwrap();
    }

    let (first, second) = reader.await.unwrap();
    assert_eq!(first, b"first");
    assert_eq!(second, b"second frame");
}

#[tokio::test]
async fn test_stream_peer_close_reports_connection_closed() {
    let (mut client, mut server) = stream_pair().await;
    client.close().await.unwrap();
    drop(client);
    assert!(matches!(
        server.read().await,
        Err(RpcError::ConnectionClosed)
    ));
}

// ============================================================================
// MALFORMED FRAMES AGAINST A LIVE SERVER
// ============================================================================

fn decode_error(bytes: &[u8]) -> String {
    let frame = Frame::parse(bytes).unwrap();
    let msg: ResponseMessage<()> = SerializationFormat::Json.decode(&frame.payload).unwrap();
    msg.into_outcome().unwrap_err()
}

#[tokio::test]
async fn test_bad_frames_answered_and_connection_kept() {
    let server = start_server(TransportKind::Stream, SerializationFormat::Json).await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut framed = Framed::new(stream, LengthPrefixCodec);

    // too short for a header
    framed.send(Bytes::from_static(&[1, 2, 3])).await.unwrap();
    let reply = framed.next().await.unwrap().unwrap();
    assert!(decode_error(&reply).contains("too short"));

    // wrong magic
    let mut bad = Header::request(0, 0, 0, 0).encode();
    bad[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
    framed.send(Bytes::copy_from_slice(&bad)).await.unwrap();
    let reply = framed.next().await.unwrap().unwrap();
    assert!(decode_error(&reply).contains("magic"));

    // declared payload longer than what was sent
    let mut short = Header::request(0, 12, 4, 64).encode().to_vec();
    short.extend_from_slice(b"ArithServiceAdd");
    framed.send(Bytes::from(short)).await.unwrap();
    let reply = framed.next().await.unwrap().unwrap();
    assert!(decode_error(&reply).contains("truncated"));

    // the same connection still serves good requests
    let payload = SerializationFormat::Json.encode(&Args { a: 2, b: 3 }).unwrap();
    let request =
        Frame::request(SerializationFormat::Json, "ArithService", "Add", payload).unwrap();
    framed.send(Bytes::from(request.to_bytes())).await.unwrap();
    let reply = framed.next().await.unwrap().unwrap();
    let frame = Frame::parse(&reply).unwrap();
    assert_eq!(&frame.header.encode()[0..4], &MAGIC_NUMBER.to_be_bytes());
    let msg: ResponseMessage<ArithResult> =
        SerializationFormat::Json.decode(&frame.payload).unwrap();
    assert_eq!(msg.result, Some(ArithResult { value: 5 }));

    assert_eq!(server.server.metrics().snapshot().protocol_errors, 3);
}

#[tokio::test]
async fn test_unknown_version_is_still_served() {
    let server = start_server(TransportKind::Stream, SerializationFormat::Json).await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut framed = Framed::new(stream, LengthPrefixCodec);

    let payload = SerializationFormat::Json.encode(&Args { a: 4, b: 4 }).unwrap();
    let mut request = Frame::request(SerializationFormat::Json, "ArithService", "Mul", payload)
        .unwrap()
        .to_bytes();
    request[4] = 0x7F;
    framed.send(Bytes::from(request)).await.unwrap();

    let reply = framed.next().await.unwrap().unwrap();
    assert!(reply.len() > HEADER_SIZE);
    let frame = Frame::parse(&reply).unwrap();
    let msg: ResponseMessage<ArithResult> =
        SerializationFormat::Json.decode(&frame.payload).unwrap();
    assert_eq!(msg.result, Some(ArithResult { value: 16 }));
}

// ============================================================================
// BRIDGE SURFACE
// ============================================================================

async fn http(
    method: hyper::Method,
    addr: std::net::SocketAddr,
    path: &str,
    body: &'static [u8],
) -> (hyper::StatusCode, Vec<u8>) {
    let client: HttpClient<HttpConnector, Full<Bytes>> =
        HttpClient::builder(TokioExecutor::new()).build_http();
    let request = hyper::Request::builder()
        .method(method)
        .uri(format!("http://{addr}{path}"))
        .body(Full::new(Bytes::from_static(body)))
        .unwrap();
    let response = client.request(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_bridge_debug_endpoints_report_server_state() {
    let server = start_server(TransportKind::Bridge, SerializationFormat::Json).await;

    let (status, body) = http(hyper::Method::GET, server.addr, "/debug/rpc/services", b"").await;
    assert_eq!(status, hyper::StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("ArithService: Add, Div, Mul, Sub"));
    assert!(text.contains("EchoService: Echo"));

    let (status, body) = http(hyper::Method::GET, server.addr, "/debug/rpc/stats", b"").await;
    assert_eq!(status, hyper::StatusCode::OK);
    let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(stats.get("requests_total").is_some());
}

#[tokio::test]
async fn test_bridge_rejects_get_on_rpc_path() {
    let server = start_server(TransportKind::Bridge, SerializationFormat::Json).await;
    let (status, _) = http(hyper::Method::GET, server.addr, "/rpc", b"").await;
    assert_eq!(status, hyper::StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_bridge_garbage_body_gets_error_response() {
    let server = start_server(TransportKind::Bridge, SerializationFormat::Json).await;
    let (status, body) = http(hyper::Method::POST, server.addr, "/rpc", b"garbage").await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert!(decode_error(&body).contains("too short"));
}

// ============================================================================
// DATAGRAM LIMITS
// ============================================================================

#[tokio::test]
async fn test_datagram_rejects_oversized_call() {
    let server = start_server(TransportKind::Datagram, SerializationFormat::Json).await;
    let client = client_for(server.addr, TransportKind::Datagram, SerializationFormat::Json);

    let huge = EchoArgs {
        message: "x".repeat(70_000),
    };
    let err = client
        .call::<_, EchoResult>("EchoService.Echo", &huge)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::FrameTooLarge(_)));

    let ok: EchoResult = client
        .call(
            "EchoService.Echo",
            &EchoArgs {
                message: "small".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(ok.message, "Echo: small");
}

// ============================================================================
// REPLIES TOO LARGE FOR THE TRANSPORT
// ============================================================================

/// Replies with a string of the requested length
struct BlobService;

impl RpcService for BlobService {
    fn methods(set: &mut MethodSet<Self>) {
        set.method("Blob", |_: &BlobService, len: usize, r: &mut String| {
            *r = "x".repeat(len);
            Ok(())
        });
    }
}

async fn assert_oversized_reply_is_reported(kind: TransportKind, len: usize) {
    let server = start_server(kind, SerializationFormat::Json).await;
    server.server.register(BlobService).unwrap();
    let client = client_for(server.addr, kind, SerializationFormat::Json)
        .with_call_timeout(Duration::from_secs(30));

    let err = client
        .call::<_, String>("BlobService.Blob", &len)
        .await
        .unwrap_err();
    assert!(
        matches!(err, RpcError::Remote(ref m) if m.contains("frame too large")),
        "{kind}: {err}"
    );
    assert!(client.is_connected().await, "{kind}");

    // the same connection keeps serving
    let small: String = client.call("BlobService.Blob", &3usize).await.unwrap();
    assert_eq!(small, "xxx");
    assert_eq!(server.server.metrics().snapshot().requests_failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_datagram_oversized_reply_answered_with_error() {
    assert_oversized_reply_is_reported(TransportKind::Datagram, 70_000).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_oversized_reply_answered_with_error() {
    assert_oversized_reply_is_reported(TransportKind::Stream, 17 * 1024 * 1024).await;
}
