//! Bridge transport: RPC frames carried in HTTP POST bodies.
//!
//! The listening side runs a hyper HTTP/1.1 server. Each `POST /rpc` body is
//! one request frame; the handler parks it in a bounded mailbox together with
//! a single-use completion channel and waits. [`Transport::accept`] pops the
//! next parked request as a [`Connection`] whose `write` completes the HTTP
//! exchange with status 200. A connection closed without a write answers 500.
//!
//! Once the mailbox is full, further HTTP handlers wait for a free slot
//! instead of failing, which bounds the work queued ahead of the server.
//!
//! The dialing side issues one POST per `write` and keeps the response body
//! for the following `read`.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{BRIDGE_PATH, DEFAULT_MAILBOX_CAPACITY};
use crate::error::constants::{
    ERR_ALREADY_ANSWERED, ERR_CLOSED_WITHOUT_RESPONSE, ERR_NO_PENDING_RESPONSE,
    SERVICES_PLACEHOLDER, STATS_PLACEHOLDER,
};
use crate::error::{Result, RpcError};
use crate::transport::{Connection, Transport};

/// Path of the statistics endpoint
pub const STATS_PATH: &str = "/debug/rpc/stats";
/// Path of the service listing endpoint
pub const SERVICES_PATH: &str = "/debug/rpc/services";

/// Answers the informational GET endpoints of a bridge listener
pub trait DebugSource: Send + Sync {
    /// Body of `GET /debug/rpc/stats`
    fn stats(&self) -> String;

    /// Entries of `GET /debug/rpc/services`, one per line
    fn services(&self) -> Vec<String>;
}

type Completion = oneshot::Sender<std::result::Result<Bytes, String>>;

/// A request body parked until the server loop picks it up
struct PendingRequest {
    body: Bytes,
    peer: SocketAddr,
    reply: Completion,
}

struct Mailbox {
    tx: mpsc::Sender<PendingRequest>,
    rx: tokio::sync::Mutex<mpsc::Receiver<PendingRequest>>,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }
}

struct Listening {
    mailbox: Arc<Mailbox>,
    local_addr: SocketAddr,
    server_task: JoinHandle<()>,
}

/// HTTP bridge transport
pub struct BridgeTransport {
    capacity: usize,
    debug_source: Option<Arc<dyn DebugSource>>,
    state: Mutex<Option<Listening>>,
    shutdown: watch::Sender<bool>,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl Default for BridgeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeTransport {
    pub fn new() -> Self {
        Self::with_mailbox_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// Bridge whose mailbox holds up to `capacity` unaccepted requests
    pub fn with_mailbox_capacity(capacity: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            capacity: capacity.max(1),
            debug_source: None,
            state: Mutex::new(None),
            shutdown,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Serve the debug endpoints from `source` instead of placeholder text
    pub fn with_debug_source(mut self, source: Arc<dyn DebugSource>) -> Self {
        self.debug_source = Some(source);
        self
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.capacity
    }

    /// Requests parked in the mailbox and not yet accepted
    pub fn pending_requests(&self) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .as_ref()
                    .map(|s| s.mailbox.tx.max_capacity() - s.mailbox.tx.capacity())
            })
            .unwrap_or(0)
    }

    fn current_mailbox(&self) -> Result<Arc<Mailbox>> {
        self.state
            .lock()
            .map_err(|_| RpcError::Lock("bridge state"))?
            .as_ref()
            .map(|s| Arc::clone(&s.mailbox))
            .ok_or(RpcError::NotListening)
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    #[instrument(skip(self))]
    async fn listen(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let mailbox = Arc::new(Mailbox::new(self.capacity));

        let server_task = tokio::spawn(serve_http(
            listener,
            Arc::clone(&mailbox),
            self.debug_source.clone(),
        ));

        let previous = self
            .state
            .lock()
            .map_err(|_| RpcError::Lock("bridge state"))?
            .replace(Listening {
                mailbox,
                local_addr,
                server_task,
            });
        if let Some(previous) = previous {
            previous.server_task.abort();
        }
        self.shutdown.send_replace(false);

        info!(address = %local_addr, path = BRIDGE_PATH, "Bridge transport listening");
        Ok(())
    }

    async fn accept(&self) -> Result<Box<dyn Connection>> {
        let mut shutdown = self.shutdown.subscribe();
        let closed = *shutdown.borrow();
        if closed {
            return Err(RpcError::TransportClosed);
        }
        let mailbox = self.current_mailbox()?;
        let mut rx = mailbox.rx.lock().await;

        tokio::select! {
            pending = rx.recv() => match pending {
                Some(request) => Ok(Box::new(BridgeConnection::new(request))),
                None => Err(RpcError::TransportClosed),
            },
            _ = shutdown.changed() => Err(RpcError::TransportClosed),
        }
    }

    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>> {
        Ok(Box::new(BridgeClientConnection::new(
            self.client.clone(),
            addr,
        )))
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.send_replace(true);
        let listening = self
            .state
            .lock()
            .map_err(|_| RpcError::Lock("bridge state"))?
            .take();

        if let Some(listening) = listening {
            listening.server_task.abort();

            // Fail parked requests so their HTTP handlers answer instead of waiting
            let mut rx = listening.mailbox.rx.lock().await;
            rx.close();
            let mut dropped = 0usize;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            info!(dropped, "Bridge transport closed");
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().ok()?.as_ref().map(|s| s.local_addr)
    }
}

async fn serve_http(
    listener: TcpListener,
    mailbox: Arc<Mailbox>,
    debug_source: Option<Arc<dyn DebugSource>>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Bridge listener accept failed");
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let mailbox = Arc::clone(&mailbox);
        let debug_source = debug_source.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let mailbox = Arc::clone(&mailbox);
                let debug_source = debug_source.clone();
                async move { handle_request(req, peer, mailbox, debug_source).await }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, error = %err, "Error serving bridge connection");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    mailbox: Arc<Mailbox>,
    debug_source: Option<Arc<dyn DebugSource>>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::POST, BRIDGE_PATH) => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Failed to read request body");
                    return Ok(text_response(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read request body: {e}"),
                    ));
                }
            };
            exchange(body, peer, &mailbox).await
        }
        (_, BRIDGE_PATH) => text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        (&Method::GET, STATS_PATH) => match &debug_source {
            Some(source) => text_response(StatusCode::OK, source.stats()),
            None => text_response(StatusCode::OK, STATS_PLACEHOLDER),
        },
        (&Method::GET, SERVICES_PATH) => match &debug_source {
            Some(source) => text_response(StatusCode::OK, source.services().join("\n")),
            None => text_response(StatusCode::OK, SERVICES_PLACEHOLDER),
        },
        _ => text_response(StatusCode::NOT_FOUND, "Not found"),
    };
    Ok(response)
}

/// Park one request frame and wait for the server loop to answer it
async fn exchange(body: Bytes, peer: SocketAddr, mailbox: &Mailbox) -> Response<Full<Bytes>> {
    let (reply, completion) = oneshot::channel();
    let pending = PendingRequest { body, peer, reply };

    if mailbox.tx.send(pending).await.is_err() {
        return text_response(StatusCode::SERVICE_UNAVAILABLE, "Transport closed");
    }

    match completion.await {
        Ok(Ok(frame)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Full::new(frame))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))),
        Ok(Err(message)) => text_response(StatusCode::INTERNAL_SERVER_ERROR, message),
        Err(_) => text_response(StatusCode::INTERNAL_SERVER_ERROR, ERR_CLOSED_WITHOUT_RESPONSE),
    }
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));
    response
}

/// Server side of one HTTP exchange
pub struct BridgeConnection {
    body: Option<Bytes>,
    peer: SocketAddr,
    reply: Option<Completion>,
}

impl BridgeConnection {
    fn new(request: PendingRequest) -> Self {
        Self {
            body: Some(request.body),
            peer: request.peer,
            reply: Some(request.reply),
        }
    }
}

#[async_trait]
impl Connection for BridgeConnection {
    async fn read(&mut self) -> Result<Vec<u8>> {
        self.body
            .take()
            .map(|b| b.to_vec())
            .ok_or(RpcError::ConnectionClosed)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let reply = self
            .reply
            .take()
            .ok_or_else(|| RpcError::Transport(ERR_ALREADY_ANSWERED.to_string()))?;
        reply
            .send(Ok(Bytes::copy_from_slice(data)))
            .map_err(|_| RpcError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(Err(ERR_CLOSED_WITHOUT_RESPONSE.to_string()));
        }
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

/// Client side: one POST per written frame
pub struct BridgeClientConnection {
    client: Client<HttpConnector, Full<Bytes>>,
    uri: String,
    response: Option<Vec<u8>>,
}

impl BridgeClientConnection {
    fn new(client: Client<HttpConnector, Full<Bytes>>, addr: &str) -> Self {
        let base = if addr.starts_with("http://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{addr}")
        };
        Self {
            client,
            uri: format!("{base}{BRIDGE_PATH}"),
            response: None,
        }
    }
}

#[async_trait]
impl Connection for BridgeClientConnection {
    async fn read(&mut self) -> Result<Vec<u8>> {
        self.response
            .take()
            .ok_or_else(|| RpcError::Transport(ERR_NO_PENDING_RESPONSE.to_string()))
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.uri)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Full::new(Bytes::copy_from_slice(data)))
            .map_err(|e| RpcError::Transport(format!("Failed to build request: {e}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| RpcError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to read response: {e}")))?
            .to_bytes();

        if status != StatusCode::OK {
            let text = String::from_utf8_lossy(&body);
            error!(status = %status, body = %text.trim(), "Bridge request rejected");
            return Err(RpcError::Transport(format!(
                "HTTP error: {status}: {}",
                text.trim()
            )));
        }

        self.response = Some(body.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.response = None;
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}
