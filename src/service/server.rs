//! RPC server: accept loop plus one worker task per connection.
//!
//! A worker answers the frames of its connection strictly in order. Every
//! request that arrives as readable bytes gets a well-formed Response frame,
//! whether the failure was a malformed frame, an unknown service, an argument
//! that did not decode, an error from the handler itself, or a reply too large
//! for the transport to carry. Only a transport failure on read or write
//! ends the worker, and it never affects other connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::frame::Frame;
use crate::core::header::{Header, MessageType};
use crate::core::serialization::SerializationFormat;
use crate::error::{Result, RpcError};
use crate::protocol::dispatcher::{RpcService, ServiceRegistry};
use crate::protocol::message::ResponseMessage;
use crate::transport::{
    new_transport, BridgeTransport, Connection, DebugSource, Transport, TransportKind,
};
use crate::utils::metrics::Metrics;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// An RPC server bound to one transport
pub struct Server {
    transport: Arc<dyn Transport>,
    handler: ConnectionHandler,
}

impl Server {
    /// Build a server from configuration. Nothing is bound until
    /// [`listen`](Self::listen) or [`serve`](Self::serve).
    pub fn new(config: &ServerConfig) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let metrics = Arc::new(Metrics::new());

        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Bridge => Arc::new(
                BridgeTransport::with_mailbox_capacity(config.bridge_mailbox_capacity)
                    .with_debug_source(Arc::new(ServerDebugSource {
                        registry: Arc::clone(&registry),
                        metrics: Arc::clone(&metrics),
                    })),
            ),
            kind => new_transport(kind),
        };

        Self {
            transport,
            handler: ConnectionHandler {
                registry,
                metrics,
                format: config.serialization,
                honor_serialize_tag: config.honor_serialize_tag,
            },
        }
    }

    /// Build a server over an already constructed transport
    pub fn with_transport(transport: Arc<dyn Transport>, format: SerializationFormat) -> Self {
        Self {
            transport,
            handler: ConnectionHandler {
                registry: Arc::new(ServiceRegistry::new()),
                metrics: Arc::new(Metrics::new()),
                format,
                honor_serialize_tag: false,
            },
        }
    }

    /// Select each request's decoder from its header serialize tag
    pub fn honor_serialize_tag(mut self, enabled: bool) -> Self {
        self.handler.honor_serialize_tag = enabled;
        self
    }

    /// Register a handler under its service name
    pub fn register<S: RpcService>(&self, handler: S) -> Result<()> {
        self.handler.registry.register(handler)
    }

    /// Bind the transport. Returns the bound address when the transport
    /// reports one, so `"127.0.0.1:0"` can be used in tests.
    #[instrument(skip(self))]
    pub async fn listen(&self, addr: &str) -> Result<Option<SocketAddr>> {
        self.transport.listen(addr).await?;
        let local = self.transport.local_addr();
        info!(
            address = ?local,
            format = self.handler.format.name(),
            services = self.handler.registry.len(),
            "RPC server listening"
        );
        Ok(local)
    }

    /// Accept connections until the transport is closed
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let handler = self.handler.clone();
                    tokio::spawn(handler.serve_connection(conn));
                }
                Err(RpcError::TransportClosed) => {
                    info!("RPC server stopped accepting");
                    self.handler.metrics.log_summary();
                    return Ok(());
                }
                Err(RpcError::NotListening) => return Err(RpcError::NotListening),
                Err(e) if e.is_transport() => {
                    warn!(error = %e, "Accept failed");
                    self.handler.metrics.transport_error();
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(error = %e, "Accept loop aborted");
                    return Err(e);
                }
            }
        }
    }

    /// Listen on `addr` and run the accept loop
    pub async fn serve(&self, addr: &str) -> Result<()> {
        self.listen(addr).await?;
        self.run().await
    }

    /// Stop accepting. Connections already being served finish on their own.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.handler.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.handler.metrics
    }

    pub fn format(&self) -> SerializationFormat {
        self.handler.format
    }
}

/// State shared by every connection worker
#[derive(Clone)]
struct ConnectionHandler {
    registry: Arc<ServiceRegistry>,
    metrics: Arc<Metrics>,
    format: SerializationFormat,
    honor_serialize_tag: bool,
}

impl ConnectionHandler {
    async fn serve_connection(self, mut conn: Box<dyn Connection>) {
        let peer = conn.peer_addr();
        self.metrics.connection_opened();
        debug!(peer = ?peer, "Serving connection");

        loop {
            let request = match conn.read().await {
                Ok(bytes) => bytes,
                Err(RpcError::ConnectionClosed) => break,
                Err(e) => {
                    self.metrics.transport_error();
                    debug!(peer = ?peer, error = %e, "Read failed, dropping connection");
                    break;
                }
            };
            self.metrics.request_received(request.len() as u64);

            let response = self.handle_frame(&request);

            let sent = match conn.write(&response).await {
                // the reply exceeds what this transport can carry; answer with the error instead
                Err(e) if !e.is_transport() => {
                    warn!(
                        peer = ?peer,
                        error = %e,
                        bytes = response.len(),
                        "Response rejected by transport"
                    );
                    let fallback = self.failure(response_format(&response, self.format), &e);
                    conn.write(&fallback).await.map(|()| fallback.len())
                }
                outcome => outcome.map(|()| response.len()),
            };

            match sent {
                Ok(bytes) => self.metrics.response_sent(bytes as u64),
                Err(e) => {
                    self.metrics.transport_error();
                    debug!(peer = ?peer, error = %e, "Write failed, dropping connection");
                    break;
                }
            }
        }

        if let Err(e) = conn.close().await {
            debug!(peer = ?peer, error = %e, "Close failed");
        }
        self.metrics.connection_closed();
    }

    /// Turn one request frame into the bytes of its response frame
    fn handle_frame(&self, data: &[u8]) -> Vec<u8> {
        let frame = match Frame::parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.protocol_error();
                warn!(error = %e, bytes = data.len(), "Malformed request frame");
                return self.failure(self.format, &e);
            }
        };

        if frame.header.kind() != Some(MessageType::Request) {
            self.metrics.protocol_error();
            let err = RpcError::UnexpectedMessageType(frame.header.message_type);
            return self.failure(self.format, &err);
        }

        let format = if self.honor_serialize_tag {
            match SerializationFormat::from_tag(frame.header.serialize_type) {
                Some(format) => format,
                None => {
                    let err = RpcError::UnknownSerializeTag(frame.header.serialize_type);
                    return self.failure(self.format, &err);
                }
            }
        } else {
            self.format
        };

        match self
            .registry
            .dispatch(&frame.service, &frame.method, &frame.payload, format)
        {
            Ok(payload) => match Frame::response(format.tag(), payload) {
                Ok(response) => response.to_bytes(),
                Err(e) => self.failure(format, &e),
            },
            Err(e) => {
                debug!(service = %frame.service, method = %frame.method, error = %e, "Call failed");
                self.failure(format, &e)
            }
        }
    }

    /// Response frame carrying `err` as the call's error text
    fn failure(&self, format: SerializationFormat, err: &RpcError) -> Vec<u8> {
        self.metrics.request_failed();
        let payload = format
            .encode(&ResponseMessage::failure(err.to_string()))
            .unwrap_or_default();
        let payload_len = payload.len() as u32;
        let mut out = Header::response(format.tag(), payload_len)
            .encode()
            .to_vec();
        out.extend_from_slice(&payload);
        out
    }
}

/// Serialization format named in an encoded response's header
fn response_format(response: &[u8], fallback: SerializationFormat) -> SerializationFormat {
    Header::decode(response)
        .ok()
        .and_then(|header| SerializationFormat::from_tag(header.serialize_type))
        .unwrap_or(fallback)
}

/// Feeds the bridge debug endpoints from a server's own state
struct ServerDebugSource {
    registry: Arc<ServiceRegistry>,
    metrics: Arc<Metrics>,
}

impl DebugSource for ServerDebugSource {
    fn stats(&self) -> String {
        self.metrics.snapshot().to_json()
    }

    fn services(&self) -> Vec<String> {
        self.registry
            .service_names()
            .into_iter()
            .map(|name| {
                let methods = self
                    .registry
                    .methods_of(&name)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|m| m.name)
                    .collect::<Vec<_>>();
                format!("{name}: {}", methods.join(", "))
            })
            .collect()
    }
}
