//! RPC client: one connection, one call in flight.
//!
//! Concurrent callers of the same [`Client`] queue on its connection lock and
//! run one full round trip at a time. A transport failure drops the
//! connection; the next call dials again. Calls are never retried.

use serde::de::value::{Error as ValueError, UnitDeserializer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::core::frame::{split_service_method, Frame};
use crate::core::header::MessageType;
use crate::core::serialization::SerializationFormat;
use crate::error::{Result, RpcError};
use crate::protocol::message::ResponseMessage;
use crate::transport::{new_transport, Connection, Transport};
use crate::utils::timeout::with_timeout_error;

/// Client bound to one server address
pub struct Client {
    addr: String,
    transport: Arc<dyn Transport>,
    format: SerializationFormat,
    call_timeout: Duration,
    enforce_call_timeout: bool,
    conn: Mutex<Option<Box<dyn Connection>>>,
}

impl Client {
    /// Build a client from configuration. Nothing is dialed until the first
    /// call or an explicit [`connect`](Self::connect).
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            addr: config.address.clone(),
            transport: new_transport(config.transport),
            format: config.serialization,
            call_timeout: config.call_timeout,
            enforce_call_timeout: config.enforce_call_timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn with_transport(
        addr: impl Into<String>,
        transport: Arc<dyn Transport>,
        format: SerializationFormat,
    ) -> Self {
        let defaults = ClientConfig::default();
        Self {
            addr: addr.into(),
            transport,
            format,
            call_timeout: defaults.call_timeout,
            enforce_call_timeout: false,
            conn: Mutex::new(None),
        }
    }

    /// Bound every round trip by `timeout`
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self.enforce_call_timeout = true;
        self
    }

    pub fn address(&self) -> &str {
        &self.addr
    }

    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    /// Dial the server unless a connection is already held
    pub async fn connect(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            *conn = Some(self.dial().await?);
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Call `"Service.Method"` with `args` and decode the result as `R`.
    ///
    /// An error reported by the remote side comes back as
    /// [`RpcError::Remote`] carrying its text unchanged.
    #[instrument(skip(self, args), fields(format = self.format.name()))]
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (service, method) = split_service_method(service_method)?;
        let payload = self.format.encode(args)?;
        let request = Frame::request(self.format, service, method, payload)?.to_bytes();

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
        }
        let conn = guard.as_mut().ok_or(RpcError::ConnectionClosed)?;

        let exchange = async {
            conn.write(&request).await?;
            conn.read().await
        };
        let outcome = if self.enforce_call_timeout {
            with_timeout_error(exchange, self.call_timeout).await
        } else {
            exchange.await
        };

        let response = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.is_transport() {
                    warn!(error = %e, "Dropping connection after failed round trip");
                    if let Some(mut stale) = guard.take() {
                        let _ = stale.close().await;
                    }
                }
                return Err(e);
            }
        };
        drop(guard);

        decode_reply(self.format, &response)
    }

    /// Like [`call`](Self::call) but writes the result into `reply`
    pub async fn call_into<A, R>(
        &self,
        service_method: &str,
        args: &A,
        reply: &mut R,
    ) -> Result<()>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        *reply = self.call(service_method, args).await?;
        Ok(())
    }

    /// Close the held connection, if any
    pub async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        if let Some(mut conn) = conn {
            conn.close().await?;
            debug!(address = %self.addr, "Client connection closed");
        }
        Ok(())
    }

    async fn dial(&self) -> Result<Box<dyn Connection>> {
        let conn = self.transport.dial(&self.addr).await?;
        debug!(address = %self.addr, "Client connected");
        Ok(conn)
    }
}

/// Decode a response frame into the caller's reply type
fn decode_reply<R: DeserializeOwned>(format: SerializationFormat, bytes: &[u8]) -> Result<R> {
    let frame = Frame::parse(bytes)?;
    if frame.header.kind() != Some(MessageType::Response) {
        return Err(RpcError::UnexpectedMessageType(frame.header.message_type));
    }

    let message: ResponseMessage<R> = format.decode(&frame.payload)?;
    match message.into_outcome() {
        Err(text) => Err(RpcError::Remote(text)),
        Ok(Some(reply)) => Ok(reply),
        // a unit-like reply may legitimately travel as an absent result
        Ok(None) => R::deserialize(UnitDeserializer::<ValueError>::new())
            .map_err(|_| RpcError::Decode("response carries no result".to_string())),
    }
}
