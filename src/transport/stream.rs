//! Stream transport over TCP.
//!
//! Each frame travels as `[len: u32 BE][frame]` through
//! [`LengthPrefixCodec`], so a read always yields one whole frame no matter
//! how TCP chunks the bytes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument};

use crate::core::codec::LengthPrefixCodec;
use crate::error::{Result, RpcError};
use crate::transport::{Connection, Transport};

/// TCP transport with length-prefixed framing
pub struct StreamTransport {
    listener: Mutex<Option<Arc<TcpListener>>>,
    shutdown: watch::Sender<bool>,
}

impl Default for StreamTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTransport {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            listener: Mutex::new(None),
            shutdown,
        }
    }

    fn current_listener(&self) -> Result<Arc<TcpListener>> {
        self.listener
            .lock()
            .map_err(|_| RpcError::Lock("stream listener"))?
            .clone()
            .ok_or(RpcError::NotListening)
    }
}

#[async_trait]
impl Transport for StreamTransport {
    #[instrument(skip(self))]
    async fn listen(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Stream transport listening");

        *self
            .listener
            .lock()
            .map_err(|_| RpcError::Lock("stream listener"))? = Some(Arc::new(listener));
        self.shutdown.send_replace(false);
        Ok(())
    }

    async fn accept(&self) -> Result<Box<dyn Connection>> {
        let mut shutdown = self.shutdown.subscribe();
        let closed = *shutdown.borrow();
        if closed {
            return Err(RpcError::TransportClosed);
        }
        let listener = self.current_listener()?;

        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                stream.set_nodelay(true)?;
                debug!(peer = %peer, "Accepted stream connection");
                Ok(Box::new(StreamConnection::new(stream, Some(peer))))
            }
            _ = shutdown.changed() => Err(RpcError::TransportClosed),
        }
    }

    #[instrument(skip(self))]
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        Ok(Box::new(StreamConnection::new(stream, peer)))
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.send_replace(true);
        let listener = self
            .listener
            .lock()
            .map_err(|_| RpcError::Lock("stream listener"))?
            .take();
        if listener.is_some() {
            info!("Stream transport closed");
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .ok()?
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }
}

/// One TCP connection
pub struct StreamConnection {
    framed: Framed<TcpStream, LengthPrefixCodec>,
    peer: Option<SocketAddr>,
}

impl StreamConnection {
    pub fn new(stream: TcpStream, peer: Option<SocketAddr>) -> Self {
        Self {
            framed: Framed::new(stream, LengthPrefixCodec),
            peer,
        }
    }
}

#[async_trait]
impl Connection for StreamConnection {
    async fn read(&mut self) -> Result<Vec<u8>> {
        let frame = self
            .framed
            .next()
            .await
            .ok_or(RpcError::ConnectionClosed)??;
        Ok(frame.to_vec())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.framed.send(Bytes::copy_from_slice(data)).await
    }

    async fn close(&mut self) -> Result<()> {
        SinkExt::<Bytes>::close(&mut self.framed).await
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}
