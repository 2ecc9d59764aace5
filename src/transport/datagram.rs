//! Datagram transport over UDP.
//!
//! Every datagram carries exactly one `[len u32 BE][frame]` envelope. The
//! listening socket is shared: `accept()` receives the next datagram and
//! hands it out as a connection bound to its sender, so the socket has a
//! single reader no matter how many peers are active. Server-side
//! connections answer once; the next request from the same peer arrives
//! through `accept()` again.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace};

use crate::config::MAX_DATAGRAM_SIZE;
use crate::core::codec::{decode_datagram, encode_datagram};
use crate::error::{Result, RpcError};
use crate::transport::{Connection, Transport};

const RECV_BUFFER_SIZE: usize = 65_536;

/// UDP transport
pub struct DatagramTransport {
    socket: Mutex<Option<Arc<UdpSocket>>>,
    shutdown: watch::Sender<bool>,
}

impl Default for DatagramTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DatagramTransport {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            socket: Mutex::new(None),
            shutdown,
        }
    }

    fn current_socket(&self) -> Result<Arc<UdpSocket>> {
        self.socket
            .lock()
            .map_err(|_| RpcError::Lock("datagram socket"))?
            .clone()
            .ok_or(RpcError::NotListening)
    }
}

#[async_trait]
impl Transport for DatagramTransport {
    #[instrument(skip(self))]
    async fn listen(&self, addr: &str) -> Result<()> {
        let socket = UdpSocket::bind(addr).await?;
        info!(address = %socket.local_addr()?, "Datagram transport listening");

        *self
            .socket
            .lock()
            .map_err(|_| RpcError::Lock("datagram socket"))? = Some(Arc::new(socket));
        self.shutdown.send_replace(false);
        Ok(())
    }

    async fn accept(&self) -> Result<Box<dyn Connection>> {
        let mut shutdown = self.shutdown.subscribe();
        let closed = *shutdown.borrow();
        if closed {
            return Err(RpcError::TransportClosed);
        }
        let socket = self.current_socket()?;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (n, peer) = received?;
                buf.truncate(n);
                trace!(peer = %peer, bytes = n, "Received datagram");
                Ok(Box::new(DatagramConnection::accepted(socket, peer, buf)))
            }
            _ = shutdown.changed() => Err(RpcError::TransportClosed),
        }
    }

    #[instrument(skip(self))]
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>> {
        let peer = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to resolve {addr}: {e}")))?
            .next()
            .ok_or_else(|| RpcError::Transport(format!("No address found for {addr}")))?;

        let bind_addr = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket
            .connect(peer)
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to connect to {addr}: {e}")))?;
        debug!(peer = %peer, local = ?socket.local_addr().ok(), "Datagram socket connected");

        Ok(Box::new(DatagramConnection::dialed(Arc::new(socket), peer)))
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.send_replace(true);
        let socket = self
            .socket
            .lock()
            .map_err(|_| RpcError::Lock("datagram socket"))?
            .take();
        if socket.is_some() {
            info!("Datagram transport closed");
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket
            .lock()
            .ok()?
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }
}

/// One peer of a UDP socket
pub struct DatagramConnection {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    /// Set on the accepting side: the datagram `accept()` received
    pending: Option<Vec<u8>>,
    accepted: bool,
}

impl DatagramConnection {
    fn accepted(socket: Arc<UdpSocket>, peer: SocketAddr, datagram: Vec<u8>) -> Self {
        Self {
            socket,
            peer,
            pending: Some(datagram),
            accepted: true,
        }
    }

    fn dialed(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            pending: None,
            accepted: false,
        }
    }
}

#[async_trait]
impl Connection for DatagramConnection {
    async fn read(&mut self) -> Result<Vec<u8>> {
        let datagram = if self.accepted {
            self.pending.take().ok_or(RpcError::ConnectionClosed)?
        } else {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            let n = self.socket.recv(&mut buf).await?;
            buf.truncate(n);
            buf
        };
        Ok(decode_datagram(&datagram)?.to_vec())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let datagram = encode_datagram(data);
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(RpcError::FrameTooLarge(datagram.len()));
        }

        if self.accepted {
            self.socket.send_to(&datagram, self.peer).await?;
        } else {
            self.socket.send(&datagram).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_reply_roundtrip() {
        let server = Arc::new(DatagramTransport::new());
        server.listen("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let acceptor = Arc::clone(&server);
        tokio::spawn(async move {
            let mut conn = acceptor.accept().await.unwrap();
            let frame = conn.read().await.unwrap();
            assert!(matches!(conn.read().await, Err(RpcError::ConnectionClosed)));
            conn.write(&[frame.as_slice(), b"!"].concat()).await.unwrap();
        });

        let mut client = DatagramTransport::new().dial(&addr.to_string()).await.unwrap();
        client.write(b"ping").await.unwrap();
        assert_eq!(client.read().await.unwrap(), b"ping!".to_vec());
    }

    #[tokio::test]
    async fn oversized_frame_rejected_on_write() {
        let server = DatagramTransport::new();
        server.listen("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = DatagramTransport::new().dial(&addr.to_string()).await.unwrap();
        let err = client.write(&vec![0u8; MAX_DATAGRAM_SIZE]).await.unwrap_err();
        assert!(matches!(err, RpcError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn truncated_envelope_is_reported() {
        let server = DatagramTransport::new();
        server.listen("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // declares 10 bytes, carries 2
        raw.send_to(&[0, 0, 0, 10, 1, 2], addr).await.unwrap();

        let mut conn = server.accept().await.unwrap();
        let err = conn.read().await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::IncompleteDatagram {
                declared: 10,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn accept_after_close_fails() {
        let server = DatagramTransport::new();
        assert!(matches!(server.accept().await, Err(RpcError::NotListening)));
        server.listen("127.0.0.1:0").await.unwrap();
        server.close().await.unwrap();
        assert!(matches!(
            server.accept().await,
            Err(RpcError::TransportClosed)
        ));
    }
}
