//! TCP transport for the engine.
//!
//! # Why a std stream inside an async client? (for beginners)
//!
//! [`ConnectionEngine`](pinwire_core::ConnectionEngine) is synchronous: it
//! calls `send`/`receive` and expects them to return immediately.  We use
//! tokio to *establish* the connection (so the connect timeout does not tie
//! up a thread), then convert the socket into a non-blocking
//! `std::net::TcpStream` that the engine can drive with plain calls.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use async_trait::async_trait;
use pinwire_core::{Transport, TransportError};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// A connected, non-blocking TCP stream.
///
/// Neither direction ever waits.  A send that finds the socket buffer full
/// fails with [`ErrorKind::WouldBlock`]; the engine treats that like any other
/// write failure and disconnects, since a broker that stopped reading is as
/// good as gone.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connects to `addr` within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if resolution or connection fails or
    /// the timeout elapses.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, TransportError> {
        let stream = match time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("connect to {addr} timed out after {timeout:?}"),
                )
                .into())
            }
        };
        stream.set_nodelay(true)?;
        let stream = stream.into_std()?;
        let transport = Self::from_std(stream)?;
        info!(peer = %transport.peer, "tcp connected");
        Ok(transport)
    }

    /// Wraps an already-connected stream, switching it to non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the socket options cannot be set.
    pub fn from_std(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    warn!(peer = %self.peer, written, total = bytes.len(), "socket send buffer full");
                    return Err(io::Error::new(
                        ErrorKind::WouldBlock,
                        "socket send buffer full",
                    )
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // NotConnected just means the peer got there first.
            if e.kind() != ErrorKind::NotConnected {
                warn!(peer = %self.peer, "tcp shutdown failed: {e}");
            }
        }
        debug!(peer = %self.peer, "tcp closed");
    }
}

/// Opens a fresh transport for each connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}

/// Connects to the configured broker over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            address: server.address(),
            timeout: server.connect_timeout(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let transport = TcpTransport::connect(&self.address, self.timeout).await?;
        Ok(Box::new(transport))
    }
}
