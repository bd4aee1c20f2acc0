//! Capabilities the engine consumes from the outside world: a byte
//! [`Transport`] and a monotonic [`Clock`].
//!
//! The engine never opens sockets or reads the system time itself.  A driver
//! (see the `pinwire-client` crate) creates a transport for each connection
//! attempt and hands ownership to
//! [`ConnectionEngine::connect`](crate::engine::ConnectionEngine::connect).
//!
//! [`memory`] holds in-process implementations of both traits for tests.

pub mod memory;

use thiserror::Error;

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// No transport is attached (the engine is disconnected).
    #[error("no transport attached")]
    NotAttached,

    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-blocking, bidirectional byte stream.
///
/// Implementations must never block waiting for data: `receive` returns
/// `Ok(0)` when nothing is available right now.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Writes all of `bytes` to the stream.
    ///
    /// # Errors
    ///
    /// Any error is treated as fatal for the connection.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads whatever is available into `buf`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] at end of stream, or another error
    /// if the stream failed.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Releases the underlying resource.  Called exactly once, before the
    /// engine resets its protocol state.
    fn close(&mut self);
}

/// Source of monotonic time in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}
