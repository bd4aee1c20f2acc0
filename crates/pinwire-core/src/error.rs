//! Engine-level error types.

use thiserror::Error;

use crate::protocol::{EncodeError, ProtocolError, Status};
use crate::transport::TransportError;

/// The broker refused the login.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The token is wrong.  Retrying is pointless until a new token is set.
    #[error("invalid auth token")]
    InvalidToken,

    #[error("login rejected with status {0}")]
    Rejected(u16),
}

impl AuthError {
    /// Maps a non-success login status to an error.
    pub fn from_status(status: Status) -> Self {
        match status {
            Status::InvalidToken => AuthError::InvalidToken,
            other => AuthError::Rejected(other.into()),
        }
    }
}

/// Errors returned by [`ConnectionEngine`](crate::engine::ConnectionEngine)
/// operations.
///
/// Every variant except [`EngineError::Encode`] and
/// [`EngineError::NotConnected`] means the engine has already disconnected.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not connected")]
    NotConnected,

    #[error("already connecting or connected")]
    AlreadyActive,

    #[error("no heartbeat for {silent_ms} ms")]
    HeartbeatTimeout { silent_ms: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl EngineError {
    /// Returns `true` if reconnecting cannot succeed without reconfiguration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Auth(AuthError::InvalidToken))
    }
}

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
