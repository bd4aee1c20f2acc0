//! Connection lifecycle states.

use std::fmt;

/// Where the engine is in the connect/login lifecycle.
///
/// ```text
///               connect()              login OK
/// Disconnected ───────────> Connecting ──────────> Connected
///      ^                        │                      │
///      └────────────────────────┴──────────────────────┘
///       disconnect(), login refused, heartbeat timeout,
///       transport failure, malformed header
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Login sent, waiting for the broker's response.
    Connecting,
    /// Logged in; application traffic flows.
    Connected,
}

impl ConnectionState {
    /// Returns `true` while a transport is attached.
    pub fn is_active(self) -> bool {
        self != ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}
