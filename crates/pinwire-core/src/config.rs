//! Engine configuration.
//!
//! `EngineConfig` derives serde so the client crate can embed it as the
//! `[engine]` table of its TOML file:
//!
//! ```toml
//! [engine]
//! auth_token = "your-device-token"
//! heartbeat_secs = 10
//! receive_buffer_capacity = 1024
//! device_tag = "rs"
//! ```
//!
//! Fields missing from the file fall back to the `default_*` helpers below.

use serde::{Deserialize, Serialize};

use crate::heartbeat::HeartbeatPolicy;
use crate::protocol::MAX_BODY_LEN;

/// Parameters for one [`ConnectionEngine`](crate::engine::ConnectionEngine).
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Device auth token sent in the login message.
    #[serde(default)]
    pub auth_token: String,
    /// Heartbeat interval advertised to the broker, in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u32,
    /// Size of a single read from the transport, advertised as `buff-in`.
    #[serde(default = "default_receive_buffer_capacity")]
    pub receive_buffer_capacity: usize,
    /// Short device tag advertised as `dev` (e.g. `"rs"`).
    #[serde(default = "default_device_tag")]
    pub device_tag: String,
    /// Library version advertised as `ver`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Largest inbound body accepted before the stream is declared corrupt.
    /// Defaults to twice `receive_buffer_capacity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_len: Option<usize>,
}

fn default_heartbeat_secs() -> u32 {
    10
}
fn default_receive_buffer_capacity() -> usize {
    1024
}
fn default_device_tag() -> String {
    "rs".to_string()
}
fn default_protocol_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl EngineConfig {
    /// Default configuration with the given auth token.
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat(&self) -> HeartbeatPolicy {
        HeartbeatPolicy::from_secs(self.heartbeat_secs)
    }

    /// Effective inbound body cap, never above what the length field allows.
    pub fn body_limit(&self) -> usize {
        self.max_body_len
            .unwrap_or_else(|| self.receive_buffer_capacity.saturating_mul(2))
            .min(MAX_BODY_LEN)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            heartbeat_secs: default_heartbeat_secs(),
            receive_buffer_capacity: default_receive_buffer_capacity(),
            device_tag: default_device_tag(),
            protocol_version: default_protocol_version(),
            max_body_len: None,
        }
    }
}

// The token is a credential; keep it out of logs.
impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("auth_token", &"<redacted>")
            .field("heartbeat_secs", &self.heartbeat_secs)
            .field("receive_buffer_capacity", &self.receive_buffer_capacity)
            .field("device_tag", &self.device_tag)
            .field("protocol_version", &self.protocol_version)
            .field("max_body_len", &self.max_body_len)
            .finish()
    }
}
