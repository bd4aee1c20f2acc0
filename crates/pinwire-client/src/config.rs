//! TOML configuration for the client binary.
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! host = "blynk.example.net"
//! port = 8080
//! connect_timeout_secs = 5
//! reconnect_interval_ms = 5000
//! tick_interval_ms = 100
//!
//! [engine]
//! auth_token = "your-device-token"
//! heartbeat_secs = 10
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = ...)]` helper, so a file only needs
//! the settings that differ from the defaults.  A missing file is not an
//! error: the defaults are used and the token is expected in the
//! `PINWIRE_AUTH_TOKEN` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pinwire_core::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable that overrides `engine.auth_token`.
pub const TOKEN_ENV_VAR: &str = "PINWIRE_AUTH_TOKEN";

/// Config file read when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "pinwire.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Neither the file nor the environment supplied a token.
    #[error("no auth token configured; set engine.auth_token or PINWIRE_AUTH_TOKEN")]
    MissingAuthToken,

    #[error("invalid engine.{field}: {reason}")]
    InvalidEngineSetting {
        field: &'static str,
        reason: &'static str,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Where the broker lives and how eagerly to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Minimum gap between two connection attempts.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// How often the engine is polled while connected.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_reconnect_interval_ms() -> u64 {
    5_000
}
fn default_tick_interval_ms() -> u64 {
    100
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl ServerConfig {
    /// `host:port`, as accepted by `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Poll period, never zero.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl ClientConfig {
    /// Replaces the file's token with `token` when one is given and non-empty.
    pub fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            debug!("auth token taken from {TOKEN_ENV_VAR}");
            self.engine.auth_token = token;
        }
    }

    /// Checks that the configuration can be used to connect.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingAuthToken`] if the token is empty, and
    /// [`ConfigError::InvalidEngineSetting`] for a zero heartbeat or buffer
    /// size, or a client-info field containing the wire separator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.auth_token.trim().is_empty() {
            return Err(ConfigError::MissingAuthToken);
        }
        if engine.heartbeat_secs == 0 {
            return Err(invalid("heartbeat_secs", "must be at least 1"));
        }
        if engine.receive_buffer_capacity == 0 {
            return Err(invalid("receive_buffer_capacity", "must be at least 1"));
        }
        if engine.device_tag.contains('\0') {
            return Err(invalid("device_tag", "must not contain NUL"));
        }
        if engine.protocol_version.contains('\0') {
            return Err(invalid("protocol_version", "must not contain NUL"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidEngineSetting { field, reason }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `ClientConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: ClientConfig = toml::from_str(&content)?;
            debug!(path = %path.display(), "loaded config");
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no config file; using defaults");
            Ok(ClientConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pinwire-config-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_default_server_settings() {
        let cfg = ClientConfig::default();

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(cfg.server.tick_interval(), Duration::from_millis(100));
        assert_eq!(cfg.engine.heartbeat_secs, 10);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        // Arrange
        let text = r#"
            [server]
            host = "broker.local"

            [engine]
            auth_token = "abc"
        "#;

        // Act
        let cfg: ClientConfig = toml::from_str(text).expect("parse");

        // Assert
        assert_eq!(cfg.server.address(), "broker.local:8080");
        assert_eq!(cfg.engine.auth_token, "abc");
        assert_eq!(cfg.engine.receive_buffer_capacity, 1024);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = load_config(&temp_path("does-not-exist.toml")).expect("load");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = temp_path("round-trip.toml");
        let mut cfg = ClientConfig::default();
        cfg.server.port = 9443;
        cfg.engine.auth_token = "device".into();
        cfg.engine.max_body_len = Some(4096);

        // Act
        save_config(&path, &cfg).expect("save");
        let restored = load_config(&path).expect("load");

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let path = temp_path("broken.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_token_override_replaces_file_token() {
        let mut cfg = ClientConfig::default();
        cfg.engine.auth_token = "from-file".into();

        cfg.apply_token_override(Some("from-env".into()));

        assert_eq!(cfg.engine.auth_token, "from-env");
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let mut cfg = ClientConfig::default();
        cfg.engine.auth_token = "from-file".into();

        cfg.apply_token_override(Some("  ".into()));
        cfg.apply_token_override(None);

        assert_eq!(cfg.engine.auth_token, "from-file");
    }

    #[test]
    fn test_validate_requires_token() {
        assert!(matches!(
            ClientConfig::default().validate(),
            Err(ConfigError::MissingAuthToken)
        ));
    }

    fn with_token() -> ClientConfig {
        let mut cfg = ClientConfig::default();
        cfg.engine.auth_token = "device".into();
        cfg
    }

    #[test]
    fn test_validate_accepts_defaults_with_token() {
        assert!(with_token().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_heartbeat() {
        let mut cfg = with_token();
        cfg.engine.heartbeat_secs = 0;

        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidEngineSetting { field: "heartbeat_secs", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_receive_buffer() {
        let mut cfg = with_token();
        cfg.engine.receive_buffer_capacity = 0;

        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidEngineSetting { field: "receive_buffer_capacity", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_separator_in_client_info() {
        // Arrange
        let mut tagged = with_token();
        tagged.engine.device_tag = "r\0s".into();
        let mut versioned = with_token();
        versioned.engine.protocol_version = "0.4\0".into();

        // Act / Assert
        assert!(matches!(
            tagged.validate(),
            Err(ConfigError::InvalidEngineSetting { field: "device_tag", .. })
        ));
        let err = versioned.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid engine.protocol_version: must not contain NUL");
    }
}
