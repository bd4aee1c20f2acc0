//! pinwire-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does pinwire-client add? (for beginners)
//!
//! `pinwire-core` knows the protocol but owns no socket and no timer.  This
//! crate supplies both:
//!
//! 1. `transport` opens a TCP connection and adapts it to the engine's
//!    non-blocking `Transport` trait.
//! 2. `clock` gives the engine monotonic milliseconds.
//! 3. `runner` reconnects when the link drops and polls the engine on a
//!    fixed tick.
//! 4. `config` loads all of the above from a TOML file.

pub mod clock;
pub mod config;
pub mod runner;
pub mod transport;

pub use clock::SystemClock;
pub use config::{load_config, save_config, ClientConfig, ConfigError, ServerConfig};
pub use runner::{RunError, Runner};
pub use transport::{Connector, TcpConnector, TcpTransport};
