//! Connection lifecycle: the state machine and the engine that drives it.

pub mod connection;
pub mod state;

pub use connection::ConnectionEngine;
pub use state::ConnectionState;
