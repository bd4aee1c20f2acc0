//! # pinwire-core
//!
//! Protocol engine for the pinwire virtual-pin messaging protocol.
//!
//! A device logs in to a broker with an auth token, keeps the connection
//! alive with heartbeats, and exchanges small text messages addressed to
//! virtual pins.  This crate holds everything that does not touch a socket.
//!
//! # Architecture overview (for beginners)
//!
//! - **`protocol`** – The wire format.  Every message is a 5-byte header
//!   (command, message id, body length) followed by NUL-separated UTF-8
//!   fields.  `FrameCodec` turns bytes into `Message`s and back.
//!
//! - **`engine`** – `ConnectionEngine`, a synchronous state machine.  It owns
//!   a `Transport`, performs the login handshake, enforces the heartbeat and
//!   turns inbound messages into events.
//!
//! - **`events`** – The handler registry.  Handlers are keyed by strings such
//!   as `"V3"` or `"connected"`; a failing or panicking handler is contained
//!   and never takes the engine down with it.
//!
//! - **`transport`** – The `Transport` and `Clock` seams, plus in-memory
//!   implementations for tests.  Real sockets live in `pinwire-client`.
//!
//! The engine never blocks and never spawns: the caller decides when to
//! poll, which keeps it usable from a bare loop or an async runtime alike.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod protocol;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{ConnectionEngine, ConnectionState};
pub use error::{AuthError, EngineError, Result};
pub use events::{EmitOutcome, Event, EventDispatcher, HandlerError, HandlerResult, Outbox, Request};
pub use protocol::{decode_message, encode_message, Command, FrameCodec, Message, ProtocolError, Status};
pub use transport::{Clock, Transport, TransportError};
