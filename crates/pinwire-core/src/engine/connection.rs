//! The connection engine: login handshake, heartbeat, inbound dispatch and
//! outbound sends over one owned [`Transport`].
//!
//! # Driving the engine (for beginners)
//!
//! The engine never blocks and never spawns threads.  A driver calls it in a
//! loop at whatever cadence suits the device:
//!
//! ```ignore
//! let mut engine = ConnectionEngine::new(EngineConfig::new(token), SystemClock::new());
//! engine.on("V1", |event, _| { println!("{event:?}"); Ok(()) });
//!
//! loop {
//!     if !engine.state().is_active() {
//!         engine.connect(Box::new(open_transport()?))?;
//!     }
//!     engine.poll()?;            // timers, then whatever bytes are ready
//!     sleep(Duration::from_millis(100));
//! }
//! ```
//!
//! `poll` reads from the owned transport.  A driver that does its own I/O
//! can call [`ConnectionEngine::process`] with the bytes instead.

use std::fmt::Display;

use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::state::ConnectionState;
use crate::error::{AuthError, EngineError, Result};
use crate::events::{Event, EventDispatcher, HandlerResult, Outbox, Request};
use crate::heartbeat::{HeartbeatPolicy, Timers};
use crate::protocol::{
    Command, Decoded, FrameCodec, Message, MessageIdCounter, Payload, Status, LOGIN_MESSAGE_ID,
};
use crate::transport::{Clock, Transport, TransportError};

/// Protocol state for one logical connection to the broker.
///
/// Handlers registered on the engine survive reconnects; the receive buffer,
/// timers and message-id counter do not.
pub struct ConnectionEngine {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    heartbeat: HeartbeatPolicy,
    codec: FrameCodec,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    ids: MessageIdCounter,
    timers: Timers,
    /// Bytes received but not yet decoded.
    buffer: Vec<u8>,
    /// Landing area for a single transport read.
    scratch: Vec<u8>,
    dispatcher: EventDispatcher,
    outbox: Outbox,
    /// Set when the broker reported an invalid token; cleared by
    /// [`set_auth_token`](Self::set_auth_token).
    token_rejected: bool,
}

impl ConnectionEngine {
    pub fn new(config: EngineConfig, clock: impl Clock + 'static) -> Self {
        let capacity = config.receive_buffer_capacity.max(1);
        Self {
            heartbeat: config.heartbeat(),
            codec: FrameCodec::new(config.body_limit()),
            clock: Box::new(clock),
            state: ConnectionState::Disconnected,
            transport: None,
            ids: MessageIdCounter::new(),
            timers: Timers::default(),
            buffer: Vec::with_capacity(capacity),
            scratch: vec![0; capacity],
            dispatcher: EventDispatcher::new(),
            outbox: Outbox::new(),
            token_rejected: false,
            config,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn timers(&self) -> Timers {
        self.timers
    }

    /// Number of received bytes waiting for the rest of their message.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` after the broker rejected the token as invalid.
    pub fn token_rejected(&self) -> bool {
        self.token_rejected
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    /// Registers `handler` under `key`; see [`EventDispatcher::register`].
    pub fn on<F>(&mut self, key: impl Into<String>, handler: F) -> &mut Self
    where
        F: FnMut(&Event, &mut Outbox) -> HandlerResult + Send + 'static,
    {
        self.dispatcher.register(key, handler);
        self
    }

    /// Replaces the auth token and clears a previous invalid-token rejection.
    /// Takes effect on the next [`connect`](Self::connect).
    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.config.auth_token = token.into();
        self.token_rejected = false;
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Takes ownership of `transport` and sends the login message.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AlreadyActive`] unless disconnected.
    /// - [`AuthError::InvalidToken`] while a token rejection is latched.
    /// - [`EngineError::Transport`] if the login cannot be written; the
    ///   engine is disconnected again.
    ///
    /// In the first two cases `transport` is closed unused.
    pub fn connect(&mut self, mut transport: Box<dyn Transport>) -> Result<()> {
        if self.state.is_active() {
            warn!(state = %self.state, "connect called while active");
            transport.close();
            return Err(EngineError::AlreadyActive);
        }
        if self.token_rejected {
            warn!("refusing to connect with a token the broker rejected");
            transport.close();
            return Err(AuthError::InvalidToken.into());
        }

        let now = self.clock.now_ms();
        self.state = ConnectionState::Connecting;
        self.transport = Some(transport);
        self.ids.reset();
        self.timers = Timers::starting_at(now);
        self.buffer.clear();
        info!("connecting");

        let id = self.ids.next_id();
        debug_assert_eq!(id, LOGIN_MESSAGE_ID);
        self.send_message(&Message::login(id, self.config.auth_token.clone()))
    }

    /// Closes the transport and resets protocol state.
    ///
    /// Idempotent: `disconnected` is emitted only when the engine was active.
    pub fn disconnect(&mut self) {
        if !self.state.is_active() {
            return;
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        self.buffer.clear();
        self.timers = Timers::default();
        self.outbox.take();
        info!(from = %previous, "disconnected");

        self.dispatcher
            .dispatch(&Event::Disconnected, &mut self.outbox);
        let dropped = self.outbox.take();
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "dropping requests queued while disconnected");
        }
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// One tick: heartbeat checks, then a single read from the transport.
    ///
    /// Does nothing while disconnected.
    ///
    /// # Errors
    ///
    /// Any error means the engine has disconnected; see [`process`](Self::process).
    pub fn poll(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Ok(());
        }
        let now = self.clock.now_ms();
        self.check_heartbeat(now)?;

        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };
        let received = match transport.receive(&mut self.scratch) {
            Ok(n) => n,
            Err(e) => {
                warn!("receive failed: {e}");
                self.disconnect();
                return Err(e.into());
            }
        };
        if received == 0 {
            return Ok(());
        }
        self.buffer.extend_from_slice(&self.scratch[..received]);
        self.drain_buffer(now, true)
    }

    /// Runs heartbeat checks, appends `data` (if any) to the receive buffer
    /// and handles every complete message in it.
    ///
    /// Does nothing while disconnected.
    ///
    /// # Errors
    ///
    /// Heartbeat timeout, malformed header, refused login or a failed write
    /// disconnect the engine and are returned.  An incomplete message is not
    /// an error; its bytes stay buffered for the next call.
    pub fn process(&mut self, data: Option<&[u8]>) -> Result<()> {
        if !self.state.is_active() {
            return Ok(());
        }
        let now = self.clock.now_ms();
        self.check_heartbeat(now)?;

        let received = data.is_some_and(|d| !d.is_empty());
        if let Some(data) = data {
            self.buffer.extend_from_slice(data);
        }
        self.drain_buffer(now, received)
    }

    fn check_heartbeat(&mut self, now: u64) -> Result<()> {
        if self.heartbeat.is_timed_out(&self.timers, now) {
            let silent_ms = now.saturating_sub(self.timers.last_recv);
            warn!(silent_ms, "heartbeat timeout");
            self.disconnect();
            return Err(EngineError::HeartbeatTimeout { silent_ms });
        }

        if self.is_connected() && self.heartbeat.should_ping(&self.timers, now) {
            self.send(Command::Ping, Vec::new())?;
            self.timers.last_ping = now;
        }
        Ok(())
    }

    /// Handles every complete message in the buffer.  `received` says whether
    /// this call appended bytes; a stalled partial frame must not keep the
    /// heartbeat alive.
    fn drain_buffer(&mut self, now: u64, received: bool) -> Result<()> {
        while self.state.is_active() {
            match self.codec.decode(&self.buffer) {
                Ok(Decoded::Complete { message, consumed }) => {
                    self.timers.last_recv = now;
                    self.buffer.drain(..consumed);
                    self.handle_message(message, now)?;
                }
                Ok(Decoded::Incomplete { header }) => {
                    if received && header.is_some() {
                        self.timers.last_recv = now;
                    }
                    return Ok(());
                }
                Err(e) => {
                    error!("malformed header: {e}");
                    self.disconnect();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn handle_message(&mut self, message: Message, now: u64) -> Result<()> {
        debug!(command = ?message.command, id = message.id, fields = ?message.fields(), "received");
        let Message {
            command,
            id,
            payload,
        } = message;

        match (command, payload) {
            (Command::Response, Payload::Status(status)) => self.handle_response(id, status, now),
            (Command::Ping, _) => self.send_message(&Message::response(id, Status::Success)),
            (Command::Hardware | Command::Bridge, Payload::Fields(fields)) if self.is_connected() => {
                self.handle_hardware(fields)
            }
            (Command::Internal, Payload::Fields(fields)) if self.is_connected() => {
                self.handle_internal(fields)
            }
            (Command::Hardware | Command::Bridge | Command::Internal, _) => {
                warn!(?command, state = %self.state, "ignoring message received before login");
                Ok(())
            }
            (
                Command::Response
                | Command::Login
                | Command::HardwareLogin
                | Command::Tweet
                | Command::Email
                | Command::Notify
                | Command::HardwareSync
                | Command::Property
                | Command::Redirect
                | Command::DebugPrint
                | Command::EventLog
                | Command::Other(_),
                _,
            ) => {
                warn!(?command, id, "ignoring unexpected command");
                Ok(())
            }
        }
    }

    fn handle_response(&mut self, id: u16, status: Status, now: u64) -> Result<()> {
        if self.state != ConnectionState::Connecting || id != LOGIN_MESSAGE_ID {
            debug!(id, ?status, "response");
            return Ok(());
        }

        if !status.is_success() {
            let err = AuthError::from_status(status);
            if err == AuthError::InvalidToken {
                self.token_rejected = true;
                error!("broker rejected the auth token; set a new token before reconnecting");
            } else {
                warn!("login failed: {err}");
            }
            self.disconnect();
            return Err(err.into());
        }

        self.state = ConnectionState::Connected;
        let ping_ms = now.saturating_sub(self.timers.last_send);
        let client_info = vec![
            "ver".to_string(),
            self.config.protocol_version.clone(),
            "h-beat".to_string(),
            self.config.heartbeat_secs.to_string(),
            "buff-in".to_string(),
            self.config.receive_buffer_capacity.to_string(),
            "dev".to_string(),
            self.config.device_tag.clone(),
        ];
        match self.send(Command::Internal, client_info) {
            Ok(()) | Err(EngineError::Encode(_)) => {}
            Err(e) => return Err(e),
        }
        info!(ping_ms, "connected");
        self.dispatch(Event::Connected { ping_ms })
    }

    fn handle_hardware(&mut self, mut fields: Vec<String>) -> Result<()> {
        if fields.len() < 2 {
            warn!(?fields, "malformed hardware message");
            return Ok(());
        }
        let values = fields.split_off(2);
        let pin = fields.pop().unwrap_or_default();
        let event = match fields[0].as_str() {
            "vw" => Event::VirtualWrite { pin, values },
            "vr" => Event::VirtualRead { pin },
            other => {
                warn!(operation = other, "unsupported hardware operation");
                return Ok(());
            }
        };
        self.dispatch(event)
    }

    fn handle_internal(&mut self, mut fields: Vec<String>) -> Result<()> {
        if fields.is_empty() {
            warn!("malformed internal message");
            return Ok(());
        }
        let args = fields.split_off(1);
        let name = fields.pop().unwrap_or_default();
        self.dispatch(Event::Internal { name, args })
    }

    /// Runs handlers for `event`, then sends whatever they queued.
    fn dispatch(&mut self, event: Event) -> Result<()> {
        self.dispatcher.dispatch(&event, &mut self.outbox);
        for request in self.outbox.take() {
            match self.send_request(request) {
                Ok(()) | Err(EngineError::Encode(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Writes `values` to virtual pin `pin`.
    pub fn virtual_write<P, I, V>(&mut self, pin: P, values: I) -> Result<()>
    where
        P: Display,
        I: IntoIterator<Item = V>,
        V: Display,
    {
        self.send_request(Request::virtual_write(pin, values))
    }

    /// Asks the broker to replay the stored values of `pins`.
    pub fn sync_virtual<I, P>(&mut self, pins: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Display,
    {
        self.send_request(Request::sync_virtual(pins))
    }

    pub fn set_property<P, N, I, V>(&mut self, pin: P, property: N, values: I) -> Result<()>
    where
        P: Display,
        N: Display,
        I: IntoIterator<Item = V>,
        V: Display,
    {
        self.send_request(Request::set_property(pin, property, values))
    }

    pub fn notify(&mut self, message: impl Into<String>) -> Result<()> {
        self.send_request(Request::Notify(message.into()))
    }

    pub fn tweet(&mut self, message: impl Into<String>) -> Result<()> {
        self.send_request(Request::Tweet(message.into()))
    }

    pub fn log_event(&mut self, event: impl Into<String>, description: Option<&str>) -> Result<()> {
        self.send_request(Request::LogEvent {
            event: event.into(),
            description: description.map(str::to_owned),
        })
    }

    /// Sends any [`Request`].
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotConnected`] while disconnected; nothing is sent
    ///   and no message id is used.
    /// - [`EngineError::Encode`] if the request cannot be framed; the
    ///   connection is left as it was.
    /// - [`EngineError::Transport`] if the write failed; the engine has
    ///   disconnected.
    pub fn send_request(&mut self, request: Request) -> Result<()> {
        let (command, fields) = request.into_parts();
        self.send(command, fields)
    }

    /// Frames `fields` under the next message id and writes them.
    fn send(&mut self, command: Command, fields: Vec<String>) -> Result<()> {
        if !self.state.is_active() {
            warn!(?command, "cannot send while disconnected");
            return Err(EngineError::NotConnected);
        }
        let message = Message::new(command, self.ids.peek(), fields);
        self.send_message(&message)?;
        self.ids.next_id();
        Ok(())
    }

    fn send_message(&mut self, message: &Message) -> Result<()> {
        let bytes = match self.codec.encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(command = ?message.command, "dropping message: {e}");
                return Err(e.into());
            }
        };
        match &message.payload {
            Payload::Token(_) => debug!(command = ?message.command, id = message.id, "sending login"),
            Payload::Status(status) => debug!(id = message.id, ?status, "sending response"),
            Payload::Fields(fields) => {
                debug!(command = ?message.command, id = message.id, ?fields, "sending")
            }
        }

        let Some(transport) = self.transport.as_mut() else {
            return Err(TransportError::NotAttached.into());
        };
        match transport.send(&bytes) {
            Ok(()) => {
                self.timers.last_send = self.clock.now_ms();
                Ok(())
            }
            Err(e) => {
                error!("send failed: {e}");
                self.disconnect();
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for ConnectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEngine")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("timers", &self.timers)
            .field("buffered", &self.buffer.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
