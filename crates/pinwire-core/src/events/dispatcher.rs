//! Registry of event handlers and fault-isolated dispatch.
//!
//! # Fault isolation
//!
//! A handler is user code.  Whatever it does, the engine's state machine and
//! receive buffer must come out unchanged, so [`EventDispatcher::emit`]:
//!
//! - treats a missing handler as a silent no-op,
//! - catches a returned error *and* a panic, logs it, and reports it as
//!   [`EmitOutcome::Faulted`],
//! - discards anything the faulting handler queued in the [`Outbox`].

use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, error};

use crate::events::event::{virtual_read_key, virtual_write_key, Event};
use crate::events::outbox::Outbox;

/// Error type handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type handlers return.
pub type HandlerResult = Result<(), BoxError>;

type BoxedHandler = Box<dyn FnMut(&Event, &mut Outbox) -> HandlerResult + Send>;

/// A handler failed while processing an event.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler for {key:?} failed: {source}")]
    Failed {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("handler for {key:?} panicked: {message}")]
    Panicked { key: String, message: String },
}

/// What happened when a key was emitted.
#[derive(Debug)]
pub enum EmitOutcome {
    /// No handler is registered for the key.
    Unhandled,
    Handled,
    Faulted(HandlerError),
}

impl EmitOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, EmitOutcome::Handled)
    }
}

/// Maps event keys to at most one handler each.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, BoxedHandler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `key`, replacing any previous handler.
    pub fn register<F>(&mut self, key: impl Into<String>, handler: F) -> &mut Self
    where
        F: FnMut(&Event, &mut Outbox) -> HandlerResult + Send + 'static,
    {
        let key = key.into();
        if self.handlers.insert(key.clone(), Box::new(handler)).is_some() {
            debug!(%key, "replaced existing handler");
        }
        self
    }

    /// Registers a handler for writes to virtual pin `pin`.
    pub fn on_virtual_write<F>(&mut self, pin: impl Display, handler: F) -> &mut Self
    where
        F: FnMut(&Event, &mut Outbox) -> HandlerResult + Send + 'static,
    {
        self.register(virtual_write_key(pin), handler)
    }

    /// Registers a handler for read requests on virtual pin `pin`.
    pub fn on_virtual_read<F>(&mut self, pin: impl Display, handler: F) -> &mut Self
    where
        F: FnMut(&Event, &mut Outbox) -> HandlerResult + Send + 'static,
    {
        self.register(virtual_read_key(pin), handler)
    }

    /// Removes the handler for `key`, returning whether one was registered.
    pub fn unregister(&mut self, key: &str) -> bool {
        self.handlers.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler registered for `key`, if any.
    pub fn emit(&mut self, key: &str, event: &Event, outbox: &mut Outbox) -> EmitOutcome {
        let Some(handler) = self.handlers.get_mut(key) else {
            return EmitOutcome::Unhandled;
        };
        debug!(key, ?event, "emit");

        let queued = outbox.len();
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(event, outbox)));
        let fault = match result {
            Ok(Ok(())) => return EmitOutcome::Handled,
            Ok(Err(source)) => HandlerError::Failed {
                key: key.to_string(),
                source,
            },
            Err(payload) => HandlerError::Panicked {
                key: key.to_string(),
                message: panic_message(payload.as_ref()),
            },
        };

        error!("{fault}");
        outbox.truncate(queued);
        EmitOutcome::Faulted(fault)
    }

    /// Emits `event` under each of its keys, specific key first.
    pub fn dispatch(&mut self, event: &Event, outbox: &mut Outbox) -> Vec<EmitOutcome> {
        event
            .keys()
            .iter()
            .map(|key| self.emit(key, event, outbox))
            .collect()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("EventDispatcher").field("keys", &keys).finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::outbox::Request;
    use std::sync::{Arc, Mutex};

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &str,
    ) -> impl FnMut(&Event, &mut Outbox) -> HandlerResult + Send + 'static {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |_: &Event, _: &mut Outbox| {
            log.lock().unwrap().push(tag.clone());
            Ok(())
        }
    }

    #[test]
    fn test_emit_without_handler_is_silent() {
        // Arrange
        let mut dispatcher = EventDispatcher::new();
        let mut outbox = Outbox::new();

        // Act
        let outcome = dispatcher.emit("V9", &Event::VirtualRead { pin: "9".into() }, &mut outbox);

        // Assert
        assert!(matches!(outcome, EmitOutcome::Unhandled));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_register_replaces_previous_handler() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register("connected", recorder(&log, "first"))
            .register("connected", recorder(&log, "second"));

        // Act
        dispatcher.emit("connected", &Event::Connected { ping_ms: 1 }, &mut Outbox::new());

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_dispatch_emits_specific_key_before_wildcard() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register("V*", recorder(&log, "wildcard"))
            .on_virtual_write(3, recorder(&log, "V3"))
            .on_virtual_write(4, recorder(&log, "V4"));
        let event = Event::VirtualWrite {
            pin: "3".into(),
            values: vec!["42".into()],
        };

        // Act
        let outcomes = dispatcher.dispatch(&event, &mut Outbox::new());

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["V3", "wildcard"]);
        assert!(outcomes.iter().all(EmitOutcome::is_handled));
    }

    #[test]
    fn test_handler_error_is_contained() {
        // Arrange
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("int_rtc", |_, _| Err("clock not set".into()));

        // Act
        let outcome = dispatcher.emit(
            "int_rtc",
            &Event::Internal {
                name: "rtc".into(),
                args: vec![],
            },
            &mut Outbox::new(),
        );

        // Assert
        match outcome {
            EmitOutcome::Faulted(HandlerError::Failed { key, source }) => {
                assert_eq!(key, "int_rtc");
                assert_eq!(source.to_string(), "clock not set");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_handler_panic_is_contained_and_outbox_rolled_back() {
        // Arrange
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("connected", |_, outbox: &mut Outbox| {
            outbox.notify("never sent");
            panic!("boom");
        });
        let mut outbox = Outbox::new();
        outbox.notify("queued earlier");

        // Act
        let outcome = dispatcher.emit("connected", &Event::Connected { ping_ms: 0 }, &mut outbox);

        // Assert
        assert!(matches!(
            outcome,
            EmitOutcome::Faulted(HandlerError::Panicked { ref message, .. }) if message == "boom"
        ));
        assert_eq!(outbox.take(), vec![Request::Notify("queued earlier".into())]);
    }

    #[test]
    fn test_handler_can_queue_requests() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("connected", |_, outbox: &mut Outbox| {
            outbox.sync_virtual([1]);
            Ok(())
        });
        let mut outbox = Outbox::new();

        dispatcher.emit("connected", &Event::Connected { ping_ms: 3 }, &mut outbox);

        assert_eq!(outbox.take(), vec![Request::sync_virtual([1])]);
    }

    #[test]
    fn test_unregister_removes_handler() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("disconnected", |_, _| Ok(()));

        assert!(dispatcher.unregister("disconnected"));
        assert!(!dispatcher.contains("disconnected"));
        assert!(!dispatcher.unregister("disconnected"));
    }
}
