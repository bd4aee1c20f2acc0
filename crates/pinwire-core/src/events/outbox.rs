//! Outbound requests and the [`Outbox`] handlers queue them in.
//!
//! A handler runs while the engine is in the middle of processing inbound
//! bytes, so it cannot borrow the engine to send.  Instead it gets an
//! `Outbox`; the engine sends whatever was queued as soon as the handler
//! returns.

use std::fmt::Display;

use crate::protocol::Command;

/// An application-level message the engine can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Write `values` to virtual pin `pin`.
    VirtualWrite { pin: String, values: Vec<String> },
    /// Ask the broker to replay the stored values of `pins`.
    SyncVirtual { pins: Vec<String> },
    /// Change a widget property (`label`, `color`, ...) bound to `pin`.
    SetProperty {
        pin: String,
        property: String,
        values: Vec<String>,
    },
    Notify(String),
    Tweet(String),
    LogEvent {
        event: String,
        description: Option<String>,
    },
}

fn strings<I, V>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = V>,
    V: Display,
{
    values.into_iter().map(|v| v.to_string()).collect()
}

impl Request {
    pub fn virtual_write<P, I, V>(pin: P, values: I) -> Self
    where
        P: Display,
        I: IntoIterator<Item = V>,
        V: Display,
    {
        Request::VirtualWrite {
            pin: pin.to_string(),
            values: strings(values),
        }
    }

    pub fn sync_virtual<I, P>(pins: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Display,
    {
        Request::SyncVirtual {
            pins: strings(pins),
        }
    }

    pub fn set_property<P, N, I, V>(pin: P, property: N, values: I) -> Self
    where
        P: Display,
        N: Display,
        I: IntoIterator<Item = V>,
        V: Display,
    {
        Request::SetProperty {
            pin: pin.to_string(),
            property: property.to_string(),
            values: strings(values),
        }
    }

    /// Command and body fields this request is sent as.
    pub fn into_parts(self) -> (Command, Vec<String>) {
        match self {
            Request::VirtualWrite { pin, values } => {
                let mut fields = vec!["vw".to_string(), pin];
                fields.extend(values);
                (Command::Hardware, fields)
            }
            Request::SyncVirtual { pins } => {
                let mut fields = vec!["vr".to_string()];
                fields.extend(pins);
                (Command::HardwareSync, fields)
            }
            Request::SetProperty {
                pin,
                property,
                values,
            } => {
                let mut fields = vec![pin, property];
                fields.extend(values);
                (Command::Property, fields)
            }
            Request::Notify(message) => (Command::Notify, vec![message]),
            Request::Tweet(message) => (Command::Tweet, vec![message]),
            Request::LogEvent { event, description } => {
                let mut fields = vec![event];
                fields.extend(description);
                (Command::EventLog, fields)
            }
        }
    }
}

/// Requests queued by handlers during a dispatch.
#[derive(Debug, Default)]
pub struct Outbox {
    requests: Vec<Request>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub fn virtual_write<P, I, V>(&mut self, pin: P, values: I)
    where
        P: Display,
        I: IntoIterator<Item = V>,
        V: Display,
    {
        self.push(Request::virtual_write(pin, values));
    }

    pub fn sync_virtual<I, P>(&mut self, pins: I)
    where
        I: IntoIterator<Item = P>,
        P: Display,
    {
        self.push(Request::sync_virtual(pins));
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.push(Request::Notify(message.into()));
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Drops everything queued after the first `len` requests.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.requests.truncate(len);
    }

    /// Removes and returns all queued requests in order.
    pub fn take(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }
}
