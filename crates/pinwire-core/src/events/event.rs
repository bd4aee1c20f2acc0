//! Events delivered to user handlers, and the keys they are registered under.
//!
//! Keys are plain strings so that handlers can be registered before the
//! broker ever mentions a pin:
//!
//! | Key            | Event                                     |
//! |----------------|-------------------------------------------|
//! | `connected`    | [`Event::Connected`]                      |
//! | `disconnected` | [`Event::Disconnected`]                   |
//! | `V3`           | [`Event::VirtualWrite`] for pin 3         |
//! | `V*`           | [`Event::VirtualWrite`] for any pin       |
//! | `readV3`       | [`Event::VirtualRead`] for pin 3          |
//! | `readV*`       | [`Event::VirtualRead`] for any pin        |
//! | `int_rtc`      | [`Event::Internal`] named `rtc`           |

use std::fmt::Display;

pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";
pub const ANY_VIRTUAL_WRITE: &str = "V*";
pub const ANY_VIRTUAL_READ: &str = "readV*";

/// Key for writes to a single virtual pin, e.g. `V3`.
pub fn virtual_write_key(pin: impl Display) -> String {
    format!("V{pin}")
}

/// Key for read requests on a single virtual pin, e.g. `readV3`.
pub fn virtual_read_key(pin: impl Display) -> String {
    format!("readV{pin}")
}

/// Key for an internal broker message, e.g. `int_rtc`.
pub fn internal_key(name: impl Display) -> String {
    format!("int_{name}")
}

/// Something a handler can react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The login handshake succeeded.  `ping_ms` is the login round-trip.
    Connected { ping_ms: u64 },
    /// The connection was torn down for any reason.
    Disconnected,
    /// The broker wrote `values` to virtual pin `pin`.
    VirtualWrite { pin: String, values: Vec<String> },
    /// The broker asks for the current value of virtual pin `pin`.
    VirtualRead { pin: String },
    /// An internal broker message such as `rtc` or `utc`.
    Internal { name: String, args: Vec<String> },
}

impl Event {
    /// Keys this event is emitted under, specific key first.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Event::Connected { .. } => vec![CONNECTED.to_string()],
            Event::Disconnected => vec![DISCONNECTED.to_string()],
            Event::VirtualWrite { pin, .. } => {
                vec![virtual_write_key(pin), ANY_VIRTUAL_WRITE.to_string()]
            }
            Event::VirtualRead { pin } => {
                vec![virtual_read_key(pin), ANY_VIRTUAL_READ.to_string()]
            }
            Event::Internal { name, .. } => vec![internal_key(name)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_write_keys_specific_then_wildcard() {
        let event = Event::VirtualWrite {
            pin: "3".into(),
            values: vec!["42".into()],
        };
        assert_eq!(event.keys(), vec!["V3", "V*"]);
    }

    #[test]
    fn test_virtual_read_keys_specific_then_wildcard() {
        let event = Event::VirtualRead { pin: "12".into() };
        assert_eq!(event.keys(), vec!["readV12", "readV*"]);
    }

    #[test]
    fn test_internal_key_is_prefixed() {
        let event = Event::Internal {
            name: "rtc".into(),
            args: vec![],
        };
        assert_eq!(event.keys(), vec!["int_rtc"]);
    }

    #[test]
    fn test_key_helpers_accept_numbers() {
        assert_eq!(virtual_write_key(7), "V7");
        assert_eq!(virtual_read_key(7), "readV7");
    }
}
