//! Protocol message types: command codes, status codes and the decoded
//! [`Message`] value.
//!
//! # Wire layout (for beginners)
//!
//! Every message starts with a fixed 5-byte header:
//!
//! ```text
//! [command:1][id:2][length:2][body:length]
//! ```
//!
//! - `command` says what kind of message this is (login, ping, hardware, ...).
//! - `id` pairs a request with its response.  Zero is never a valid id.
//! - `length` is the body length in bytes.  The one exception is the
//!   *response* command: it has no body, and the length slot carries a status
//!   code instead (200 for success).
//!
//! Bodies are UTF-8 text fragments separated by NUL bytes, so the hardware
//! message "write 42 to virtual pin 3" travels as `vw\03\042`.  Login bodies
//! are the raw auth token with no separators.

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the fixed message header in bytes.
pub const HEADER_SIZE: usize = 5;

/// Separator placed between body fields.
pub const FIELD_SEPARATOR: u8 = 0x00;

/// Largest body the 16-bit length field can describe.
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// Message id the engine always uses for the login request.
pub const LOGIN_MESSAGE_ID: u16 = 1;

// ── Command codes ─────────────────────────────────────────────────────────────

/// Command byte at the start of every header.
///
/// Unknown bytes decode to [`Command::Other`] so that a newer broker can send
/// commands this client does not understand without breaking the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Reply to a request; the length slot holds a [`Status`].
    Response,
    Login,
    Ping,
    Tweet,
    Email,
    Notify,
    /// Hardware message relayed from another device.
    Bridge,
    HardwareSync,
    Internal,
    Property,
    Hardware,
    HardwareLogin,
    Redirect,
    DebugPrint,
    EventLog,
    Other(u8),
}

impl Command {
    /// Returns `true` for commands whose body is a raw token.
    pub fn is_login(self) -> bool {
        matches!(self, Command::Login | Command::HardwareLogin)
    }
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        match value {
            0 => Command::Response,
            2 => Command::Login,
            6 => Command::Ping,
            12 => Command::Tweet,
            13 => Command::Email,
            14 => Command::Notify,
            15 => Command::Bridge,
            16 => Command::HardwareSync,
            17 => Command::Internal,
            19 => Command::Property,
            20 => Command::Hardware,
            29 => Command::HardwareLogin,
            41 => Command::Redirect,
            55 => Command::DebugPrint,
            64 => Command::EventLog,
            other => Command::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        match command {
            Command::Response => 0,
            Command::Login => 2,
            Command::Ping => 6,
            Command::Tweet => 12,
            Command::Email => 13,
            Command::Notify => 14,
            Command::Bridge => 15,
            Command::HardwareSync => 16,
            Command::Internal => 17,
            Command::Property => 19,
            Command::Hardware => 20,
            Command::HardwareLogin => 29,
            Command::Redirect => 41,
            Command::DebugPrint => 55,
            Command::EventLog => 64,
            Command::Other(byte) => byte,
        }
    }
}

// ── Status codes ──────────────────────────────────────────────────────────────

/// Status carried in the length slot of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    InvalidToken,
    /// Any other code; treated as a generic failure.
    Other(u16),
}

impl Status {
    pub const SUCCESS_CODE: u16 = 200;
    pub const INVALID_TOKEN_CODE: u16 = 9;

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        match code {
            Status::SUCCESS_CODE => Status::Success,
            Status::INVALID_TOKEN_CODE => Status::InvalidToken,
            other => Status::Other(other),
        }
    }
}

impl From<Status> for u16 {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => Status::SUCCESS_CODE,
            Status::InvalidToken => Status::INVALID_TOKEN_CODE,
            Status::Other(code) => code,
        }
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// What follows the header of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Response status (no body on the wire).
    Status(Status),
    /// Raw auth token for the login commands.
    Token(String),
    /// NUL-separated text fields.
    Fields(Vec<String>),
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: Command,
    pub id: u16,
    pub payload: Payload,
}

impl Message {
    /// Builds an ordinary message whose body is `fields` joined by NUL.
    pub fn new<I, S>(command: Command, id: u16, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command,
            id,
            payload: Payload::Fields(fields.into_iter().map(Into::into).collect()),
        }
    }

    /// Builds a response carrying `status` for the request with the same `id`.
    pub fn response(id: u16, status: Status) -> Self {
        Self {
            command: Command::Response,
            id,
            payload: Payload::Status(status),
        }
    }

    /// Builds a hardware-login message carrying `token`.
    pub fn login(id: u16, token: impl Into<String>) -> Self {
        Self {
            command: Command::HardwareLogin,
            id,
            payload: Payload::Token(token.into()),
        }
    }

    /// Returns the text fields, or an empty slice for status/token payloads.
    pub fn fields(&self) -> &[String] {
        match &self.payload {
            Payload::Fields(fields) => fields,
            Payload::Status(_) | Payload::Token(_) => &[],
        }
    }

    /// Returns the response status, if this is a response.
    pub fn status(&self) -> Option<Status> {
        match self.payload {
            Payload::Status(status) => Some(status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_byte_mapping_is_bijective_for_known_commands() {
        // Arrange
        let known = [0u8, 2, 6, 12, 13, 14, 15, 16, 17, 19, 20, 29, 41, 55, 64];

        for byte in known {
            // Act
            let command = Command::from(byte);

            // Assert
            assert!(!matches!(command, Command::Other(_)), "{byte} must be known");
            assert_eq!(u8::from(command), byte);
        }
    }

    #[test]
    fn test_unknown_command_byte_is_preserved() {
        let command = Command::from(99);
        assert_eq!(command, Command::Other(99));
        assert_eq!(u8::from(command), 99);
    }

    #[test]
    fn test_status_codes_map_to_variants() {
        assert_eq!(Status::from(200), Status::Success);
        assert_eq!(Status::from(9), Status::InvalidToken);
        assert_eq!(Status::from(2), Status::Other(2));
        assert_eq!(u16::from(Status::InvalidToken), 9);
    }

    #[test]
    fn test_fields_is_empty_for_response() {
        let msg = Message::response(7, Status::Success);
        assert!(msg.fields().is_empty());
        assert_eq!(msg.status(), Some(Status::Success));
    }

    #[test]
    fn test_login_commands_are_flagged() {
        assert!(Command::Login.is_login());
        assert!(Command::HardwareLogin.is_login());
        assert!(!Command::Hardware.is_login());
    }
}
