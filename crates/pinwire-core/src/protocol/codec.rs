//! Binary codec for pinwire protocol messages.
//!
//! Wire format:
//! ```text
//! [command:1][id:2][length:2][body:length]
//! ```
//! Total header size: 5 bytes. All multi-byte integers are big-endian.
//!
//! Decoding is incremental: [`decode_message`] looks at the front of a
//! receive buffer that may hold a partial message, several messages, or
//! nothing at all.  It never consumes anything itself; the caller trims the
//! reported number of bytes once it has handled the message.

use thiserror::Error;
use tracing::warn;

use crate::protocol::messages::{
    Command, Message, Payload, Status, FIELD_SEPARATOR, HEADER_SIZE, MAX_BODY_LEN,
};

/// Errors that make the inbound stream unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The header carries message id 0, which no peer may send.
    #[error("invalid message id 0 (command {command})")]
    ZeroMessageId { command: u8 },

    /// The declared body length exceeds the configured safety cap.
    #[error("declared body length {declared} exceeds limit {limit}")]
    BodyTooLarge { declared: usize, limit: usize },
}

/// Errors that prevent a single outbound message from being encoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The body does not fit in the 16-bit length field.
    #[error("body of {len} bytes exceeds the {max}-byte frame limit", max = MAX_BODY_LEN)]
    BodyTooLong { len: usize },

    /// A field contains the NUL separator and would split on the far side.
    #[error("field {index} contains a NUL byte")]
    EmbeddedSeparator { index: usize },

    /// The payload variant does not match what the command carries on the wire.
    #[error("command {command:?} cannot carry this payload")]
    PayloadMismatch { command: Command },
}

/// The fixed 5-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    pub id: u16,
    /// Body length, or the status code for responses.
    pub length: u16,
}

impl Header {
    /// Reads a header from the front of `bytes`, or `None` if fewer than
    /// [`HEADER_SIZE`] bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            command: Command::from(bytes[0]),
            id: u16::from_be_bytes([bytes[1], bytes[2]]),
            length: u16::from_be_bytes([bytes[3], bytes[4]]),
        })
    }

    /// Number of body bytes that follow this header on the wire.
    pub fn body_len(&self) -> usize {
        match self.command {
            Command::Response => 0,
            _ => self.length as usize,
        }
    }

    /// Rejects headers that can only come from a corrupt or hostile stream.
    ///
    /// The length cap does not apply to responses, whose length slot is a
    /// status code rather than a size.
    pub fn validate(&self, max_body_len: usize) -> Result<(), ProtocolError> {
        if self.id == 0 {
            return Err(ProtocolError::ZeroMessageId {
                command: self.command.into(),
            });
        }
        let declared = self.body_len();
        if declared > max_body_len {
            return Err(ProtocolError::BodyTooLarge {
                declared,
                limit: max_body_len,
            });
        }
        Ok(())
    }
}

/// Outcome of a decode attempt that did not hit a protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A full message sits at the front of the buffer.
    Complete { message: Message, consumed: usize },
    /// More bytes are needed.  `header` is set once a valid header has been
    /// seen, even though its body has not fully arrived.
    Incomplete { header: Option<Header> },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `msg` into a header plus body.
///
/// # Errors
///
/// Returns [`EncodeError`] if the body is too long for the length field, a
/// field contains a NUL byte, or the payload does not suit the command.
///
/// # Examples
///
/// ```rust
/// use pinwire_core::protocol::{decode_message, encode_message, Command, Decoded, Message};
///
/// let msg = Message::new(Command::Hardware, 3, ["vw", "1", "on"]);
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(bytes, b"\x14\x00\x03\x00\x07vw\x001\x00on");
///
/// match decode_message(&bytes, 1024).unwrap() {
///     Decoded::Complete { message, consumed } => {
///         assert_eq!(message, msg);
///         assert_eq!(consumed, bytes.len());
///     }
///     Decoded::Incomplete { .. } => unreachable!(),
/// }
/// ```
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let (length, body) = match (&msg.payload, msg.command) {
        (Payload::Status(status), Command::Response) => (u16::from(*status), Vec::new()),
        (Payload::Token(token), command) if command.is_login() => {
            let body = token.as_bytes().to_vec();
            (body_len_field(body.len())?, body)
        }
        (Payload::Fields(fields), command)
            if command != Command::Response && !command.is_login() =>
        {
            let body = join_fields(fields)?;
            (body_len_field(body.len())?, body)
        }
        (_, command) => return Err(EncodeError::PayloadMismatch { command }),
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.push(msg.command.into());
    buf.extend_from_slice(&msg.id.to_be_bytes());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decodes one message from the front of `bytes`.
///
/// Safe to call on an empty buffer or repeatedly on the same growing buffer;
/// nothing is consumed until the caller trims `consumed` bytes.
///
/// A body that is not valid UTF-8 is not an error: the message is returned
/// with no fields and a warning is logged.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the header has id 0 or declares a body
/// longer than `max_body_len`.
pub fn decode_message(bytes: &[u8], max_body_len: usize) -> Result<Decoded, ProtocolError> {
    let Some(header) = Header::parse(bytes) else {
        return Ok(Decoded::Incomplete { header: None });
    };
    header.validate(max_body_len)?;

    let total = HEADER_SIZE + header.body_len();
    if bytes.len() < total {
        return Ok(Decoded::Incomplete {
            header: Some(header),
        });
    }

    let body = &bytes[HEADER_SIZE..total];
    let payload = match header.command {
        Command::Response => Payload::Status(Status::from(header.length)),
        command if command.is_login() => {
            Payload::Token(String::from_utf8_lossy(body).into_owned())
        }
        command => Payload::Fields(split_fields(command, header.id, body)),
    };

    Ok(Decoded::Complete {
        message: Message {
            command: header.command,
            id: header.id,
            payload,
        },
        consumed: total,
    })
}

/// A decoder bound to one body-length cap.
///
/// The cap guards against a corrupt length field making the receive buffer
/// grow without bound; it is not a limit the protocol itself imposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_body_len: usize,
}

impl FrameCodec {
    pub fn new(max_body_len: usize) -> Self {
        Self { max_body_len }
    }

    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, EncodeError> {
        encode_message(msg)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Decoded, ProtocolError> {
        decode_message(bytes, self.max_body_len)
    }
}

// ── Body helpers ──────────────────────────────────────────────────────────────

fn body_len_field(len: usize) -> Result<u16, EncodeError> {
    u16::try_from(len).map_err(|_| EncodeError::BodyTooLong { len })
}

fn join_fields(fields: &[String]) -> Result<Vec<u8>, EncodeError> {
    let mut body = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        if field.as_bytes().contains(&FIELD_SEPARATOR) {
            return Err(EncodeError::EmbeddedSeparator { index });
        }
        if index > 0 {
            body.push(FIELD_SEPARATOR);
        }
        body.extend_from_slice(field.as_bytes());
    }
    Ok(body)
}

fn split_fields(command: Command, id: u16, body: &[u8]) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    let fields: Result<Vec<String>, _> = body
        .split(|b| *b == FIELD_SEPARATOR)
        .map(|part| std::str::from_utf8(part).map(str::to_owned))
        .collect();
    match fields {
        Ok(fields) => fields,
        Err(e) => {
            warn!(?command, id, "body is not valid UTF-8, dispatching without fields: {e}");
            Vec::new()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: usize = 2048;

    fn complete(bytes: &[u8]) -> (Message, usize) {
        match decode_message(bytes, CAP).expect("decode must succeed") {
            Decoded::Complete { message, consumed } => (message, consumed),
            other => panic!("expected a complete message, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_hardware_message_joins_fields_with_nul() {
        // Arrange
        let msg = Message::new(Command::Hardware, 0x0102, ["vw", "3", "42"]);

        // Act
        let bytes = encode_message(&msg).unwrap();

        // Assert
        assert_eq!(&bytes[..5], &[20, 0x01, 0x02, 0x00, 0x07]);
        assert_eq!(&bytes[5..], b"vw\x003\x0042");
    }

    #[test]
    fn test_encode_response_puts_status_in_length_slot() {
        let bytes = encode_message(&Message::response(9, Status::Success)).unwrap();
        assert_eq!(bytes, vec![0, 0, 9, 0, 200]);
    }

    #[test]
    fn test_encode_login_body_is_raw_token() {
        // Arrange
        let msg = Message::login(1, "abc123");

        // Act
        let bytes = encode_message(&msg).unwrap();

        // Assert
        assert_eq!(&bytes[..5], &[29, 0, 1, 0, 6]);
        assert_eq!(&bytes[5..], b"abc123");
    }

    #[test]
    fn test_encode_rejects_embedded_separator() {
        let msg = Message::new(Command::Notify, 4, ["bad\0text"]);
        assert_eq!(
            encode_message(&msg),
            Err(EncodeError::EmbeddedSeparator { index: 0 })
        );
    }

    #[test]
    fn test_encode_rejects_body_longer_than_length_field() {
        let msg = Message::new(Command::Notify, 4, ["x".repeat(MAX_BODY_LEN + 1)]);
        assert_eq!(
            encode_message(&msg),
            Err(EncodeError::BodyTooLong {
                len: MAX_BODY_LEN + 1
            })
        );
    }

    #[test]
    fn test_encode_rejects_mismatched_payload() {
        let msg = Message {
            command: Command::Response,
            id: 2,
            payload: Payload::Fields(vec!["x".into()]),
        };
        assert_eq!(
            encode_message(&msg),
            Err(EncodeError::PayloadMismatch {
                command: Command::Response
            })
        );
    }

    #[test]
    fn test_decode_empty_buffer_is_incomplete() {
        assert_eq!(
            decode_message(&[], CAP),
            Ok(Decoded::Incomplete { header: None })
        );
    }

    #[test]
    fn test_decode_partial_header_is_incomplete() {
        assert_eq!(
            decode_message(&[20, 0, 1], CAP),
            Ok(Decoded::Incomplete { header: None })
        );
    }

    #[test]
    fn test_decode_partial_body_reports_header() {
        // Arrange – header announces 4 body bytes, only 2 present
        let bytes = [20, 0, 5, 0, 4, b'v', b'w'];

        // Act
        let result = decode_message(&bytes, CAP).unwrap();

        // Assert
        match result {
            Decoded::Incomplete { header: Some(h) } => {
                assert_eq!(h.id, 5);
                assert_eq!(h.length, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_response_consumes_only_header() {
        // Arrange – a response followed by the start of another message
        let bytes = [0, 0, 1, 0, 200, 6, 0];

        // Act
        let (msg, consumed) = complete(&bytes);

        // Assert
        assert_eq!(consumed, HEADER_SIZE);
        assert_eq!(msg.status(), Some(Status::Success));
        assert_eq!(msg.id, 1);
    }

    #[test]
    fn test_decode_response_status_is_not_length_capped() {
        // Status 200 exceeds a tiny cap but is not a body length.
        let result = decode_message(&[0, 0, 1, 0, 200], 16).unwrap();
        assert!(matches!(result, Decoded::Complete { .. }));
    }

    #[test]
    fn test_decode_zero_id_is_invalid() {
        assert_eq!(
            decode_message(&[20, 0, 0, 0, 0], CAP),
            Err(ProtocolError::ZeroMessageId { command: 20 })
        );
    }

    #[test]
    fn test_decode_oversized_length_is_invalid_before_body_arrives() {
        // Arrange – header only; body would be 0x1000 bytes
        let bytes = [20, 0, 1, 0x10, 0x00];

        // Act
        let result = decode_message(&bytes, CAP);

        // Assert
        assert_eq!(
            result,
            Err(ProtocolError::BodyTooLarge {
                declared: 0x1000,
                limit: CAP
            })
        );
    }

    #[test]
    fn test_decode_invalid_utf8_yields_no_fields() {
        let bytes = [20, 0, 3, 0, 3, b'v', 0x00, 0xFF];
        let (msg, consumed) = complete(&bytes);
        assert_eq!(consumed, bytes.len());
        assert!(msg.fields().is_empty());
    }

    #[test]
    fn test_decode_empty_body_has_no_fields() {
        let (msg, _) = complete(&[6, 0, 7, 0, 0]);
        assert_eq!(msg.command, Command::Ping);
        assert_eq!(msg.payload, Payload::Fields(Vec::new()));
    }

    #[test]
    fn test_decode_keeps_empty_inner_fields() {
        let (msg, _) = complete(b"\x11\x00\x02\x00\x04a\x00\x00b");
        assert_eq!(msg.fields(), ["a", "", "b"]);
    }

    #[test]
    fn test_decode_unknown_command_still_completes() {
        let (msg, consumed) = complete(&[99, 0, 1, 0, 1, b'x']);
        assert_eq!(msg.command, Command::Other(99));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_frame_codec_applies_its_cap() {
        let codec = FrameCodec::new(2);
        assert!(codec.decode(&[20, 0, 1, 0, 3]).is_err());
        assert_eq!(codec.max_body_len(), 2);
    }
}
