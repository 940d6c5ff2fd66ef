//! Application-level messages.
//!
//! A [`Message`] is what handlers and middlewares see: one complete text,
//! binary, or control unit, independent of how many frames carried it.
//! Middlewares take a message by value and hand a (possibly rewritten)
//! message on, so ownership is always unambiguous.

use std::str;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::{Result, WsError},
    frame::{MAX_CONTROL_PAYLOAD, OpCode},
};

/// Close status codes from RFC 6455 section 7.4.1.
#[derive(Clone, Copy, Debug)]
pub struct CloseCode;

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away.
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Data type cannot be accepted.
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// No status code was present. Never sent on the wire.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame. Never sent on the wire.
    pub const ABNORMAL: u16 = 1006;
    /// Payload inconsistent with the message type.
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Message too big to process.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    /// Unexpected server condition.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Status sent by a plain local close.
pub const DEFAULT_CLOSE_STATUS: u16 = CloseCode::NORMAL;
/// Reason sent by a plain local close.
pub const DEFAULT_CLOSE_REASON: &str = "ttfn";

const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

/// Kind of a complete message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

impl MessageKind {
    /// Opcode of the first frame carrying this kind.
    #[must_use]
    pub const fn opcode(self) -> OpCode {
        match self {
            Self::Text => OpCode::Text,
            Self::Binary => OpCode::Binary,
            Self::Ping => OpCode::Ping,
            Self::Pong => OpCode::Pong,
            Self::Close => OpCode::Close,
        }
    }

    /// Message kind started by `opcode`; `None` for continuation frames.
    #[must_use]
    pub const fn from_opcode(opcode: OpCode) -> Option<Self> {
        match opcode {
            OpCode::Text => Some(Self::Text),
            OpCode::Binary => Some(Self::Binary),
            OpCode::Ping => Some(Self::Ping),
            OpCode::Pong => Some(Self::Pong),
            OpCode::Close => Some(Self::Close),
            OpCode::Continuation => None,
        }
    }

    /// Control messages are never fragmented.
    #[must_use]
    pub const fn is_control(self) -> bool { self.opcode().is_control() }

    /// Lower-case name used for logging and event routing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Close => "close",
        }
    }
}

/// One complete WebSocket message.
///
/// For close messages `content` holds the reason and the status code is
/// kept separately.
///
/// # Examples
///
/// ```
/// use wsframe::message::{Message, MessageKind};
///
/// let msg = Message::close(1000, "bye");
/// assert_eq!(msg.kind(), MessageKind::Close);
/// assert_eq!(msg.close_status(), Some(1000));
/// assert_eq!(&msg.wire_payload()[..], b"\x03\xe8bye");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    content: Bytes,
    close_status: Option<u16>,
}

impl Message {
    /// Build a message of `kind` carrying `content`.
    #[must_use]
    pub fn new(kind: MessageKind, content: impl Into<Bytes>) -> Self {
        let close_status = (kind == MessageKind::Close).then_some(CloseCode::NO_STATUS);
        Self {
            kind,
            content: content.into(),
            close_status,
        }
    }

    /// Text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Text, Bytes::from(content.into()))
    }

    /// Binary message.
    #[must_use]
    pub fn binary(content: impl Into<Bytes>) -> Self { Self::new(MessageKind::Binary, content) }

    /// Ping with an application payload.
    #[must_use]
    pub fn ping(content: impl Into<Bytes>) -> Self { Self::new(MessageKind::Ping, content) }

    /// Pong, usually echoing a ping payload.
    #[must_use]
    pub fn pong(content: impl Into<Bytes>) -> Self { Self::new(MessageKind::Pong, content) }

    /// Close with `status` and a reason truncated to fit a control frame.
    #[must_use]
    pub fn close(status: u16, reason: &str) -> Self {
        let mut end = reason.len().min(MAX_CLOSE_REASON);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            kind: MessageKind::Close,
            content: Bytes::copy_from_slice(&reason.as_bytes()[..end]),
            close_status: Some(status),
        }
    }

    /// Rebuild a message from the kind and wire payload of its frames.
    ///
    /// Close payloads are split into status and reason; a payload shorter than
    /// two bytes yields [`CloseCode::NO_STATUS`] and an empty reason.
    #[must_use]
    pub fn from_wire(kind: MessageKind, payload: Bytes) -> Self {
        if kind != MessageKind::Close {
            return Self::new(kind, payload);
        }
        if payload.len() < 2 {
            return Self::new(MessageKind::Close, Bytes::new());
        }
        let status = u16::from_be_bytes([payload[0], payload[1]]);
        Self {
            kind,
            content: payload.slice(2..),
            close_status: Some(status),
        }
    }

    /// Message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind { self.kind }

    /// Opcode of the first frame.
    #[must_use]
    pub fn opcode(&self) -> OpCode { self.kind.opcode() }

    /// Raw content (the reason for close messages).
    #[must_use]
    pub fn content(&self) -> &Bytes { &self.content }

    /// Content as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::InvalidUtf8`] when the content is not UTF-8.
    pub fn as_text(&self) -> Result<&str> {
        str::from_utf8(&self.content).map_err(|_| WsError::InvalidUtf8)
    }

    /// Close status code, only set for close messages.
    #[must_use]
    pub fn close_status(&self) -> Option<u16> { self.close_status }

    /// Replace the content, keeping kind and status.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = content.into();
        self
    }

    /// Consume the message, returning its content.
    #[must_use]
    pub fn into_content(self) -> Bytes { self.content }

    /// Bytes placed in the frame payload(s).
    ///
    /// Close messages with a status prepend it in network byte order.
    #[must_use]
    pub fn wire_payload(&self) -> Bytes {
        match (self.kind, self.close_status) {
            (MessageKind::Close, Some(status)) if status != CloseCode::NO_STATUS => {
                let mut buf = BytesMut::with_capacity(2 + self.content.len());
                buf.put_u16(status);
                buf.put_slice(&self.content);
                buf.freeze()
            }
            _ => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use super::{CloseCode, Message, MessageKind};

    #[test]
    fn close_payload_splits_status_and_reason() {
        let msg = Message::from_wire(MessageKind::Close, Bytes::from_static(b"\x03\xe9gone"));
        assert_eq!(msg.close_status(), Some(CloseCode::GOING_AWAY));
        assert_eq!(msg.as_text().expect("utf8 reason"), "gone");
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::one_byte(b"\x03")]
    fn short_close_payload_means_no_status(#[case] payload: &'static [u8]) {
        let msg = Message::from_wire(MessageKind::Close, Bytes::from_static(payload));
        assert_eq!(msg.close_status(), Some(CloseCode::NO_STATUS));
        assert!(msg.content().is_empty());
        assert!(msg.wire_payload().is_empty());
    }

    #[test]
    fn close_reason_is_truncated_on_char_boundary() {
        let reason = "é".repeat(100);
        let msg = Message::close(1000, &reason);
        assert!(msg.wire_payload().len() <= 125);
        assert!(msg.as_text().is_ok());
    }

    #[test]
    fn invalid_text_is_reported() {
        let msg = Message::new(MessageKind::Text, Bytes::from_static(&[0xFF, 0xFE]));
        assert!(msg.as_text().expect_err("invalid utf8").is_message_level());
    }

    #[test]
    fn with_content_keeps_kind() {
        let msg = Message::text("a").with_content("b");
        assert_eq!(msg.kind(), MessageKind::Text);
        assert_eq!(msg.as_text().expect("utf8"), "b");
    }
}
