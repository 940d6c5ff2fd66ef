//! Wire-level frame primitives (RFC 6455 section 5.2).
//!
//! A [`Frame`] is the unit read from or written to the transport. Frames are
//! created per read or write and never retained; the
//! [`MessageAssembler`](crate::message_assembler::MessageAssembler) and
//! [`Fragmenter`](crate::fragment::Fragmenter) convert between frames and
//! [`Message`](crate::message::Message)s.

mod mask;

pub use mask::{apply_mask, random_mask_key};

use bytes::Bytes;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Frame opcodes defined by RFC 6455. Every other 4-bit value is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Parse the low nibble of the first header byte.
    ///
    /// Returns `None` for the reserved values `0x3..=0x7` and `0xB..=0xF`.
    ///
    /// # Examples
    ///
    /// ```
    /// use wsframe::frame::OpCode;
    ///
    /// assert_eq!(OpCode::from_u8(0x9), Some(OpCode::Ping));
    /// assert_eq!(OpCode::from_u8(0xC), None);
    /// ```
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Wire value of the opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 { self as u8 }

    /// Close, ping and pong are control opcodes.
    #[must_use]
    pub const fn is_control(self) -> bool { matches!(self, Self::Close | Self::Ping | Self::Pong) }
}

/// One frame as it travels on the wire, payload already unmasked.
///
/// Whether a frame is masked is a property of the encoding direction, so it
/// is chosen at [`encode`](crate::codec::encode) time rather than stored here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether the frame was masked on the wire (set by the decoder).
    pub masked: bool,
    /// Unmasked payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Build an unmasked frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }

    /// Build a final frame, the common case for control frames.
    #[must_use]
    pub fn final_frame(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self::new(true, opcode, payload)
    }
}
