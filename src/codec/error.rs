//! Error types for the frame codec.
//!
//! The codec reports three kinds of failure:
//!
//! - [`CodecError::Io`]: the transport failed mid-frame. The partial frame cannot be recovered.
//! - [`CodecError::BadOpcode`]: the header named a reserved opcode. The frame was consumed in full,
//!   so the stream is still aligned on a frame boundary.
//! - [`CodecError::Violation`]: the header broke a framing rule. The stream can no longer be
//!   trusted.
//!
//! These stay raw here; [`crate::error::WsError`] classifies them when they
//! reach a connection.

use std::io;

use thiserror::Error;

/// Framing rules a decoded header can break.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FrameViolation {
    /// RSV1-3 set without a negotiated extension.
    #[error("reserved header bits set")]
    ReservedBits,
    /// Control frame with FIN cleared.
    #[error("fragmented control frame")]
    FragmentedControl,
    /// Control frame payload over 125 bytes.
    #[error("control frame payload of {len} bytes exceeds 125")]
    OversizedControl {
        /// Declared payload length.
        len: u64,
    },
    /// 64-bit length with the most significant bit set.
    #[error("invalid 64-bit payload length")]
    InvalidLength,
    /// Payload larger than the configured limit.
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Declared payload length.
        len: u64,
        /// Configured maximum.
        max: usize,
    },
    /// Peer sent an unmasked frame where masking is mandatory.
    #[error("unmasked frame from a peer that must mask")]
    MissingMask,
}

/// Failure while encoding or decoding one frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Transport error while reading or writing frame bytes.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Reserved opcode in an otherwise well-formed frame.
    #[error("reserved opcode {0:#x}")]
    BadOpcode(u8),
    /// Header broke a framing rule.
    #[error("framing violation: {0}")]
    Violation(#[from] FrameViolation),
}
