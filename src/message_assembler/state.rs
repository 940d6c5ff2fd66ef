//! Defragmentation state for a single in-progress data message.
//!
//! RFC 6455 allows at most one fragmented data message in flight per
//! direction, so unlike a keyed assembler this tracks a single optional
//! partial message. Control frames bypass it entirely.

use bytes::{Bytes, BytesMut};

use crate::{
    codec::FrameViolation,
    error::ProtocolViolation,
    frame::{Frame, OpCode},
    message::{Message, MessageKind},
};

/// Result of feeding one frame into [`AssemblyState`].
#[derive(Debug, PartialEq, Eq)]
pub enum AssemblyStatus {
    /// More continuation frames are expected.
    Incomplete,
    /// The frame produced a complete message.
    Complete(Message),
}

#[derive(Debug)]
struct PartialMessage {
    kind: MessageKind,
    buffer: BytesMut,
    frames: usize,
}

/// Tracks the open data message, if any.
///
/// # Examples
///
/// ```
/// use wsframe::{
///     frame::{Frame, OpCode},
///     message_assembler::{AssemblyState, AssemblyStatus},
/// };
///
/// let mut state = AssemblyState::new(1024);
/// assert_eq!(
///     state.accept(Frame::new(false, OpCode::Text, "he")),
///     Ok(AssemblyStatus::Incomplete)
/// );
/// let done = state
///     .accept(Frame::new(true, OpCode::Continuation, "llo"))
///     .expect("continuation accepted");
/// let AssemblyStatus::Complete(msg) = done else {
///     panic!("message should be complete");
/// };
/// assert_eq!(msg.as_text().expect("utf8"), "hello");
/// ```
#[derive(Debug)]
pub struct AssemblyState {
    max_message_size: usize,
    partial: Option<PartialMessage>,
}

impl AssemblyState {
    /// Create an empty state rejecting messages above `max_message_size`.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            partial: None,
        }
    }

    /// Whether a fragmented data message is open.
    #[must_use]
    pub fn is_assembling(&self) -> bool { self.partial.is_some() }

    /// Number of frames buffered for the open message.
    #[must_use]
    pub fn buffered_frames(&self) -> usize { self.partial.as_ref().map_or(0, |p| p.frames) }

    /// Drop any open message.
    pub fn reset(&mut self) { self.partial = None; }

    /// Feed one decoded frame.
    ///
    /// Control frames complete immediately and leave the open message
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`ProtocolViolation::OrphanContinuation`] for a continuation with no open message.
    /// - [`ProtocolViolation::InterleavedData`] for a text/binary frame while a message is open.
    /// - [`FrameViolation::PayloadTooLarge`] when the accumulated size exceeds the limit.
    pub fn accept(&mut self, frame: Frame) -> Result<AssemblyStatus, ProtocolViolation> {
        let Frame {
            fin,
            opcode,
            payload,
            ..
        } = frame;

        match (opcode, self.partial.as_mut()) {
            (OpCode::Continuation, None) => Err(ProtocolViolation::OrphanContinuation),
            (OpCode::Continuation, Some(partial)) => {
                let total = partial.buffer.len() + payload.len();
                if total > self.max_message_size {
                    self.partial = None;
                    return Err(FrameViolation::PayloadTooLarge {
                        len: total as u64,
                        max: self.max_message_size,
                    }
                    .into());
                }
                partial.buffer.extend_from_slice(&payload);
                partial.frames += 1;
                match self.partial.take() {
                    Some(done) if fin => Ok(AssemblyStatus::Complete(Message::from_wire(
                        done.kind,
                        done.buffer.freeze(),
                    ))),
                    still_open => {
                        self.partial = still_open;
                        Ok(AssemblyStatus::Incomplete)
                    }
                }
            }
            (op, open) => {
                let Some(kind) = MessageKind::from_opcode(op) else {
                    return Err(ProtocolViolation::OrphanContinuation);
                };
                if kind.is_control() {
                    return Ok(AssemblyStatus::Complete(Message::from_wire(kind, payload)));
                }
                if open.is_some() {
                    return Err(ProtocolViolation::InterleavedData(op));
                }
                if fin {
                    return Ok(AssemblyStatus::Complete(Message::from_wire(kind, payload)));
                }
                self.partial = Some(PartialMessage {
                    kind,
                    buffer: start_buffer(payload),
                    frames: 1,
                });
                Ok(AssemblyStatus::Incomplete)
            }
        }
    }
}

fn start_buffer(first: Bytes) -> BytesMut {
    let mut buffer = BytesMut::with_capacity(first.len() * 2);
    buffer.extend_from_slice(&first);
    buffer
}
