//! Outbound helper that splits messages into frames.
//!
//! [`Fragmenter`] chunks a message's wire payload into frames of at most
//! `frame_size` bytes. The first frame carries the message opcode, the rest
//! are continuations, and only the last has FIN set. Control messages always
//! travel as one frame.

use std::num::NonZeroUsize;

use bytes::Bytes;

use crate::{
    frame::{Frame, OpCode},
    message::Message,
};

/// Splits messages into frame-sized chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fragmenter {
    frame_size: NonZeroUsize,
}

impl Fragmenter {
    /// Create a fragmenter capping data frame payloads at `frame_size` bytes.
    #[must_use]
    pub const fn new(frame_size: NonZeroUsize) -> Self { Self { frame_size } }

    /// Maximum payload per data frame.
    #[must_use]
    pub const fn frame_size(&self) -> NonZeroUsize { self.frame_size }

    /// Split `message` into frames.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroUsize;
    ///
    /// use wsframe::{fragment::Fragmenter, frame::OpCode, message::Message};
    ///
    /// let fragmenter = Fragmenter::new(NonZeroUsize::new(4).expect("non-zero"));
    /// let frames = fragmenter.fragment(&Message::binary(vec![0u8; 10]));
    ///
    /// let shape: Vec<_> = frames.iter().map(|f| (f.opcode, f.fin)).collect();
    /// assert_eq!(
    ///     shape,
    ///     [
    ///         (OpCode::Binary, false),
    ///         (OpCode::Continuation, false),
    ///         (OpCode::Continuation, true),
    ///     ]
    /// );
    /// ```
    #[must_use]
    pub fn fragment(&self, message: &Message) -> Vec<Frame> {
        let payload = message.wire_payload();
        let size = self.frame_size.get();
        if message.kind().is_control() || payload.len() <= size {
            return vec![Frame::final_frame(message.opcode(), payload)];
        }

        let count = payload.len().div_ceil(size);
        (0..count)
            .map(|index| {
                let start = index * size;
                let end = (start + size).min(payload.len());
                let opcode = if index == 0 {
                    message.opcode()
                } else {
                    OpCode::Continuation
                };
                Frame::new(index + 1 == count, opcode, chunk(&payload, start, end))
            })
            .collect()
    }
}

fn chunk(payload: &Bytes, start: usize, end: usize) -> Bytes { payload.slice(start..end) }
