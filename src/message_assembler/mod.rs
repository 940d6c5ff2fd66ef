//! Pull-side defragmentation of frames into messages.
//!
//! [`MessageAssembler::assemble`] decodes frames from a blocking reader until
//! one complete [`Message`] is available:
//!
//! - control frames (close, ping, pong) are returned at once, even between the fragments of a data
//!   message, without disturbing the open message;
//! - a text or binary frame with FIN cleared opens a message that continuation frames extend until
//!   one arrives with FIN set;
//! - a continuation with nothing open, or a new data frame while a message is open, is a
//!   connection-level protocol violation.

mod state;

use std::io::Read;

pub use state::{AssemblyState, AssemblyStatus};

use crate::{
    codec::{self, DecodeOptions},
    error::Result,
    message::{Message, MessageKind},
};

/// Reads frames and yields complete messages.
#[derive(Debug)]
pub struct MessageAssembler {
    opts: DecodeOptions,
    state: AssemblyState,
}

impl MessageAssembler {
    /// Create an assembler applying `opts` to every decoded frame.
    ///
    /// `opts.max_payload` also caps the size of an assembled message.
    #[must_use]
    pub fn new(opts: DecodeOptions) -> Self {
        Self {
            opts,
            state: AssemblyState::new(opts.max_payload),
        }
    }

    /// Decode options in use.
    #[must_use]
    pub fn options(&self) -> DecodeOptions { self.opts }

    /// Whether a fragmented data message is open.
    #[must_use]
    pub fn is_assembling(&self) -> bool { self.state.is_assembling() }

    /// Drop any open message, e.g. after the connection failed.
    pub fn reset(&mut self) { self.state.reset(); }

    /// Pull frames from `reader` until a message completes.
    ///
    /// # Errors
    ///
    /// - [`crate::error::WsError::BadOpcode`] and [`crate::error::WsError::InvalidUtf8`] are
    ///   message-level; the assembler stays usable.
    /// - [`crate::error::WsError::Protocol`] and transport errors are connection-level.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroUsize;
    ///
    /// use wsframe::{
    ///     codec::{self, DecodeOptions},
    ///     fragment::Fragmenter,
    ///     message::Message,
    ///     message_assembler::MessageAssembler,
    /// };
    ///
    /// let fragmenter = Fragmenter::new(NonZeroUsize::new(2).expect("non-zero"));
    /// let mut wire = Vec::new();
    /// for frame in fragmenter.fragment(&Message::text("hello")) {
    ///     wire.extend_from_slice(&codec::encode(&frame, false));
    /// }
    ///
    /// let mut assembler = MessageAssembler::new(DecodeOptions::default());
    /// let msg = assembler.assemble(&mut &wire[..]).expect("assemble");
    /// assert_eq!(msg.as_text().expect("utf8"), "hello");
    /// ```
    pub fn assemble<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<Message> {
        loop {
            let frame = codec::decode(reader, self.opts)?;
            crate::metrics::inc_frames(crate::metrics::Direction::Inbound);
            tracing::trace!(opcode = ?frame.opcode, fin = frame.fin, len = frame.payload.len(), "frame received");

            if let AssemblyStatus::Complete(message) = self.state.accept(frame)? {
                if message.kind() == MessageKind::Text {
                    message.as_text()?;
                }
                return Ok(message);
            }
        }
    }
}
