//! Automatic pong replies.

use super::{Capabilities, Middleware, Stack};
use crate::{
    connection::Connection,
    error::Result,
    message::{Message, MessageKind},
};

/// Answers every incoming ping with a pong carrying the same payload.
///
/// The pong is written before the ping is handed on, so it precedes anything
/// the application sends in reaction. Nothing is sent once the write side is
/// closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct PingResponder;

impl Middleware for PingResponder {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.incoming() }

    fn incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<Message> {
        let message = stack.handle_incoming(conn)?;
        if message.kind() == MessageKind::Ping && conn.is_writable() {
            tracing::trace!(peer = conn.peer_name(), "answering ping");
            conn.send(Message::pong(message.content().clone()))?;
        }
        Ok(message)
    }
}
