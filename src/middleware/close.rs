//! Closing handshake.

use log::debug;

use super::{Capabilities, Middleware, Stack};
use crate::{
    connection::{Connection, ConnectionState},
    error::Result,
    message::{CloseCode, Message, MessageKind},
};

/// Drives the closing handshake from the close messages passing through.
///
/// Outgoing close:
/// - while `Open`, written and then the write side is shut (`WriteClosed`);
/// - while `ReadClosed` it is the acknowledgement: written, then `Closed`.
///
/// Incoming close:
/// - while `Open`, the read side is shut (`ReadClosed`) and an
///   acknowledgement echoing the status is sent, which reaches `Closed`
///   even when the peer is already gone;
/// - while `WriteClosed` it acknowledges our close: `Closed`, no reply.
///
/// Every message is forwarded unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct CloseHandler;

impl Middleware for CloseHandler {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.incoming().outgoing() }

    fn incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<Message> {
        let message = stack.handle_incoming(conn)?;
        if message.kind() != MessageKind::Close {
            return Ok(message);
        }
        match conn.state() {
            ConnectionState::Open => {
                debug!("peer {} started closing", conn.peer_name());
                conn.close_read();
                let status = message.close_status().unwrap_or(CloseCode::NO_STATUS);
                if let Err(err) = conn.send(Message::close(status, "")) {
                    debug!("close ack to {} failed: {err}", conn.peer_name());
                    conn.disconnect();
                }
            }
            ConnectionState::WriteClosed => {
                debug!("peer {} acknowledged close", conn.peer_name());
                conn.disconnect();
            }
            ConnectionState::ReadClosed | ConnectionState::Closed => {}
        }
        Ok(message)
    }

    fn outgoing(&self, stack: Stack<'_>, conn: &mut Connection, message: Message) -> Result<()> {
        if message.kind() != MessageKind::Close {
            return stack.handle_outgoing(conn, message);
        }
        match conn.state() {
            ConnectionState::Open => {
                stack.handle_outgoing(conn, message)?;
                conn.close_write();
                Ok(())
            }
            ConnectionState::ReadClosed => {
                stack.handle_outgoing(conn, message)?;
                conn.disconnect();
                Ok(())
            }
            ConnectionState::WriteClosed | ConnectionState::Closed => {
                debug!("close already sent to {}", conn.peer_name());
                Ok(())
            }
        }
    }
}
