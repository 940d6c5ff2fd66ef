//! Keep-alive pings.

use std::time::{Duration, Instant};

use super::{Capabilities, Middleware, Stack};
use crate::{
    connection::Connection,
    error::Result,
    message::Message,
};

/// Metadata key holding the next ping deadline as an [`Instant`].
pub const DEADLINE_KEY: &str = "ping_interval.next";

/// Sends an unsolicited ping whenever the connection has been quiet for an
/// interval.
///
/// The deadline lives in connection metadata under [`DEADLINE_KEY`]. Every
/// outgoing message pushes it back, so pings only go out on idle
/// connections. Without an explicit interval the connection timeout is used.
#[derive(Clone, Copy, Debug, Default)]
pub struct PingInterval {
    interval: Option<Duration>,
}

impl PingInterval {
    /// Ping every `interval`, or every connection timeout when `None`.
    #[must_use]
    pub const fn new(interval: Option<Duration>) -> Self { Self { interval } }

    fn interval(&self, conn: &Connection) -> Duration {
        self.interval.unwrap_or(conn.config().timeout)
    }

    fn reset(&self, conn: &mut Connection) {
        let next = Instant::now() + self.interval(conn);
        conn.set_meta(DEADLINE_KEY, next);
    }
}

impl Middleware for PingInterval {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.outgoing().tick() }

    fn tick(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<()> {
        match conn.meta::<Instant>(DEADLINE_KEY).copied() {
            None => self.reset(conn),
            Some(deadline) if Instant::now() >= deadline && conn.is_writable() => {
                tracing::trace!(peer = conn.peer_name(), "interval ping");
                conn.send(Message::ping(bytes::Bytes::new()))?;
                self.reset(conn);
            }
            Some(_) => {}
        }
        stack.handle_tick(conn)
    }

    fn outgoing(&self, stack: Stack<'_>, conn: &mut Connection, message: Message) -> Result<()> {
        stack.handle_outgoing(conn, message)?;
        self.reset(conn);
        Ok(())
    }
}
