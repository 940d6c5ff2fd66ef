//! Event handlers invoked by the client and server loops.
//!
//! [`Handlers`] stores one optional callback per event. Callbacks receive a
//! [`LoopControl`] through which they can stop the loop or queue a broadcast;
//! the loop applies those requests after the current iteration.
//! [`StopHandle`] stops a loop from another thread.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{error, warn};

use crate::{
    connection::Connection,
    error::{Result, Severity, WsError},
    message::{Message, MessageKind},
    metrics,
    transport::Waker,
};

/// Requests a handler makes of the running loop.
#[derive(Debug, Default)]
pub struct LoopControl {
    stop: bool,
    broadcasts: Vec<Message>,
}

impl LoopControl {
    /// Stop the loop at the end of this iteration.
    pub fn stop(&mut self) { self.stop = true; }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.stop }

    /// Send `message` to every writable connection after this iteration.
    pub fn broadcast(&mut self, message: Message) { self.broadcasts.push(message); }

    pub(crate) fn take_broadcasts(&mut self) -> Vec<Message> { std::mem::take(&mut self.broadcasts) }
}

/// Stops a running loop from outside it.
///
/// The loop notices at its next readiness wait; a loop blocked on its poller
/// is woken. A stop requested before the loop starts ends it at once.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    waker: Option<Waker>,
}

impl StopHandle {
    pub(crate) fn with_waker(waker: Option<Waker>) -> Self {
        Self {
            flag: Arc::default(),
            waker,
        }
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Some(waker) = &self.waker {
            waker.wake();
        }
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.flag.load(Ordering::SeqCst) }

    pub(crate) fn reset(&self) { self.flag.store(false, Ordering::SeqCst); }
}

/// Type alias for connect and disconnect callbacks.
type ConnectionHook = Box<dyn FnMut(&mut Connection, &mut LoopControl) -> Result<()> + Send>;

/// Type alias for per-message callbacks.
type MessageHook =
    Box<dyn FnMut(&mut Connection, Message, &mut LoopControl) -> Result<()> + Send>;

/// Type alias for the error callback. The connection is `None` for fatal
/// errors.
type ErrorHook = Box<dyn FnMut(Option<&mut Connection>, &WsError, &mut LoopControl) + Send>;

/// Type alias for the per-iteration tick callback.
type TickHook = Box<dyn FnMut(&mut LoopControl) + Send>;

/// Callbacks for loop events. Unset events are ignored.
#[derive(Default)]
pub struct Handlers {
    on_connect: Option<ConnectionHook>,
    on_disconnect: Option<ConnectionHook>,
    on_text: Option<MessageHook>,
    on_binary: Option<MessageHook>,
    on_ping: Option<MessageHook>,
    on_pong: Option<MessageHook>,
    on_close: Option<MessageHook>,
    on_error: Option<ErrorHook>,
    on_tick: Option<TickHook>,
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_text", &self.on_text.is_some())
            .field("on_binary", &self.on_binary.is_some())
            .field("on_ping", &self.on_ping.is_some())
            .field("on_pong", &self.on_pong.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_tick", &self.on_tick.is_some())
            .finish()
    }
}

macro_rules! message_setter {
    ($(#[$doc:meta])* $name:ident, $field:ident) => {
        $(#[$doc])*
        pub fn $name<F>(&mut self, f: F) -> &mut Self
        where
            F: FnMut(&mut Connection, Message, &mut LoopControl) -> Result<()> + Send + 'static,
        {
            self.$field = Some(Box::new(f));
            self
        }
    };
}

impl Handlers {
    /// Called after a connection completed its handshake.
    pub fn on_connect<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&mut Connection, &mut LoopControl) -> Result<()> + Send + 'static,
    {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// Called once a connection has gone away.
    pub fn on_disconnect<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&mut Connection, &mut LoopControl) -> Result<()> + Send + 'static,
    {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    message_setter!(
        /// Called for each text message.
        on_text, on_text
    );
    message_setter!(
        /// Called for each binary message.
        on_binary, on_binary
    );
    message_setter!(
        /// Called for each ping, after any automatic pong.
        on_ping, on_ping
    );
    message_setter!(
        /// Called for each pong.
        on_pong, on_pong
    );
    message_setter!(
        /// Called for the peer's close or close acknowledgement.
        on_close, on_close
    );

    /// Called for message-level and fatal errors.
    pub fn on_error<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(Option<&mut Connection>, &WsError, &mut LoopControl) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called once per loop iteration after all connections ticked.
    pub fn on_tick<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&mut LoopControl) + Send + 'static,
    {
        self.on_tick = Some(Box::new(f));
        self
    }

    pub(crate) fn connect(&mut self, conn: &mut Connection, ctl: &mut LoopControl) -> Result<()> {
        self.on_connect.as_mut().map_or(Ok(()), |hook| hook(conn, ctl))
    }

    pub(crate) fn disconnect(&mut self, conn: &mut Connection, ctl: &mut LoopControl) {
        if let Some(hook) = &mut self.on_disconnect
            && let Err(err) = hook(conn, ctl)
        {
            warn!("disconnect handler for {} failed: {err}", conn.peer_name());
        }
    }

    /// Route `message` to the callback for its kind.
    pub(crate) fn dispatch(
        &mut self,
        conn: &mut Connection,
        message: Message,
        ctl: &mut LoopControl,
    ) -> Result<()> {
        let hook = match message.kind() {
            MessageKind::Text => &mut self.on_text,
            MessageKind::Binary => &mut self.on_binary,
            MessageKind::Ping => &mut self.on_ping,
            MessageKind::Pong => &mut self.on_pong,
            MessageKind::Close => &mut self.on_close,
        };
        hook.as_mut().map_or(Ok(()), |hook| hook(conn, message, ctl))
    }

    pub(crate) fn tick(&mut self, ctl: &mut LoopControl) {
        if let Some(hook) = &mut self.on_tick {
            hook(ctl);
        }
    }

    /// Apply loop policy to `err` raised while serving `conn`.
    ///
    /// - message-level: logged and reported, the connection stays;
    /// - connection-level: logged and the connection released;
    /// - fatal: reported with no connection, the loop is asked to stop and the error is returned.
    pub(crate) fn route_error(
        &mut self,
        conn: Option<&mut Connection>,
        err: WsError,
        ctl: &mut LoopControl,
    ) -> Result<()> {
        let severity = err.severity();
        metrics::inc_errors(severity);
        let peer = conn
            .as_ref()
            .map_or_else(|| "-".to_owned(), |c| c.peer_name().to_owned());
        match severity {
            Severity::Message => {
                warn!("message error from {peer}: {err}");
                if let Some(hook) = &mut self.on_error {
                    hook(conn, &err, ctl);
                }
                Ok(())
            }
            Severity::Connection => {
                warn!("dropping connection to {peer}: {err}");
                if let Some(conn) = conn {
                    conn.disconnect();
                }
                Ok(())
            }
            Severity::Fatal => {
                error!("fatal error, stopping loop: {err}");
                if let Some(hook) = &mut self.on_error {
                    hook(None, &err, ctl);
                }
                ctl.stop();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;

    use super::{Handlers, LoopControl};
    use crate::{
        connection::Connection,
        error::{Result, WsError},
        message::Message,
        middleware::Pipeline,
        test_helpers::handshaken_pair,
    };

    #[rstest]
    #[case::text(Message::text("t"), "text")]
    #[case::binary(Message::binary(vec![1u8]), "binary")]
    #[case::ping(Message::ping("p"), "ping")]
    #[case::pong(Message::pong("p"), "pong")]
    #[case::close(Message::close(1000, "c"), "close")]
    fn messages_reach_the_handler_for_their_kind(#[case] message: Message, #[case] expected: &str) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = Handlers::default();
        let record = |label: &'static str| {
            let seen = Arc::clone(&seen);
            move |_: &mut Connection, _: Message, _: &mut LoopControl| -> Result<()> {
                seen.lock().expect("lock").push(label);
                Ok(())
            }
        };
        handlers
            .on_text(record("text"))
            .on_binary(record("binary"))
            .on_ping(record("ping"))
            .on_pong(record("pong"))
            .on_close(record("close"));

        let (mut conn, _peer) = handshaken_pair(Pipeline::new(), Pipeline::new()).expect("pair");
        let mut ctl = LoopControl::default();
        handlers.dispatch(&mut conn, message, &mut ctl).expect("dispatch");
        assert_eq!(*seen.lock().expect("lock"), [expected]);
    }

    #[test]
    fn fatal_errors_stop_the_loop_and_report_no_connection() {
        let reported = Arc::new(Mutex::new(None));
        let mut handlers = Handlers::default();
        let sink = Arc::clone(&reported);
        handlers.on_error(move |conn, err, _| {
            *sink.lock().expect("lock") = Some((conn.is_none(), err.to_string()));
        });

        let mut ctl = LoopControl::default();
        let err = handlers
            .route_error(None, WsError::Config("bad".into()), &mut ctl)
            .expect_err("fatal");
        assert!(matches!(err, WsError::Config(_)));
        assert!(ctl.is_stopped());
        let reported = reported.lock().expect("lock").clone().expect("reported");
        assert!(reported.0);
    }

    #[test]
    fn connection_errors_release_the_connection() {
        let (mut conn, _peer) = handshaken_pair(Pipeline::new(), Pipeline::new()).expect("pair");
        let mut handlers = Handlers::default();
        let mut ctl = LoopControl::default();
        handlers
            .route_error(Some(&mut conn), WsError::closed("gone"), &mut ctl)
            .expect("handled");
        assert!(!conn.is_connected());
        assert!(!ctl.is_stopped());
    }

    #[test]
    fn message_errors_keep_the_connection() {
        let (mut conn, _peer) = handshaken_pair(Pipeline::new(), Pipeline::new()).expect("pair");
        let mut handlers = Handlers::default();
        let mut ctl = LoopControl::default();
        handlers
            .route_error(Some(&mut conn), WsError::InvalidUtf8, &mut ctl)
            .expect("handled");
        assert!(conn.is_connected());
    }
}
