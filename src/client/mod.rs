//! WebSocket client.
//!
//! A [`Client`] opens one connection through its [`Connector`], follows
//! reconnect requests raised during the handshake, and can either be driven
//! by hand ([`Client::send`], [`Client::receive`]) or by its event loop in
//! [`runtime`].

use std::{fmt, sync::Arc};

use http::Uri;
use log::{info, warn};

use crate::{
    config::WebSocketConfig,
    connection::{Connection, Role},
    error::{Result, WsError},
    hooks::{Handlers, LoopControl, StopHandle},
    message::{Message, DEFAULT_CLOSE_REASON, DEFAULT_CLOSE_STATUS},
    middleware::{Middleware, Pipeline},
    transport::{Connector, Readiness, TcpConnector},
};

pub mod runtime;


/// Poller key of the single connection.
const CONNECTION_KEY: usize = 0;

/// Client side of a WebSocket connection.
///
/// # Examples
///
/// ```no_run
/// use wsframe::{client::Client, config::WebSocketConfig};
///
/// let mut client = Client::new("ws://127.0.0.1:8080/chat", WebSocketConfig::client())?;
/// client.connect()?;
/// client.text("hello")?;
/// let reply = client.receive()?;
/// println!("{}", reply.as_text()?);
/// client.close()?;
/// # Ok::<(), wsframe::error::WsError>(())
/// ```
pub struct Client {
    readiness: Option<Readiness>,
    uri: Uri,
    config: WebSocketConfig,
    connector: Arc<dyn Connector>,
    pipeline: Arc<Pipeline>,
    handlers: Handlers,
    connection: Option<Connection>,
    stop: StopHandle,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("uri", &self.uri)
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client for `uri`. Nothing is opened until
    /// [`Client::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`WsError::BadUri`] when `uri` does not parse or lacks a
    /// scheme or host.
    pub fn new(uri: &str, config: WebSocketConfig) -> Result<Self> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| WsError::BadUri(format!("{uri}: {e}")))?;
        if parsed.scheme().is_none() || parsed.host().is_none() {
            return Err(WsError::BadUri(format!("{uri}: expected ws://host[:port]/path")));
        }
        let readiness = Readiness::new()
            .inspect_err(|e| warn!("no OS poller, probing the stream instead: {e}"))
            .ok();
        let stop = StopHandle::with_waker(readiness.as_ref().map(Readiness::waker));
        Ok(Self {
            uri: parsed,
            config,
            connector: Arc::new(TcpConnector),
            pipeline: Arc::new(Pipeline::standard()),
            handlers: Handlers::default(),
            connection: None,
            readiness,
            stop,
        })
    }

    /// Open streams with `connector` instead of plain TCP.
    #[must_use]
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Append `middleware` to the pipeline used by the next connection.
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        Arc::make_mut(&mut self.pipeline).attach(middleware);
        self
    }

    /// Event handlers fired by [`Client::connect`] and the loop.
    pub fn handlers_mut(&mut self) -> &mut Handlers { &mut self.handlers }

    /// Current target; updated when a redirect is followed.
    #[must_use]
    pub fn uri(&self) -> &Uri { &self.uri }

    #[must_use]
    pub fn config(&self) -> &WebSocketConfig { &self.config }

    /// Handle that stops [`Client::start`] from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle { self.stop.clone() }

    /// Ask the loop to stop at its next iteration.
    pub fn stop(&self) { self.stop.stop(); }

    #[must_use]
    pub fn connection(&self) -> Option<&Connection> { self.connection.as_ref() }

    pub fn connection_mut(&mut self) -> Option<&mut Connection> { self.connection.as_mut() }

    #[must_use]
    pub fn is_connected(&self) -> bool { self.connection.as_ref().is_some_and(Connection::is_connected) }

    /// Subprotocol agreed during the handshake, if any.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> { self.connection.as_ref().and_then(Connection::subprotocol) }

    /// Open a connection and complete the handshake.
    ///
    /// A [`WsError::Reconnect`] raised by the handshake pipeline (see
    /// [`crate::middleware::FollowRedirect`]) is followed by connecting to its
    /// target. A previous connection is released first. Fires the connect
    /// event on success.
    ///
    /// # Errors
    ///
    /// Connector, handshake, and redirect-limit failures.
    pub fn connect(&mut self) -> Result<()> {
        let mut ctl = LoopControl::default();
        let result = self.establish(&mut ctl);
        self.apply(ctl);
        result
    }

    pub(crate) fn establish(&mut self, ctl: &mut LoopControl) -> Result<()> {
        self.release(ctl);
        let conn = loop {
            let stream = self.connector.connect(&self.uri, &self.config)?;
            let mut conn = Connection::new(
                stream,
                self.config.clone(),
                Role::Client,
                Arc::clone(&self.pipeline),
            )?;
            match conn.handshake_client(&self.uri) {
                Ok(()) => break conn,
                Err(WsError::Reconnect { target }) => {
                    conn.disconnect();
                    info!("redirected from {} to {target}", self.uri);
                    self.uri = target;
                }
                Err(e) => {
                    conn.disconnect();
                    return Err(e);
                }
            }
        };
        info!("connected to {}", self.uri);

        let Self {
            connection,
            handlers,
            ..
        } = self;
        let conn = connection.insert(conn);
        if let Err(e) = handlers.connect(conn, ctl) {
            handlers.route_error(Some(conn), e, ctl)?;
        }
        Ok(())
    }

    /// Release the connection, firing the disconnect event.
    pub fn disconnect(&mut self) {
        let mut ctl = LoopControl::default();
        self.release(&mut ctl);
        self.apply(ctl);
    }

    pub(crate) fn release(&mut self, ctl: &mut LoopControl) {
        if let Some(mut conn) = self.connection.take() {
            if let (Some(readiness), Some(source)) = (self.readiness.as_mut(), conn.source()) {
                readiness.forget(CONNECTION_KEY, source);
            }
            conn.disconnect();
            self.handlers.disconnect(&mut conn, ctl);
        }
    }

    fn live(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| WsError::closed("client is not connected"))
    }

    /// Send `message` through the outgoing chain.
    ///
    /// # Errors
    ///
    /// [`WsError::ConnectionClosed`] without a connection; otherwise see
    /// [`Connection::send`].
    pub fn send(&mut self, message: Message) -> Result<()> { self.live()?.send(message) }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub fn text(&mut self, content: impl Into<String>) -> Result<()> { self.live()?.text(content) }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub fn binary(&mut self, content: impl Into<bytes::Bytes>) -> Result<()> {
        self.live()?.binary(content)
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub fn ping(&mut self, content: impl Into<bytes::Bytes>) -> Result<()> { self.live()?.ping(content) }

    /// Send an unsolicited pong.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub fn pong(&mut self, content: impl Into<bytes::Bytes>) -> Result<()> { self.live()?.pong(content) }

    /// Start the closing handshake with 1000 and the default reason.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub fn close(&mut self) -> Result<()> { self.close_with(DEFAULT_CLOSE_STATUS, DEFAULT_CLOSE_REASON) }

    /// Start the closing handshake.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub fn close_with(&mut self, status: u16, reason: &str) -> Result<()> {
        self.live()?.close_with(status, reason)
    }

    /// Pull the next message through the incoming chain.
    ///
    /// # Errors
    ///
    /// [`WsError::ConnectionClosed`] without a connection; otherwise see
    /// [`Connection::receive`].
    pub fn receive(&mut self) -> Result<Message> { self.live()?.receive() }

    /// Carry out requests handlers made.
    pub(crate) fn apply(&mut self, mut ctl: LoopControl) {
        for message in ctl.take_broadcasts() {
            match self.connection.as_mut() {
                Some(conn) if conn.is_writable() => {
                    if let Err(e) = conn.send(message) {
                        warn!("queued send to {} failed: {e}", conn.peer_name());
                    }
                }
                _ => warn!("dropping queued {} message: not connected", message.kind().as_str()),
            }
        }
        if ctl.is_stopped() {
            self.stop.stop();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let (Some(readiness), Some(conn)) = (self.readiness.as_mut(), self.connection.as_ref())
            && let Some(source) = conn.source()
        {
            readiness.forget(CONNECTION_KEY, source);
        }
    }
}
