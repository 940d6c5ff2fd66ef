//! WebSocket server driving many connections from one thread.
//!
//! A [`Server`] owns an [`Acceptor`], the middleware [`Pipeline`] applied to
//! every accepted connection, and the [`Handlers`] fired by its event loop.
//! The loop itself lives in [`runtime`].

use std::{
    collections::BTreeMap,
    fmt,
    net::{SocketAddr, ToSocketAddrs},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    config::WebSocketConfig,
    connection::Connection,
    error::{Result, WsError},
    hooks::{Handlers, LoopControl, StopHandle},
    message::{CloseCode, Message},
    metrics,
    middleware::{Middleware, Pipeline},
    transport::{Acceptor, Readiness, TcpAcceptor},
};

pub mod runtime;

#[cfg(test)]
mod tests;

/// Close reason sent to every connection on [`Server::shutdown`].
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// Poller key of the acceptor; connections count up from 1.
const ACCEPTOR_KEY: usize = 0;

/// Accepts WebSocket connections and serves them on the calling thread.
pub struct Server {
    readiness: Option<Readiness>,
    config: WebSocketConfig,
    acceptor: Option<Box<dyn Acceptor>>,
    bound: Option<SocketAddr>,
    pipeline: Arc<Pipeline>,
    handlers: Handlers,
    connections: BTreeMap<String, Connection>,
    keys: BTreeMap<String, usize>,
    next_key: usize,
    stop: StopHandle,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("listening", &self.local_name())
            .field("pipeline", &self.pipeline)
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Create an unbound server.
    ///
    /// Connections get [`Pipeline::standard`] unless more middleware is
    /// attached with [`Server::add_middleware`].
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        let readiness = Readiness::new()
            .inspect_err(|e| warn!("no OS poller, probing streams instead: {e}"))
            .ok();
        let stop = StopHandle::with_waker(readiness.as_ref().map(Readiness::waker));
        Self {
            config,
            acceptor: None,
            bound: None,
            pipeline: Arc::new(Pipeline::standard()),
            handlers: Handlers::default(),
            connections: BTreeMap::new(),
            readiness,
            keys: BTreeMap::new(),
            next_key: ACCEPTOR_KEY + 1,
            stop,
        }
    }

    /// Listen on a TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Config`] when the address cannot be bound.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wsframe::{config::WebSocketConfig, server::Server};
    ///
    /// let server = Server::new(WebSocketConfig::server()).bind("127.0.0.1:0")?;
    /// assert!(server.local_addr().is_some());
    /// # Ok::<(), wsframe::error::WsError>(())
    /// ```
    pub fn bind(mut self, addr: impl ToSocketAddrs) -> Result<Self> {
        let acceptor = TcpAcceptor::bind(addr, &self.config)
            .map_err(|e| WsError::Config(format!("bind failed: {e}")))?;
        self.unwatch_acceptor();
        self.bound = acceptor.local_addr().ok();
        self.acceptor = Some(Box::new(acceptor));
        Ok(self)
    }

    /// Accept streams from a custom acceptor instead of TCP.
    #[must_use]
    pub fn with_acceptor(mut self, acceptor: impl Acceptor + 'static) -> Self {
        self.unwatch_acceptor();
        self.bound = None;
        self.acceptor = Some(Box::new(acceptor));
        self
    }

    /// Bound TCP address, if listening via [`Server::bind`].
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.bound }

    /// Name of the listening endpoint, if any.
    #[must_use]
    pub fn local_name(&self) -> Option<String> { self.acceptor.as_ref().map(|a| a.local_name()) }

    /// Append `middleware` to the pipeline of connections accepted from now
    /// on.
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        Arc::make_mut(&mut self.pipeline).attach(middleware);
        self
    }

    /// Pipeline given to newly accepted connections.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline { &self.pipeline }

    /// Event handlers fired by the loop.
    pub fn handlers_mut(&mut self) -> &mut Handlers { &mut self.handlers }

    #[must_use]
    pub fn config(&self) -> &WebSocketConfig { &self.config }

    /// Handle that stops [`Server::start`] from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle { self.stop.clone() }

    /// Ask the loop to stop at its next iteration.
    pub fn stop(&self) { self.stop.stop(); }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize { self.connections.len() }

    /// Registered connection keyed by `peer`.
    #[must_use]
    pub fn connection(&self, peer: &str) -> Option<&Connection> { self.connections.get(peer) }

    /// Keys of registered connections in order.
    pub fn peers(&self) -> impl Iterator<Item = &str> { self.connections.keys().map(String::as_str) }

    /// Send `message` to every writable connection.
    ///
    /// Returns how many connections accepted it. Failures are logged; a
    /// connection-level failure releases that connection.
    pub fn broadcast(&mut self, message: &Message) -> usize {
        let mut sent = 0;
        for conn in self.connections.values_mut().filter(|c| c.is_writable()) {
            match conn.send(message.clone()) {
                Ok(()) => sent += 1,
                Err(e) => warn!("broadcast to {} failed: {e}", conn.peer_name()),
            }
        }
        sent
    }

    /// Close and release every connection.
    ///
    /// Writable connections are sent a `1001 Going Away` close first. A
    /// disconnect event fires for each connection.
    pub fn shutdown(&mut self) {
        let mut ctl = LoopControl::default();
        for (peer, mut conn) in std::mem::take(&mut self.connections) {
            self.unwatch(&peer, &conn);
            if conn.is_writable()
                && let Err(e) = conn.close_with(CloseCode::GOING_AWAY, SHUTDOWN_REASON)
            {
                debug!("close to {} during shutdown failed: {e}", conn.peer_name());
            }
            conn.disconnect();
            metrics::dec_connections();
            self.handlers.disconnect(&mut conn, &mut ctl);
        }
    }

    /// Drop `conn`'s poller registration before it is released.
    fn unwatch(&mut self, peer: &str, conn: &Connection) {
        if let Some(key) = self.keys.remove(peer)
            && let (Some(readiness), Some(source)) = (self.readiness.as_mut(), conn.source())
        {
            readiness.forget(key, source);
        }
    }

    fn unwatch_acceptor(&mut self) {
        if let (Some(readiness), Some(acceptor)) = (self.readiness.as_mut(), self.acceptor.as_ref())
            && let Some(source) = acceptor.source()
        {
            readiness.forget(ACCEPTOR_KEY, source);
        }
    }

    /// Key for `peer` that does not collide with a registered connection.
    fn unique_key(&self, peer: String) -> String {
        if !self.connections.contains_key(&peer) {
            return peer;
        }
        let free = (2u32..)
            .map(|n| format!("{peer}#{n}"))
            .find(|key| !self.connections.contains_key(key));
        free.unwrap_or(peer)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let Self {
            readiness,
            connections,
            keys,
            ..
        } = self;
        if let Some(readiness) = readiness.as_mut() {
            for (peer, key) in std::mem::take(keys) {
                if let Some(source) = connections.get(&peer).and_then(Connection::source) {
                    readiness.forget(key, source);
                }
            }
        }
        self.unwatch_acceptor();
    }
}
