//! The server event loop.
//!
//! Each iteration prunes released connections, waits for the listener or a
//! connection to become ready, accepts and handshakes new streams, pulls one
//! message from every readable connection, then ticks every connection.

use std::sync::Arc;

use log::{info, warn};

use super::{ACCEPTOR_KEY, Server};
use crate::{
    connection::{Connection, Role},
    error::{Result, WsError},
    hooks::LoopControl,
    metrics,
    transport::{Acceptor, Transport, wait_ready},
};

impl Server {
    /// Serve until stopped.
    ///
    /// Stops when a handler calls [`LoopControl::stop`], when a
    /// [`crate::hooks::StopHandle`] fires, or when a fatal error occurs. All
    /// remaining connections are shut down before returning.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Config`] when the server is not listening, or the
    /// fatal error that ended the loop.
    pub fn start(&mut self) -> Result<()> {
        let Some(name) = self.local_name() else {
            return Err(WsError::Config("server is not bound".into()));
        };
        info!("server listening on {name}");
        let result = loop {
            if self.stop.is_stopped() {
                break Ok(());
            }
            if let Err(e) = self.run_once() {
                break Err(e);
            }
        };
        self.shutdown();
        self.stop.reset();
        info!("server on {name} stopped");
        result
    }

    /// Run one loop iteration.
    ///
    /// # Errors
    ///
    /// Returns a fatal error raised while serving; the loop should stop.
    pub fn run_once(&mut self) -> Result<()> {
        let mut ctl = LoopControl::default();
        self.prune(&mut ctl);

        let (pending, readable) = self.wait()?;
        for stream in pending {
            self.admit(stream, &mut ctl)?;
        }
        for peer in &readable {
            self.serve(peer, &mut ctl)?;
        }

        for conn in self.connections.values_mut() {
            if let Err(e) = conn.tick() {
                self.handlers.route_error(Some(conn), e, &mut ctl)?;
            }
        }
        self.handlers.tick(&mut ctl);
        self.apply(ctl);
        Ok(())
    }

    /// Remove connections whose stream went away.
    fn prune(&mut self, ctl: &mut LoopControl) {
        let gone: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, conn)| !conn.is_connected())
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in gone {
            if let Some(mut conn) = self.connections.remove(&peer) {
                self.unwatch(&peer, &conn);
                metrics::dec_connections();
                info!("released {peer}");
                self.handlers.disconnect(&mut conn, ctl);
            }
        }
    }

    /// Wait for new streams or readable connections.
    ///
    /// Blocks on the poller when every stream has an OS handle, otherwise
    /// probes. Returns early when a stop is requested.
    fn wait(&mut self) -> Result<(Vec<Box<dyn Transport>>, Vec<String>)> {
        let Some((readable, accept)) = self.wait_on_poller()? else {
            return self.wait_by_probing();
        };
        let mut pending = Vec::new();
        if accept && let Some(acceptor) = self.acceptor.as_mut() {
            accept_pending(&mut **acceptor, &mut pending);
        }
        Ok((pending, readable))
    }

    /// `None` when the acceptor or some connection cannot be registered.
    fn wait_on_poller(&mut self) -> Result<Option<(Vec<String>, bool)>> {
        let Self {
            config,
            acceptor,
            connections,
            keys,
            readiness,
            ..
        } = self;
        let (Some(readiness), Some(acceptor)) = (readiness.as_mut(), acceptor.as_ref()) else {
            return Ok(None);
        };
        let Some(listener) = acceptor.source() else {
            return Ok(None);
        };
        let mut watched = Vec::with_capacity(connections.len());
        for (peer, conn) in connections.iter() {
            let (Some(&key), Some(source)) = (keys.get(peer), conn.source()) else {
                return Ok(None);
            };
            watched.push((key, peer, source, conn.is_readable()));
        }

        readiness
            .watch(ACCEPTOR_KEY, listener, true)
            .map_err(WsError::from_transport)?;
        for &(key, _, source, readable) in &watched {
            readiness
                .watch(key, source, readable)
                .map_err(WsError::from_transport)?;
        }
        let ready = readiness
            .wait(config.timeout)
            .map_err(WsError::from_transport)?;
        let readable = watched
            .into_iter()
            .filter(|(key, ..)| ready.contains(key))
            .map(|(_, peer, ..)| peer.clone())
            .collect();
        Ok(Some((readable, ready.contains(&ACCEPTOR_KEY))))
    }

    fn wait_by_probing(&mut self) -> Result<(Vec<Box<dyn Transport>>, Vec<String>)> {
        let Self {
            config,
            acceptor,
            connections,
            stop,
            ..
        } = self;
        let acceptor = acceptor
            .as_mut()
            .ok_or_else(|| WsError::Config("server is not bound".into()))?;
        let mut pending = Vec::new();
        let mut readable = Vec::new();
        wait_ready(config.timeout, || {
            accept_pending(&mut **acceptor, &mut pending);
            readable.clear();
            for (peer, conn) in connections.iter_mut() {
                // a failing probe is surfaced by the read that follows
                if conn.poll_readable().unwrap_or(true) {
                    readable.push(peer.clone());
                }
            }
            Ok(!pending.is_empty() || !readable.is_empty() || stop.is_stopped())
        })
        .map_err(WsError::from_transport)?;
        Ok((pending, readable))
    }

    /// Handshake a new stream and register it.
    fn admit(&mut self, stream: Box<dyn Transport>, ctl: &mut LoopControl) -> Result<()> {
        let peer = stream.peer_name();
        let mut conn = match Connection::new(
            stream,
            self.config.clone(),
            Role::Server,
            Arc::clone(&self.pipeline),
        ) {
            Ok(conn) => conn,
            Err(e) => return self.handlers.route_error(None, e, ctl),
        };
        if let Err(e) = conn.handshake_server() {
            conn.disconnect();
            return self.handlers.route_error(Some(&mut conn), e, ctl);
        }

        let key = self.unique_key(peer);
        self.keys.insert(key.clone(), self.next_key);
        self.next_key += 1;
        metrics::inc_connections();
        info!("accepted {key}");
        let conn = self.connections.entry(key).or_insert(conn);
        if let Err(e) = self.handlers.connect(conn, ctl) {
            self.handlers.route_error(Some(conn), e, ctl)?;
        }
        Ok(())
    }

    /// Pull one message from `peer` and dispatch it.
    fn serve(&mut self, peer: &str, ctl: &mut LoopControl) -> Result<()> {
        let Some(conn) = self.connections.get_mut(peer) else {
            return Ok(());
        };
        if !conn.is_readable() {
            return Ok(());
        }
        let result = conn
            .receive()
            .and_then(|message| self.handlers.dispatch(conn, message, ctl));
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.handlers.route_error(Some(conn), e, ctl),
        }
    }

    /// Carry out requests handlers made during the iteration.
    fn apply(&mut self, mut ctl: LoopControl) {
        for message in ctl.take_broadcasts() {
            self.broadcast(&message);
        }
        if ctl.is_stopped() {
            self.stop.stop();
        }
    }
}

/// Accept every stream already pending on `acceptor`.
fn accept_pending(acceptor: &mut dyn Acceptor, pending: &mut Vec<Box<dyn Transport>>) {
    loop {
        match acceptor.poll_accept() {
            Ok(Some(stream)) => pending.push(stream),
            Ok(None) => break,
            Err(e) => {
                warn!("accept on {} failed: {e}", acceptor.local_name());
                break;
            }
        }
    }
}
