//! The client event loop.

use log::info;

use super::{CONNECTION_KEY, Client};
use crate::{
    error::{Result, WsError},
    hooks::LoopControl,
    transport::wait_ready,
};

impl Client {
    /// Connect if needed and serve the connection until stopped.
    ///
    /// The loop ends when a handler calls [`LoopControl::stop`], a
    /// [`crate::hooks::StopHandle`] fires, the connection goes away, or a
    /// fatal error occurs. A [`WsError::Reconnect`] raised while serving
    /// reconnects to its target instead of ending the loop.
    ///
    /// # Errors
    ///
    /// The connect failure or fatal error that ended the loop. The
    /// connection is released in that case.
    pub fn start(&mut self) -> Result<()> {
        if !self.is_connected() {
            self.connect()?;
        }
        let result = loop {
            if self.stop.is_stopped() {
                break Ok(());
            }
            if let Err(e) = self.run_once() {
                break Err(e);
            }
        };
        if result.is_err() {
            self.disconnect();
        }
        self.stop.reset();
        result
    }

    /// Run one loop iteration.
    ///
    /// # Errors
    ///
    /// A fatal error, or [`WsError::ConnectionClosed`] when there is no
    /// connection to serve.
    pub fn run_once(&mut self) -> Result<()> {
        let mut ctl = LoopControl::default();
        let Some(conn) = self.connection.as_mut() else {
            return Err(WsError::closed("client is not connected"));
        };
        if !conn.is_connected() {
            info!("connection to {} ended", self.uri);
            self.release(&mut ctl);
            ctl.stop();
            self.apply(ctl);
            return Ok(());
        }

        let readable = if let (Some(readiness), Some(source)) = (self.readiness.as_mut(), conn.source()) {
            readiness
                .watch(CONNECTION_KEY, source, conn.is_readable())
                .and_then(|()| readiness.wait(self.config.timeout))
                .map_err(WsError::from_transport)?
                .contains(&CONNECTION_KEY)
        } else {
            let stop = &self.stop;
            let mut readable = false;
            wait_ready(self.config.timeout, || {
                // a failing probe is surfaced by the read that follows
                readable = conn.poll_readable().unwrap_or(true);
                Ok(readable || stop.is_stopped())
            })
            .map_err(WsError::from_transport)?;
            readable
        };

        if readable {
            let result = conn
                .receive()
                .and_then(|message| self.handlers.dispatch(conn, message, &mut ctl));
            if let Err(e) = result {
                self.handle_error(e, &mut ctl)?;
            }
        }
        if let Some(conn) = self.connection.as_mut()
            && let Err(e) = conn.tick()
        {
            self.handle_error(e, &mut ctl)?;
        }
        self.handlers.tick(&mut ctl);
        self.apply(ctl);
        Ok(())
    }

    fn handle_error(&mut self, err: WsError, ctl: &mut LoopControl) -> Result<()> {
        match err {
            WsError::Reconnect { target } => {
                info!("reconnecting from {} to {target}", self.uri);
                self.release(ctl);
                self.uri = target;
                self.establish(ctl)
            }
            err => self.handlers.route_error(self.connection.as_mut(), err, ctl),
        }
    }
}
