//! TCP echo server running on a background thread.

use std::{
    net::SocketAddr,
    thread::{self, JoinHandle},
};

use wsframe::{
    Result,
    Server,
    WebSocketConfig,
    WsError,
    hooks::StopHandle,
    test_helpers::TEST_TIMEOUT,
};

/// Echo server bound to an ephemeral loopback port.
///
/// Text and binary messages are sent back unchanged. The loop stops when the
/// value is dropped.
pub struct EchoServer {
    addr: SocketAddr,
    stop: StopHandle,
    thread: Option<JoinHandle<Result<()>>>,
}

impl EchoServer {
    /// Start an echo server with the standard pipeline.
    ///
    /// # Errors
    ///
    /// Fails when no loopback port can be bound.
    pub fn start() -> Result<Self> { Self::start_with(|_| {}) }

    /// Start an echo server after `configure` adjusted it.
    ///
    /// `configure` may attach middleware or replace handlers; the echo
    /// handlers are installed first.
    ///
    /// # Errors
    ///
    /// Fails when no loopback port can be bound.
    pub fn start_with<F>(configure: F) -> Result<Self>
    where
        F: FnOnce(&mut Server),
    {
        let mut server =
            Server::new(WebSocketConfig::server().timeout(TEST_TIMEOUT)).bind("127.0.0.1:0")?;
        server
            .handlers_mut()
            .on_text(|conn, message, _| conn.send(message))
            .on_binary(|conn, message, _| conn.send(message));
        configure(&mut server);
        let addr = server
            .local_addr()
            .ok_or_else(|| WsError::Config("echo server has no address".into()))?;
        let stop = server.stop_handle();
        let thread = thread::spawn(move || server.start());
        Ok(Self {
            addr,
            stop,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// `ws://` URI for `path` on this server.
    #[must_use]
    pub fn uri(&self, path: &str) -> String { format!("ws://{}{path}", self.addr) }

    /// Stop the loop and return its result.
    ///
    /// # Errors
    ///
    /// The fatal error that ended the loop, if any.
    pub fn shutdown(mut self) -> Result<()> { self.join() }

    fn join(&mut self) -> Result<()> {
        self.stop.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(WsError::Config("echo server panicked".into()))),
            None => Ok(()),
        }
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            log::warn!("echo server ended with {e}");
        }
    }
}
