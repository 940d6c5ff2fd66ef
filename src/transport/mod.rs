//! Byte-stream collaborators consumed by the protocol engine.
//!
//! The engine never opens sockets itself. It talks to a [`Transport`]
//! (one bidirectional stream), an [`Acceptor`] (source of new server-side
//! streams), and a [`Connector`] (opens a client-side stream for a URI).
//! TCP implementations live in [`tcp`]; [`memory`] provides an in-process
//! duplex used by tests.
//!
//! Socket-backed streams expose a [`Source`] so the loops can block on a
//! [`Readiness`] poller. Streams without one, such as [`memory`] duplexes,
//! fall back to [`wait_ready`], which polls the caller's probe until it
//! reports readiness or the timeout elapses. Everything runs on the
//! caller's thread.

pub mod memory;
pub mod readiness;
pub mod tcp;

use std::{
    io::{self, Read, Write},
    net::Shutdown,
    thread,
    time::{Duration, Instant},
};

use http::Uri;

pub use readiness::{Readiness, Source, Waker};
pub use tcp::{TcpAcceptor, TcpConnector, TcpTransport};

use crate::{config::WebSocketConfig, error::Result};

/// Granularity of [`wait_ready`] polling for streams without a [`Source`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// One bidirectional byte stream.
///
/// Reads and writes block, bounded by the timeout set through
/// [`Transport::set_timeout`]. Errors are plain [`io::Error`]s; the connection
/// classifies them.
pub trait Transport: Read + Write + Send {
    /// Identity of the remote end, used as the server's connection key.
    fn peer_name(&self) -> String;

    /// `false` once the stream has been closed locally.
    fn is_connected(&self) -> bool;

    /// Non-blocking check for pending input. End of stream counts as
    /// readable so the next read can observe it.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying readiness probe.
    fn poll_readable(&mut self) -> io::Result<bool>;

    /// Shut down one or both directions.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying shutdown call.
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()>;

    /// Release the stream. Further I/O fails.
    fn close(&mut self);

    /// Bound blocking reads and writes.
    ///
    /// # Errors
    ///
    /// Propagates failures applying the timeout.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// OS handle for [`Readiness`] registration. `None` means the loop
    /// polls [`Transport::poll_readable`] instead.
    ///
    /// The handle must stay valid until the transport is dropped, even
    /// after [`Transport::close`].
    fn source(&self) -> Option<Source<'_>> { None }
}

/// Source of server-side streams.
pub trait Acceptor: Send {
    /// Accept one pending stream without blocking.
    ///
    /// # Errors
    ///
    /// Propagates accept failures other than "nothing pending".
    fn poll_accept(&mut self) -> io::Result<Option<Box<dyn Transport>>>;

    /// Local address or name of the listening endpoint.
    fn local_name(&self) -> String;

    /// OS handle for [`Readiness`] registration, if the acceptor has one.
    fn source(&self) -> Option<Source<'_>> { None }
}

/// Opens client-side streams.
pub trait Connector: Send + Sync {
    /// Open a stream to the host named by `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WsError::BadUri`] for unusable URIs and a
    /// transport-classified error when the connection attempt fails.
    fn connect(&self, uri: &Uri, config: &WebSocketConfig) -> Result<Box<dyn Transport>>;
}

/// Poll `probe` until it reports readiness or `timeout` elapses.
///
/// The probe is always called at least once, so a zero timeout performs a
/// single non-blocking check. Returns whether the probe reported readiness.
///
/// # Errors
///
/// Propagates the first error returned by `probe`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use wsframe::transport::wait_ready;
///
/// let mut calls = 0;
/// let ready = wait_ready(Duration::from_secs(1), || {
///     calls += 1;
///     Ok(calls == 3)
/// })
/// .expect("probe never fails");
/// assert!(ready);
/// assert_eq!(calls, 3);
/// ```
pub fn wait_ready<F>(timeout: Duration, mut probe: F) -> io::Result<bool>
where
    F: FnMut() -> io::Result<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe()? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
