//! In-process streams.
//!
//! [`duplex`] returns two connected [`MemoryTransport`] ends. Bytes written to
//! one end are read from the other. Reads block until data arrives, the
//! writing end shuts down, or the read timeout elapses. [`listener`] pairs an
//! [`Acceptor`] with a [`Connector`] so whole client and server loops can run
//! without sockets.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::Shutdown,
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use http::Uri;

use super::{Acceptor, Connector, Transport};
use crate::{
    config::WebSocketConfig,
    error::{Result, WsError},
};

#[derive(Debug, Default)]
struct Pipe {
    buf: VecDeque<u8>,
    writer_closed: bool,
    reader_closed: bool,
}

#[derive(Debug, Default)]
struct Channel {
    pipe: Mutex<Pipe>,
    ready: Condvar,
}

impl Channel {
    fn lock(&self) -> MutexGuard<'_, Pipe> { self.pipe.lock().unwrap_or_else(PoisonError::into_inner) }

    fn close_writer(&self) {
        self.lock().writer_closed = true;
        self.ready.notify_all();
    }

    fn close_reader(&self) {
        let mut pipe = self.lock();
        pipe.reader_closed = true;
        pipe.buf.clear();
        drop(pipe);
        self.ready.notify_all();
    }
}

/// One end of an in-memory duplex stream.
#[derive(Debug)]
pub struct MemoryTransport {
    name: String,
    inbound: Arc<Channel>,
    outbound: Arc<Channel>,
    timeout: Option<Duration>,
    closed: bool,
}

/// Create a connected pair named `a` and `b`.
///
/// Each end reports the other's name as its peer.
///
/// # Examples
///
/// ```
/// use std::io::{Read, Write};
///
/// use wsframe::transport::memory::duplex;
///
/// let (mut a, mut b) = duplex("a", "b");
/// a.write_all(b"ping").expect("write");
/// let mut buf = [0u8; 4];
/// b.read_exact(&mut buf).expect("read");
/// assert_eq!(&buf, b"ping");
/// ```
#[must_use]
pub fn duplex(a: &str, b: &str) -> (MemoryTransport, MemoryTransport) {
    let a_to_b = Arc::new(Channel::default());
    let b_to_a = Arc::new(Channel::default());
    let first = MemoryTransport {
        name: b.to_owned(),
        inbound: Arc::clone(&b_to_a),
        outbound: Arc::clone(&a_to_b),
        timeout: None,
        closed: false,
    };
    let second = MemoryTransport {
        name: a.to_owned(),
        inbound: a_to_b,
        outbound: b_to_a,
        timeout: None,
        closed: false,
    };
    (first, second)
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut pipe = self.inbound.lock();
        loop {
            if pipe.reader_closed {
                return Ok(0);
            }
            if !pipe.buf.is_empty() {
                let n = buf.len().min(pipe.buf.len());
                for (slot, byte) in buf.iter_mut().zip(pipe.buf.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if pipe.writer_closed {
                return Ok(0);
            }
            pipe = match deadline {
                None => self
                    .inbound
                    .ready
                    .wait(pipe)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(io::ErrorKind::TimedOut.into());
                    }
                    self.inbound
                        .ready
                        .wait_timeout(pipe, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let mut pipe = self.outbound.lock();
        if pipe.writer_closed || pipe.reader_closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        pipe.buf.extend(buf);
        drop(pipe);
        self.outbound.ready.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl Transport for MemoryTransport {
    fn peer_name(&self) -> String { self.name.clone() }

    fn is_connected(&self) -> bool { !self.closed }

    fn poll_readable(&mut self) -> io::Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let pipe = self.inbound.lock();
        Ok(!pipe.buf.is_empty() || pipe.writer_closed || pipe.reader_closed)
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        if matches!(how, Shutdown::Write | Shutdown::Both) {
            self.outbound.close_writer();
        }
        if matches!(how, Shutdown::Read | Shutdown::Both) {
            self.inbound.close_reader();
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.outbound.close_writer();
            self.inbound.close_reader();
            self.closed = true;
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) { self.close(); }
}

type Backlog = Arc<Mutex<VecDeque<MemoryTransport>>>;

/// Accepting side of an in-memory listener.
#[derive(Debug)]
pub struct MemoryAcceptor {
    name: String,
    backlog: Backlog,
}

/// Connecting side of an in-memory listener.
///
/// Each connect hands the server end of a fresh duplex to the paired
/// [`MemoryAcceptor`], whatever the URI's host.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    name: String,
    backlog: Backlog,
    next_id: Arc<AtomicUsize>,
}

/// Create a listener named `name`.
///
/// Client ends are named `client-1`, `client-2`, … in connect order.
#[must_use]
pub fn listener(name: &str) -> (MemoryAcceptor, MemoryConnector) {
    let backlog = Backlog::default();
    (
        MemoryAcceptor {
            name: name.to_owned(),
            backlog: Arc::clone(&backlog),
        },
        MemoryConnector {
            name: name.to_owned(),
            backlog,
            next_id: Arc::new(AtomicUsize::new(1)),
        },
    )
}

impl Acceptor for MemoryAcceptor {
    fn poll_accept(&mut self) -> io::Result<Option<Box<dyn Transport>>> {
        let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(backlog
            .pop_front()
            .map(|end| Box::new(end) as Box<dyn Transport>))
    }

    fn local_name(&self) -> String { self.name.clone() }
}

impl Connector for MemoryConnector {
    fn connect(&self, uri: &Uri, config: &WebSocketConfig) -> Result<Box<dyn Transport>> {
        if uri.host().is_none() {
            return Err(WsError::BadUri(format!("{uri}: missing host")));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mut client, server) = duplex(&format!("client-{id}"), &self.name);
        client
            .set_timeout(config.timeout)
            .map_err(WsError::from_transport)?;
        self.backlog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(server);
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read, Write},
        net::Shutdown,
        time::Duration,
    };

    use super::duplex;
    use crate::transport::Transport;

    #[test]
    fn names_point_at_the_peer() {
        let (a, b) = duplex("alice", "bob");
        assert_eq!(a.peer_name(), "bob");
        assert_eq!(b.peer_name(), "alice");
    }

    #[test]
    fn read_times_out_without_data() {
        let (mut a, _b) = duplex("a", "b");
        a.set_timeout(Duration::from_millis(10)).expect("timeout");
        let err = a.read(&mut [0u8; 1]).expect_err("no data");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn write_shutdown_reads_as_eof_after_buffered_data() {
        let (mut a, mut b) = duplex("a", "b");
        a.write_all(b"xy").expect("write");
        a.shutdown(Shutdown::Write).expect("shutdown");
        assert!(b.poll_readable().expect("poll"));

        let mut out = Vec::new();
        b.read_to_end(&mut out).expect("read");
        assert_eq!(out, b"xy");
        assert!(a.write(b"z").is_err());
    }

    #[test]
    fn dropping_one_end_breaks_the_other() {
        let (a, mut b) = duplex("a", "b");
        drop(a);
        assert_eq!(b.read(&mut [0u8; 1]).expect("eof"), 0);
        assert_eq!(
            b.write(b"x").expect_err("peer gone").kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
