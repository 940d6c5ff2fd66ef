//! TCP implementations of the transport traits.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    time::Duration,
};

use http::Uri;
use socket2::SockRef;

use super::{Acceptor, Connector, Source, Transport, readiness::source_of};
use crate::{
    config::WebSocketConfig,
    error::{Result, WsError},
};

/// Blocking TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
    closed: bool,
}

impl TcpTransport {
    /// Wrap a connected stream, applying the configured options.
    ///
    /// # Errors
    ///
    /// Fails when socket options cannot be applied.
    pub fn new(stream: TcpStream, config: &WebSocketConfig) -> io::Result<Self> {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());
        stream.set_nodelay(true)?;
        if config.persistent {
            SockRef::from(&stream).set_keepalive(true)?;
        }
        let mut transport = Self {
            stream,
            peer,
            closed: false,
        };
        transport.set_timeout(config.timeout)?;
        Ok(transport)
    }

    /// Local address of the stream.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.stream.local_addr() }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> { self.stream.flush() }
}

impl Transport for TcpTransport {
    fn peer_name(&self) -> String { self.peer.clone() }

    fn is_connected(&self) -> bool { !self.closed }

    fn poll_readable(&mut self) -> io::Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.stream.set_nonblocking(true)?;
        let probe = self.stream.peek(&mut [0u8; 1]);
        self.stream.set_nonblocking(false)?;
        match probe {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        match self.stream.shutdown(how) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn close(&mut self) {
        if !self.closed {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.closed = true;
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let timeout = (!timeout.is_zero()).then_some(timeout);
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    fn source(&self) -> Option<Source<'_>> { Some(source_of(&self.stream)) }
}

/// Non-blocking TCP listener.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl TcpAcceptor {
    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub fn bind(addr: impl ToSocketAddrs, config: &WebSocketConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    /// Bound address; useful after binding port 0.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.listener.local_addr() }
}

impl Acceptor for TcpAcceptor {
    fn poll_accept(&mut self) -> io::Result<Option<Box<dyn Transport>>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(Box::new(TcpTransport::new(stream, &self.config)?)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_name(&self) -> String {
        self.local_addr()
            .map_or_else(|_| "unbound".to_owned(), |addr| addr.to_string())
    }

    fn source(&self) -> Option<Source<'_>> { Some(source_of(&self.listener)) }
}

/// Opens plain TCP streams for `ws://` URIs.
///
/// `wss://` needs TLS, which this crate leaves to a caller-supplied
/// [`Connector`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, uri: &Uri, config: &WebSocketConfig) -> Result<Box<dyn Transport>> {
        match uri.scheme_str() {
            Some("ws") => {}
            Some("wss") => {
                return Err(WsError::BadUri(format!(
                    "{uri}: wss requires a TLS-capable connector"
                )));
            }
            _ => return Err(WsError::BadUri(format!("{uri}: scheme must be ws"))),
        }
        let host = uri
            .host()
            .ok_or_else(|| WsError::BadUri(format!("{uri}: missing host")))?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let port = uri.port_u16().unwrap_or(80);

        let mut last_err = None;
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| WsError::BadUri(format!("{uri}: {e}")))?;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.timeout) {
                Ok(stream) => {
                    let transport =
                        TcpTransport::new(stream, config).map_err(WsError::from_transport)?;
                    tracing::debug!(%addr, "tcp connected");
                    return Ok(Box::new(transport));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.map_or_else(
            || WsError::BadUri(format!("{uri}: host did not resolve")),
            WsError::from_transport,
        ))
    }
}
