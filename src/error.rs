//! Error taxonomy for the protocol engine.
//!
//! Every failure surfaced by the public API is a [`WsError`]. Event loops do
//! not match on individual variants; they ask [`WsError::severity`] and act on
//! the returned [`Severity`]:
//!
//! - [`Severity::Message`]: log, fire the error event, keep the connection.
//! - [`Severity::Connection`]: tear the connection down, keep the loop.
//! - [`Severity::Fatal`]: stop the loop and hand the error to the caller.
//!
//! Raw transport failures are reclassified exactly once, when a
//! [`CodecError`] crosses into [`crate::connection::Connection`] through the
//! `From` implementation below.

use std::io;

use http::Uri;
use thiserror::Error;

use crate::codec::{CodecError, FrameViolation};

/// Result alias used throughout the crate.
pub type Result<T, E = WsError> = std::result::Result<T, E>;

/// How far a failure reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A single message was bad; the connection stays open.
    Message,
    /// The connection is unusable and must be closed.
    Connection,
    /// Nothing in the engine can recover; the caller decides.
    Fatal,
}

impl Severity {
    /// Label used for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Connection => "connection",
            Self::Fatal => "fatal",
        }
    }
}

/// Protocol rules broken by the peer at the message level.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Frame-level rule broken while decoding.
    #[error(transparent)]
    Frame(#[from] FrameViolation),
    /// A continuation frame arrived with no message in progress.
    #[error("continuation frame without a message in progress")]
    OrphanContinuation,
    /// A new text/binary frame arrived while a message was still open.
    #[error("{0:?} frame interrupted a fragmented message")]
    InterleavedData(crate::frame::OpCode),
}

/// Errors produced by connections, handshakes, and event loops.
#[derive(Debug, Error)]
pub enum WsError {
    /// Frame carried a reserved opcode.
    #[error("bad opcode: {0:#x}")]
    BadOpcode(u8),

    /// A text message did not contain valid UTF-8.
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,

    /// Framing or fragmentation rules were broken.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The transport timed out in the middle of an operation.
    #[error("connection timed out: {0}")]
    Timeout(#[source] io::Error),

    /// The peer went away or the stream is no longer usable.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Any other transport failure.
    #[error("connection failure: {0}")]
    ConnectionFailure(#[source] io::Error),

    /// The HTTP upgrade exchange failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The handshake asked for a new attempt against another URI.
    #[error("reconnect requested to {target}")]
    Reconnect {
        /// Where the next connect attempt should go.
        target: Uri,
    },

    /// Redirects exceeded the configured limit.
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects {
        /// Configured maximum number of redirects.
        limit: u32,
    },

    /// The target URI cannot be used.
    #[error("bad uri: {0}")]
    BadUri(String),

    /// Invalid configuration or API misuse.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WsError {
    /// Severity class driving event-loop policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use wsframe::error::{Severity, WsError};
    ///
    /// assert_eq!(WsError::BadOpcode(0xC).severity(), Severity::Message);
    /// assert_eq!(
    ///     WsError::Handshake("no accept".into()).severity(),
    ///     Severity::Connection
    /// );
    /// assert_eq!(WsError::BadUri("ftp://x".into()).severity(), Severity::Fatal);
    /// ```
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::BadOpcode(_) | Self::InvalidUtf8 => Severity::Message,
            Self::Protocol(_)
            | Self::Timeout(_)
            | Self::ConnectionClosed(_)
            | Self::ConnectionFailure(_)
            | Self::Handshake(_)
            | Self::Reconnect { .. } => Severity::Connection,
            Self::TooManyRedirects { .. } | Self::BadUri(_) | Self::Config(_) => Severity::Fatal,
        }
    }

    /// Shorthand for [`Severity::Message`].
    #[must_use]
    pub fn is_message_level(&self) -> bool { self.severity() == Severity::Message }

    /// Shorthand for [`Severity::Connection`].
    #[must_use]
    pub fn is_connection_level(&self) -> bool { self.severity() == Severity::Connection }

    pub(crate) fn closed(reason: impl Into<String>) -> Self { Self::ConnectionClosed(reason.into()) }

    /// Classify a raw transport error by its kind.
    pub(crate) fn from_transport(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout(err),
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => Self::ConnectionClosed(err.to_string()),
            _ => Self::ConnectionFailure(err),
        }
    }
}

impl From<CodecError> for WsError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => Self::from_transport(e),
            CodecError::BadOpcode(op) => Self::BadOpcode(op),
            CodecError::Violation(v) => Self::Protocol(v.into()),
        }
    }
}
