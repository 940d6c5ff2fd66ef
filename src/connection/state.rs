//! Lifecycle states of a connection.

use std::fmt;

/// Which directions of a connection are still usable.
///
/// ```text
/// Open ──close_write──▶ WriteClosed ──close_read──▶ Closed
///   └───close_read───▶ ReadClosed  ──close_write──▶ Closed
/// ```
///
/// `disconnect` reaches `Closed` from anywhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Both directions usable.
    #[default]
    Open,
    /// The peer's close arrived; only the acknowledgement may be written.
    ReadClosed,
    /// A local close was sent; waiting for the peer's acknowledgement.
    WriteClosed,
    /// The stream has been released.
    Closed,
}

impl ConnectionState {
    /// Incoming frames may still be read.
    #[must_use]
    pub const fn is_readable(self) -> bool { matches!(self, Self::Open | Self::WriteClosed) }

    /// Outgoing frames may still be written.
    #[must_use]
    pub const fn is_writable(self) -> bool { matches!(self, Self::Open | Self::ReadClosed) }

    /// State after shutting down the read direction.
    #[must_use]
    pub const fn after_close_read(self) -> Self {
        match self {
            Self::Open => Self::ReadClosed,
            Self::ReadClosed => Self::ReadClosed,
            Self::WriteClosed | Self::Closed => Self::Closed,
        }
    }

    /// State after shutting down the write direction.
    #[must_use]
    pub const fn after_close_write(self) -> Self {
        match self {
            Self::Open => Self::WriteClosed,
            Self::WriteClosed => Self::WriteClosed,
            Self::ReadClosed | Self::Closed => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::ReadClosed => "read-closed",
            Self::WriteClosed => "write-closed",
            Self::Closed => "closed",
        })
    }
}
