//! Connection configuration.
//!
//! [`WebSocketConfig`] is passed explicitly to clients, servers, and
//! connections. The masking flags select the endpoint role: clients mask
//! what they send, servers insist that what they receive is masked.

use std::{num::NonZeroUsize, time::Duration};

use crate::codec::{DEFAULT_MAX_PAYLOAD, DecodeOptions};

/// Default readiness and I/O timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default fragmentation threshold in bytes.
pub const DEFAULT_FRAME_SIZE: NonZeroUsize = match NonZeroUsize::new(4096) {
    Some(size) => size,
    None => unreachable!(),
};

/// Settings shared by every connection an endpoint creates.
///
/// # Examples
///
/// ```
/// use std::{num::NonZeroUsize, time::Duration};
///
/// use wsframe::config::WebSocketConfig;
///
/// let config = WebSocketConfig::client()
///     .timeout(Duration::from_secs(5))
///     .frame_size(NonZeroUsize::new(1024).expect("non-zero"))
///     .header("Origin", "http://localhost");
/// assert!(config.push_masked);
/// assert_eq!(config.frame_size.get(), 1024);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Bound on readiness waits and on each blocking read or write.
    pub timeout: Duration,
    /// Data messages longer than this are split into several frames.
    pub frame_size: NonZeroUsize,
    /// Mask outgoing frames (client role).
    pub push_masked: bool,
    /// Reject unmasked incoming frames (server role).
    pub pull_mask_required: bool,
    /// Enable TCP keep-alive on streams opened by the built-in transports.
    pub persistent: bool,
    /// Largest frame payload and assembled message accepted.
    pub max_payload_size: usize,
    /// Extra headers sent with the client handshake request.
    pub headers: Vec<(String, String)>,
}

impl WebSocketConfig {
    /// Defaults for the client role.
    #[must_use]
    pub fn client() -> Self {
        Self {
            push_masked: true,
            pull_mask_required: false,
            ..Self::base()
        }
    }

    /// Defaults for the server role.
    #[must_use]
    pub fn server() -> Self {
        Self {
            push_masked: false,
            pull_mask_required: true,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            frame_size: DEFAULT_FRAME_SIZE,
            push_masked: false,
            pull_mask_required: false,
            persistent: false,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            headers: Vec::new(),
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the fragmentation threshold.
    #[must_use]
    pub fn frame_size(mut self, frame_size: NonZeroUsize) -> Self {
        self.frame_size = frame_size;
        self
    }

    /// Enable or disable TCP keep-alive on built-in transports.
    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Cap incoming payload and message size.
    #[must_use]
    pub fn max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Add a header to the client handshake request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Decoder limits derived from this configuration.
    #[must_use]
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            mask_required: self.pull_mask_required,
            max_payload: self.max_payload_size,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self { Self::client() }
}

#[cfg(test)]
mod tests {
    use super::WebSocketConfig;

    #[test]
    fn roles_select_masking() {
        let client = WebSocketConfig::client();
        assert!(client.push_masked && !client.pull_mask_required);
        let server = WebSocketConfig::server();
        assert!(!server.push_masked && server.pull_mask_required);
        assert!(server.decode_options().mask_required);
    }
}
