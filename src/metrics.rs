//! Metric helpers for `wsframe`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. Without the
//! `metrics` feature the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::error::Severity;

/// Name of the gauge tracking open server connections.
pub const CONNECTIONS_ACTIVE: &str = "wsframe_connections_active";
/// Name of the counter tracking frames written or read.
pub const FRAMES_PROCESSED: &str = "wsframe_frames_processed_total";
/// Name of the counter tracking errors seen by event loops.
pub const ERRORS_TOTAL: &str = "wsframe_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from the peer.
    Inbound,
    /// Frames written to the peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only read by metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an error classified with `severity`.
pub fn inc_errors(severity: Severity) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "severity" => severity.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = severity;
}
