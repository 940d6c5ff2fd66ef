//! Utilities for testing `wsframe` clients, servers, and middleware.
//!
//! - [`logger`] serialises access to a captured global logger;
//! - [`EchoServer`] runs a TCP echo server on a background thread;
//! - [`capture_metrics`] records metrics emitted by a closure;
//! - the in-memory connection helpers of [`wsframe::test_helpers`] are
//!   re-exported.
//!
//! ```rust
//! use wsframe::{Message, Pipeline};
//! use wsframe_testing::handshaken_pair;
//!
//! let (mut client, mut server) =
//!     handshaken_pair(Pipeline::standard(), Pipeline::standard()).expect("handshake");
//! client.send(Message::text("hi")).expect("send");
//! assert_eq!(server.receive().expect("receive").as_text().expect("utf8"), "hi");
//! ```

mod echo_server;
mod logging;
mod metrics;

pub use echo_server::EchoServer;
pub use logging::{LoggerHandle, logger};
pub use metrics::{capture_metrics, counter_value, gauge_value};
pub use wsframe::test_helpers::{TEST_TIMEOUT, TEST_URI, handshaken_pair, raw_pair, run_handshake};
