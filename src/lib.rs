#![doc(html_root_url = "https://docs.rs/wsframe/latest")]
//! Public API for the `wsframe` library.
//!
//! This crate implements the WebSocket protocol (RFC 6455) for blocking
//! streams: the frame codec, message fragmentation and reassembly, a
//! middleware pipeline around every message and handshake exchange, the
//! connection state machine with its closing handshake, and single-threaded
//! client and server event loops.

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod handshake;
pub mod hooks;
pub mod message;
pub mod message_assembler;
pub mod metrics;
pub mod middleware;
pub mod prelude;
pub mod server;
pub mod test_helpers;
pub mod transport;

pub use client::Client;
pub use codec::{CodecError, DecodeOptions, FrameViolation};
pub use config::WebSocketConfig;
pub use connection::{Connection, ConnectionState, Role};
pub use error::{Result, Severity, WsError};
pub use fragment::Fragmenter;
pub use frame::{Frame, OpCode};
pub use hooks::{Handlers, LoopControl, StopHandle};
pub use message::{CloseCode, Message, MessageKind};
pub use message_assembler::MessageAssembler;
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use middleware::{
    Capabilities,
    CloseHandler,
    FollowRedirect,
    Middleware,
    PingInterval,
    PingResponder,
    Pipeline,
    Stack,
    SubprotocolNegotiation,
};
pub use server::Server;
pub use transport::{Acceptor, Connector, Transport};
