//! Optional convenience imports for common `wsframe` workflows.
//!
//! Prefer importing specialised APIs directly from their owning modules.
//!
//! # Examples
//!
//! ```rust,no_run
//! use wsframe::prelude::*;
//!
//! fn serve() -> Result<()> {
//!     let mut server = Server::new(WebSocketConfig::server()).bind("127.0.0.1:8080")?;
//!     server.handlers_mut().on_text(|conn, message, _| conn.send(message));
//!     server.start()
//! }
//! ```

pub use crate::{
    client::Client,
    config::WebSocketConfig,
    connection::{Connection, ConnectionState},
    error::{Result, WsError},
    hooks::LoopControl,
    message::{CloseCode, Message, MessageKind},
    middleware::{Middleware, Pipeline},
    server::Server,
};
