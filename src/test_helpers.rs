#![cfg(any(test, feature = "test-helpers"))]
//! Helpers for exercising connections without sockets.
//!
//! Both ends run on in-memory duplex streams. The handshake needs both sides
//! to make progress at once, so [`handshaken_pair`] runs the server side on a
//! scoped thread.

use std::{sync::Arc, thread, time::Duration};

use http::Uri;

use crate::{
    config::WebSocketConfig,
    connection::{Connection, Role},
    error::{Result, WsError},
    middleware::Pipeline,
    transport::memory::duplex,
};

/// Timeout applied to helper connections so a broken test fails instead of
/// hanging.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// URI used for in-memory client handshakes.
pub const TEST_URI: &str = "ws://memory.test/";

/// Client and server connections over one duplex, not yet handshaken.
///
/// # Errors
///
/// Propagates connection construction failures.
pub fn raw_pair(client: Pipeline, server: Pipeline) -> Result<(Connection, Connection)> {
    let (client_end, server_end) = duplex("client", "server");
    let client = Connection::new(
        Box::new(client_end),
        WebSocketConfig::client().timeout(TEST_TIMEOUT),
        Role::Client,
        Arc::new(client),
    )?;
    let server = Connection::new(
        Box::new(server_end),
        WebSocketConfig::server().timeout(TEST_TIMEOUT),
        Role::Server,
        Arc::new(server),
    )?;
    Ok((client, server))
}

/// Run both sides of the handshake on a raw pair.
///
/// Returns the client's and the server's outcome.
#[must_use]
pub fn run_handshake(client: &mut Connection, server: &mut Connection) -> (Result<()>, Result<()>) {
    let uri = Uri::from_static(TEST_URI);
    thread::scope(|scope| {
        let server_side = scope.spawn(move || server.handshake_server());
        let client_result = client.handshake_client(&uri);
        let server_result = server_side
            .join()
            .unwrap_or_else(|_| Err(WsError::Handshake("server handshake panicked".into())));
        (client_result, server_result)
    })
}

/// Client and server connections that completed the handshake.
///
/// # Errors
///
/// Returns the first handshake failure.
pub fn handshaken_pair(client: Pipeline, server: Pipeline) -> Result<(Connection, Connection)> {
    let (mut client, mut server) = raw_pair(client, server)?;
    let (client_result, server_result) = run_handshake(&mut client, &mut server);
    client_result?;
    server_result?;
    Ok((client, server))
}
