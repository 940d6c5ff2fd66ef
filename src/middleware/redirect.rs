//! Handshake redirects.

use std::sync::atomic::{AtomicU32, Ordering};

use http::header;
use log::info;

use super::{Capabilities, Middleware, Stack};
use crate::{
    connection::Connection,
    error::{Result, WsError},
    handshake::{self, HttpMessage},
};

/// Turns a `3xx` handshake response with a `Location` header into a
/// [`WsError::Reconnect`] for the client's connect loop.
///
/// Redirects are counted across attempts; once more than `max_redirects`
/// have been followed the handshake fails with the fatal
/// [`WsError::TooManyRedirects`]. A non-redirect response resets the count.
#[derive(Debug)]
pub struct FollowRedirect {
    max_redirects: u32,
    followed: AtomicU32,
}

impl FollowRedirect {
    /// Follow at most `max_redirects` redirects per connect.
    #[must_use]
    pub const fn new(max_redirects: u32) -> Self {
        Self {
            max_redirects,
            followed: AtomicU32::new(0),
        }
    }

    /// Redirects followed since the last non-redirect response.
    #[must_use]
    pub fn followed(&self) -> u32 { self.followed.load(Ordering::Relaxed) }
}

impl Default for FollowRedirect {
    fn default() -> Self { Self::new(5) }
}

impl Middleware for FollowRedirect {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.http_incoming() }

    fn http_incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<HttpMessage> {
        let message = stack.handle_http_incoming(conn)?;
        let Some(response) = message.as_response() else {
            return Ok(message);
        };
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok());
        let (true, Some(location)) = (response.status().is_redirection(), location) else {
            self.followed.store(0, Ordering::Relaxed);
            return Ok(message);
        };

        let followed = self.followed.fetch_add(1, Ordering::Relaxed) + 1;
        if followed > self.max_redirects {
            self.followed.store(0, Ordering::Relaxed);
            return Err(WsError::TooManyRedirects {
                limit: self.max_redirects,
            });
        }
        let target = match conn.uri() {
            Some(base) => handshake::resolve_location(base, location)?,
            None => location
                .parse()
                .map_err(|e| WsError::BadUri(format!("{location}: {e}")))?,
        };
        info!("redirect {followed} to {target}");
        Err(WsError::Reconnect { target })
    }
}
