//! `Sec-WebSocket-Protocol` negotiation.

use http::{HeaderValue, StatusCode, header};

use super::{Capabilities, Middleware, Stack};
use crate::{
    connection::Connection,
    error::{Result, WsError},
    handshake::HttpMessage,
};

/// Metadata key holding the agreed subprotocol as a [`String`].
pub const SELECTED_KEY: &str = "subprotocol.selected";

/// Agrees on an application subprotocol during the handshake.
///
/// Client side, the request lists every supported protocol and the server's
/// single choice is recorded. Server side, the client's offers are scanned in
/// the order received and the first one this side supports is chosen and
/// echoed back. With `require` set, failing to agree refuses the upgrade
/// (server: `426`) or aborts the connection (client).
#[derive(Clone, Debug)]
pub struct SubprotocolNegotiation {
    protocols: Vec<String>,
    require: bool,
}

impl SubprotocolNegotiation {
    /// Negotiate among `protocols`, listed in order of preference.
    #[must_use]
    pub fn new<I, S>(protocols: I, require: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            protocols: protocols.into_iter().map(Into::into).collect(),
            require,
        }
    }

    /// Supported protocols.
    #[must_use]
    pub fn protocols(&self) -> &[String] { &self.protocols }

    fn supports(&self, name: &str) -> bool { self.protocols.iter().any(|p| p == name) }
}

fn offered(message: &HttpMessage) -> impl Iterator<Item = &str> {
    message
        .headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl Middleware for SubprotocolNegotiation {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.http_incoming().http_outgoing() }

    fn http_outgoing(
        &self,
        stack: Stack<'_>,
        conn: &mut Connection,
        mut message: HttpMessage,
    ) -> Result<()> {
        match &mut message {
            HttpMessage::Request(req) => {
                for protocol in &self.protocols {
                    let value = HeaderValue::from_str(protocol).map_err(|_| {
                        WsError::Config(format!("invalid subprotocol name {protocol:?}"))
                    })?;
                    req.headers_mut().append(header::SEC_WEBSOCKET_PROTOCOL, value);
                }
            }
            HttpMessage::Response(res) => {
                if let Some(selected) = conn.meta::<String>(SELECTED_KEY)
                    && let Ok(value) = HeaderValue::from_str(selected)
                {
                    res.headers_mut().insert(header::SEC_WEBSOCKET_PROTOCOL, value);
                } else if self.require && res.status() == StatusCode::SWITCHING_PROTOCOLS {
                    tracing::debug!(peer = conn.peer_name(), "no common subprotocol");
                    *res.status_mut() = StatusCode::UPGRADE_REQUIRED;
                    res.headers_mut().remove(header::SEC_WEBSOCKET_ACCEPT);
                }
            }
        }
        stack.handle_http_outgoing(conn, message)
    }

    fn http_incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<HttpMessage> {
        let message = stack.handle_http_incoming(conn)?;
        match &message {
            HttpMessage::Request(_) => {
                let choice = offered(&message)
                    .find(|p| self.supports(p))
                    .map(str::to_owned);
                if let Some(choice) = choice {
                    conn.set_meta(SELECTED_KEY, choice);
                }
            }
            HttpMessage::Response(res) if res.status() == StatusCode::SWITCHING_PROTOCOLS => {
                let selected = offered(&message).next().map(str::to_owned);
                match selected {
                    Some(name) if self.supports(&name) => conn.set_meta(SELECTED_KEY, name),
                    Some(name) => {
                        conn.disconnect();
                        return Err(WsError::Handshake(format!(
                            "server selected unoffered subprotocol {name:?}"
                        )));
                    }
                    None if self.require => {
                        conn.disconnect();
                        return Err(WsError::Handshake("server selected no subprotocol".into()));
                    }
                    None => {}
                }
            }
            HttpMessage::Response(_) => {}
        }
        Ok(message)
    }
}
