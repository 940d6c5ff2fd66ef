//! HTTP upgrade handshake (RFC 6455 §4).
//!
//! Handshake messages use the [`http`] crate's object model. They travel
//! through the connection's HTTP middleware chains wrapped in
//! [`HttpMessage`], so policies such as redirects and subprotocol
//! negotiation can inspect and rewrite them.
//!
//! This module builds and validates the messages; [`wire`] reads and writes
//! their heads on a byte stream.

pub mod wire;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, header};
use sha1::{Digest, Sha1};

use crate::{
    config::WebSocketConfig,
    error::{Result, WsError},
};

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this engine speaks.
pub const WS_VERSION: &str = "13";

/// A handshake request or response flowing through an HTTP chain.
#[derive(Debug)]
pub enum HttpMessage {
    /// Client upgrade request.
    Request(Request<()>),
    /// Server upgrade response.
    Response(Response<()>),
}

impl HttpMessage {
    /// Headers of either variant.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        match self {
            Self::Request(req) => req.headers(),
            Self::Response(res) => res.headers(),
        }
    }

    /// Mutable headers of either variant.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            Self::Request(req) => req.headers_mut(),
            Self::Response(res) => res.headers_mut(),
        }
    }

    /// Borrow the request, if this is one.
    #[must_use]
    pub fn as_request(&self) -> Option<&Request<()>> {
        match self {
            Self::Request(req) => Some(req),
            Self::Response(_) => None,
        }
    }

    /// Borrow the response, if this is one.
    #[must_use]
    pub fn as_response(&self) -> Option<&Response<()>> {
        match self {
            Self::Response(res) => Some(res),
            Self::Request(_) => None,
        }
    }

    /// Consume into the request.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Handshake`] when this is a response.
    pub fn into_request(self) -> Result<Request<()>> {
        match self {
            Self::Request(req) => Ok(req),
            Self::Response(_) => Err(WsError::Handshake("expected a request".into())),
        }
    }

    /// Consume into the response.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Handshake`] when this is a request.
    pub fn into_response(self) -> Result<Response<()>> {
        match self {
            Self::Response(res) => Ok(res),
            Self::Request(_) => Err(WsError::Handshake("expected a response".into())),
        }
    }
}

impl From<Request<()>> for HttpMessage {
    fn from(req: Request<()>) -> Self { Self::Request(req) }
}

impl From<Response<()>> for HttpMessage {
    fn from(res: Response<()>) -> Self { Self::Response(res) }
}

/// `Sec-WebSocket-Accept` value for `key`.
///
/// # Examples
///
/// ```
/// use wsframe::handshake::compute_accept_key;
///
/// // Sample from RFC 6455 §1.3.
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
#[must_use]
pub fn generate_key() -> String { BASE64.encode(rand::random::<[u8; 16]>()) }

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_has_token(headers: &HeaderMap, name: &header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn bad_header(name: &str) -> WsError { WsError::Handshake(format!("invalid header value for {name}")) }

/// Build the client upgrade request for `uri`.
///
/// The request line carries the path and query (`/` when empty). `Host`
/// includes the port when it is not the scheme default. Extra headers from
/// `config` are appended last.
///
/// # Errors
///
/// Returns [`WsError::BadUri`] when `uri` has no host and
/// [`WsError::Handshake`] when a configured header is not valid HTTP.
pub fn client_request(uri: &Uri, config: &WebSocketConfig) -> Result<Request<()>> {
    let host = uri
        .host()
        .ok_or_else(|| WsError::BadUri(format!("{uri}: missing host")))?;
    let default_port = match uri.scheme_str() {
        Some("wss") => 443,
        _ => 80,
    };
    let host = match uri.port_u16() {
        Some(port) if port != default_port => format!("{host}:{port}"),
        _ => host.to_owned(),
    };
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let target = if target.is_empty() { "/" } else { target };

    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(target)
        .header(header::HOST, host)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade")
        .header(header::SEC_WEBSOCKET_KEY, generate_key())
        .header(header::SEC_WEBSOCKET_VERSION, WS_VERSION);
    for (name, value) in &config.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(())
        .map_err(|e| WsError::Handshake(format!("request: {e}")))
}

/// Answer an upgrade request.
///
/// A valid request yields `101 Switching Protocols` with the accept key. An
/// invalid one yields `400 Bad Request`, or `426 Upgrade Required` with the
/// supported version when only the version is wrong; the caller sends it and
/// then fails the handshake.
#[must_use]
pub fn server_response(request: &Request<()>) -> Response<()> {
    match validate_request(request) {
        Ok(key) => {
            let mut res = Response::new(());
            *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
            let headers = res.headers_mut();
            headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
            headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
            if let Ok(accept) = HeaderValue::from_str(&compute_accept_key(key)) {
                headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
            }
            res
        }
        Err(Rejection::Version) => {
            let mut res = Response::new(());
            *res.status_mut() = StatusCode::UPGRADE_REQUIRED;
            res.headers_mut().insert(
                header::SEC_WEBSOCKET_VERSION,
                HeaderValue::from_static(WS_VERSION),
            );
            res
        }
        Err(Rejection::Malformed(reason)) => {
            tracing::debug!(reason, "rejecting upgrade request");
            let mut res = Response::new(());
            *res.status_mut() = StatusCode::BAD_REQUEST;
            res
        }
    }
}

enum Rejection {
    Version,
    Malformed(&'static str),
}

fn validate_request(request: &Request<()>) -> std::result::Result<&str, Rejection> {
    let headers = request.headers();
    if request.method() != Method::GET {
        return Err(Rejection::Malformed("method must be GET"));
    }
    if !header_has_token(headers, &header::UPGRADE, "websocket") {
        return Err(Rejection::Malformed("missing Upgrade: websocket"));
    }
    if !header_has_token(headers, &header::CONNECTION, "upgrade") {
        return Err(Rejection::Malformed("missing Connection: Upgrade"));
    }
    let key = header_str(headers, &header::SEC_WEBSOCKET_KEY)
        .ok_or(Rejection::Malformed("missing Sec-WebSocket-Key"))?;
    if header_str(headers, &header::SEC_WEBSOCKET_VERSION) != Some(WS_VERSION) {
        return Err(Rejection::Version);
    }
    Ok(key)
}

/// Check the server's answer to `request`.
///
/// # Errors
///
/// Returns [`WsError::Handshake`] unless the response is `101` with
/// `Upgrade: websocket` and the expected `Sec-WebSocket-Accept`.
pub fn verify_response(request: &Request<()>, response: &Response<()>) -> Result<()> {
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(WsError::Handshake(format!(
            "expected 101, got {}",
            response.status()
        )));
    }
    let headers = response.headers();
    if !header_has_token(headers, &header::UPGRADE, "websocket") {
        return Err(bad_header("Upgrade"));
    }
    let key = header_str(request.headers(), &header::SEC_WEBSOCKET_KEY)
        .ok_or_else(|| bad_header("Sec-WebSocket-Key"))?;
    match header_str(headers, &header::SEC_WEBSOCKET_ACCEPT) {
        Some(accept) if accept == compute_accept_key(key) => Ok(()),
        Some(_) => Err(WsError::Handshake("Sec-WebSocket-Accept mismatch".into())),
        None => Err(WsError::Handshake("missing Sec-WebSocket-Accept".into())),
    }
}

/// Resolve a `Location` header against the URI that produced it.
///
/// Absolute locations are used as-is; a path-only location keeps the
/// scheme and authority of `base`.
///
/// # Errors
///
/// Returns [`WsError::BadUri`] when the location cannot be parsed.
pub fn resolve_location(base: &Uri, location: &str) -> Result<Uri> {
    let target: Uri = location
        .parse()
        .map_err(|e| WsError::BadUri(format!("{location}: {e}")))?;
    if target.scheme().is_some() {
        return Ok(target);
    }
    let mut parts = target.into_parts();
    parts.scheme = base.scheme().cloned();
    parts.authority = base.authority().cloned();
    Uri::from_parts(parts).map_err(|e| WsError::BadUri(format!("{location}: {e}")))
}
