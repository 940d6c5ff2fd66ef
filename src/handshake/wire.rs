//! HTTP/1.1 head serialization for the upgrade exchange.
//!
//! Heads are read one byte at a time so nothing past the blank line is
//! consumed; the first frame may follow the response immediately.

use std::io::{self, Read};

use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode, Version};

use crate::error::{Result, WsError};

/// Largest accepted request or response head.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Read bytes up to and including the blank line ending an HTTP head.
///
/// # Errors
///
/// Returns [`io::ErrorKind::UnexpectedEof`] when the stream ends first and
/// [`io::ErrorKind::InvalidData`] when the head exceeds [`MAX_HEAD_SIZE`].
pub fn read_head<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    while !head.ends_with(TERMINATOR) {
        if head.len() >= MAX_HEAD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "HTTP head too large",
            ));
        }
        reader.read_exact(&mut byte)?;
        head.push(byte[0]);
    }
    Ok(head)
}

fn malformed(what: &str) -> WsError { WsError::Handshake(format!("malformed HTTP head: {what}")) }

fn split_head(head: &[u8]) -> Result<(&str, Vec<(&str, &str)>)> {
    let text = std::str::from_utf8(head).map_err(|_| malformed("not UTF-8"))?;
    let mut lines = text.split("\r\n").filter(|line| !line.is_empty());
    let start = lines.next().ok_or_else(|| malformed("empty"))?;
    let headers = lines
        .map(|line| {
            line.split_once(':')
                .map(|(name, value)| (name.trim(), value.trim()))
                .ok_or_else(|| malformed(line))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((start, headers))
}

fn append_headers(map: &mut http::HeaderMap, headers: Vec<(&str, &str)>) -> Result<()> {
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| malformed(name))?;
        let value = HeaderValue::from_str(value).map_err(|_| malformed(value))?;
        map.append(name, value);
    }
    Ok(())
}

fn check_version(version: &str) -> Result<Version> {
    match version {
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        other => Err(malformed(other)),
    }
}

/// Parse a request head.
///
/// # Errors
///
/// Returns [`WsError::Handshake`] for anything that is not an HTTP/1.x
/// request head.
pub fn parse_request(head: &[u8]) -> Result<Request<()>> {
    let (start, headers) = split_head(head)?;
    let mut parts = start.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed(start));
    };
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| malformed(method))?;
    let mut request = Request::builder()
        .method(method)
        .uri(target)
        .version(check_version(version)?)
        .body(())
        .map_err(|e| malformed(&e.to_string()))?;
    append_headers(request.headers_mut(), headers)?;
    Ok(request)
}

/// Parse a response head.
///
/// # Errors
///
/// Returns [`WsError::Handshake`] for anything that is not an HTTP/1.x
/// response head.
pub fn parse_response(head: &[u8]) -> Result<Response<()>> {
    let (start, headers) = split_head(head)?;
    let mut parts = start.splitn(3, ' ');
    let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
        return Err(malformed(start));
    };
    let status = StatusCode::from_bytes(code.as_bytes()).map_err(|_| malformed(code))?;
    let mut response = Response::new(());
    *response.status_mut() = status;
    *response.version_mut() = check_version(version)?;
    append_headers(response.headers_mut(), headers)?;
    Ok(response)
}

fn push_headers(out: &mut Vec<u8>, headers: &http::HeaderMap) {
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Serialize a request head.
#[must_use]
pub fn serialize_request(request: &Request<()>) -> Vec<u8> {
    let mut out = format!("{} {} HTTP/1.1\r\n", request.method(), request.uri()).into_bytes();
    push_headers(&mut out, request.headers());
    out
}

/// Serialize a response head.
#[must_use]
pub fn serialize_response(response: &Response<()>) -> Vec<u8> {
    let status = response.status();
    let mut out = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_str(),
        status.canonical_reason().unwrap_or("")
    )
    .into_bytes();
    push_headers(&mut out, response.headers());
    out
}
