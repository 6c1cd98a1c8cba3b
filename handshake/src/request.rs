//! Zero-copy parsing of the RFC 6455 upgrade request, and serialization of
//! the `101 Switching Protocols` response.
//!
//! Only the request line and the handful of headers the upgrade needs are
//! parsed; this is not a general-purpose HTTP/1.1 parser (that belongs to
//! an external collaborator per the core's scope).

use crate::accept_key::compute_accept_key;
use crate::error::HandshakeError;

/// A parsed request line plus headers, borrowing from the original buffer.
#[derive(Debug)]
pub struct ParsedRequest<'a> {
    /// The HTTP method, e.g. `"GET"`.
    pub method: &'a str,
    /// The request target, e.g. `"/chat"`.
    pub target: &'a str,
    /// The HTTP version token, e.g. `"HTTP/1.1"`.
    pub version: &'a str,
    headers: Vec<(&'a str, &'a str)>,
}

impl<'a> ParsedRequest<'a> {
    /// Looks up a header by case-insensitive name, returning the first match.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }
}

/// Parses `buf` as an HTTP/1.1 request up to and including the terminating
/// blank line. `buf` must already contain the full request (callers use
/// [`crate::buffer::Buffer::find`] to detect the CRLFCRLF terminator first).
pub fn parse_request(buf: &[u8]) -> Result<ParsedRequest<'_>, HandshakeError> {
    let text = std::str::from_utf8(buf).map_err(|_| HandshakeError::MalformedRequestLine)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(HandshakeError::MalformedRequestLine)?;
    let mut parts = request_line.split(' ');
    let method = parts.next().ok_or(HandshakeError::MalformedRequestLine)?;
    let target = parts.next().ok_or(HandshakeError::MalformedRequestLine)?;
    let version = parts.next().ok_or(HandshakeError::MalformedRequestLine)?;
    if parts.next().is_some() {
        return Err(HandshakeError::MalformedRequestLine);
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(HandshakeError::MalformedHeader)?;
        headers.push((name.trim(), value.trim()));
    }

    Ok(ParsedRequest {
        method,
        target,
        version,
        headers,
    })
}

/// Validates that a parsed request carries the headers RFC 6455 section 4.2.1
/// requires of a client opening handshake, returning the `Sec-WebSocket-Key`
/// value on success.
pub fn validate_upgrade<'a>(req: &ParsedRequest<'a>) -> Result<&'a str, HandshakeError> {
    if req.method != "GET" {
        return Err(HandshakeError::MalformedRequestLine);
    }

    let upgrade = req
        .header("Upgrade")
        .ok_or(HandshakeError::MissingHeader("Upgrade"))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::MissingHeader("Upgrade"));
    }

    let connection = req
        .header("Connection")
        .ok_or(HandshakeError::MissingHeader("Connection"))?;
    if !connection
        .split(',')
        .any(|tok| tok.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(HandshakeError::MissingHeader("Connection"));
    }

    let version = req
        .header("Sec-WebSocket-Version")
        .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Version"))?;
    if version.trim() != "13" {
        return Err(HandshakeError::MissingHeader("Sec-WebSocket-Version"));
    }

    req.header("Host")
        .ok_or(HandshakeError::MissingHeader("Host"))?;

    req.header("Sec-WebSocket-Key")
        .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))
}

/// Builds the `101 Switching Protocols` response for a validated request.
pub fn build_response(client_key: &str) -> String {
    let accept = compute_accept_key(client_key);
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}
