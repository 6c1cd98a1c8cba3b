//! Error types for the upgrade handshake.

use thiserror::Error;

/// Failure classifications for an RFC 6455 upgrade attempt.
///
/// Handshake failures never carry the offending bytes: the peer is
/// untrusted and logging raw request data would be a denial-of-service
/// amplifier.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The request did not contain a full request-line plus headers before
    /// `max_request_bytes` was exceeded.
    #[error("handshake request exceeded maximum size before completion")]
    RequestTooLarge,

    /// The request line was not a well-formed `GET <target> HTTP/1.1`.
    #[error("malformed request line")]
    MalformedRequestLine,

    /// A header line could not be split into `name: value`.
    #[error("malformed header line")]
    MalformedHeader,

    /// A required header was missing or had an unexpected value.
    #[error("missing or invalid required header: {0}")]
    MissingHeader(&'static str),

    /// The underlying I/O operation failed while reading the request.
    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
}
