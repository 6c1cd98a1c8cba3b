//! RFC 6455 `Sec-WebSocket-Accept` computation.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

/// The fixed GUID RFC 6455 section 1.3 appends to the client's
/// `Sec-WebSocket-Key` before hashing.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the `Sec-WebSocket-Accept` header value for a given
/// `Sec-WebSocket-Key` value, per RFC 6455 section 1.3: concatenate the key
/// with the WebSocket GUID, SHA-1 hash the result, and base64-encode it.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let digest = hasher.finalize();
    STANDARD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rfc6455_worked_example() {
        // RFC 6455 section 1.3 worked example.
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn is_deterministic() {
        let key = "x3JJHMbDL1EzLkh9GBhXDw==";
        assert_eq!(compute_accept_key(key), compute_accept_key(key));
    }
}
