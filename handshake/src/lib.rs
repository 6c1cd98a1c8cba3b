// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! RFC 6455 WebSocket upgrade handshake.
//!
//! This crate performs exactly one operation the connection engine needs:
//! turning a freshly accepted byte stream into an upgraded WebSocket
//! connection, by reading an HTTP/1.1 request up to its terminating blank
//! line, validating the required upgrade headers, and writing back the
//! `101 Switching Protocols` response. Everything after the handshake —
//! frame parsing, masking, fragmentation — is out of scope; the stream is
//! handed back to the caller as an ordinary byte stream.

pub mod accept_key;
pub mod buffer;
pub mod error;
pub mod request;

use std::io::{Read, Write};

use buffer::Buffer;
use error::HandshakeError;

const TERMINATOR: &[u8] = b"\r\n\r\n";
const INITIAL_CAPACITY: usize = 1024;

/// Maximum number of bytes read while searching for the end of the request
/// headers before giving up with [`HandshakeError::RequestTooLarge`].
pub const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Performs the server side of the RFC 6455 opening handshake against
/// `stream`.
///
/// Reads from `stream` until a full request (terminated by an empty line)
/// is buffered, validates the required upgrade headers, and writes the
/// `101 Switching Protocols` response. Returns `Ok(())` once the response
/// has been written; any parse or I/O failure is returned without writing
/// a response, leaving the caller to close the socket.
pub fn upgrade<S: Read + Write>(stream: &mut S) -> Result<(), HandshakeError> {
    let mut buf = Buffer::new(INITIAL_CAPACITY);
    let header_end = read_until_terminator(stream, &mut buf)?;

    let key = {
        let data: &[u8] = std::borrow::Borrow::borrow(&buf);
        let req = request::parse_request(&data[..header_end])?;
        request::validate_upgrade(&req)?.to_owned()
    };

    let response = request::build_response(&key);
    stream.write_all(response.as_bytes())?;
    Ok(())
}

/// Reads from `stream` into `buf` until the CRLFCRLF terminator appears,
/// returning the offset (exclusive) of the end of the terminator.
fn read_until_terminator<S: Read>(
    stream: &mut S,
    buf: &mut Buffer,
) -> Result<usize, HandshakeError> {
    loop {
        if let Some(end) = buf.find(TERMINATOR) {
            return Ok(end);
        }

        if buf.remaining() >= MAX_REQUEST_BYTES {
            return Err(HandshakeError::RequestTooLarge);
        }

        if buf.remaining_mut() < 512 {
            buf.reserve(1024);
        }

        let read = {
            let dest: &mut [u8] = std::borrow::BorrowMut::borrow_mut(buf);
            stream.read(dest)?
        };

        if read == 0 {
            return Err(HandshakeError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before handshake completed",
            )));
        }

        buf.mark_written(read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A `Read + Write` double that serves bytes from `input` and captures
    /// what gets written, for exercising `upgrade` without a real socket.
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn upgrade_succeeds_on_valid_request() {
        let request = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        let mut stream = MockStream {
            input: Cursor::new(request.to_vec()),
            output: Vec::new(),
        };

        upgrade(&mut stream).unwrap();
        let response = String::from_utf8(stream.output).unwrap();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[test]
    fn upgrade_fails_on_missing_headers() {
        let request = b"GET /chat HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let mut stream = MockStream {
            input: Cursor::new(request.to_vec()),
            output: Vec::new(),
        };

        let err = upgrade(&mut stream).unwrap_err();
        assert!(matches!(err, HandshakeError::MissingHeader(_)));
        assert!(stream.output.is_empty());
    }

    #[test]
    fn upgrade_handles_request_split_across_reads() {
        struct Chunked {
            chunks: Vec<Vec<u8>>,
            output: Vec<u8>,
        }
        impl Read for Chunked {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.chunks.is_empty() {
                    return Ok(0);
                }
                let chunk = self.chunks.remove(0);
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
        }
        impl Write for Chunked {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.output.write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let full = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        let mid = full.len() / 2;
        let mut stream = Chunked {
            chunks: vec![full[..mid].to_vec(), full[mid..].to_vec()],
            output: Vec::new(),
        };

        upgrade(&mut stream).unwrap();
        assert!(!stream.output.is_empty());
    }

    #[test]
    fn upgrade_rejects_oversized_request() {
        struct Infinite;
        impl Read for Infinite {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                for b in buf.iter_mut() {
                    *b = b'a';
                }
                Ok(buf.len())
            }
        }
        impl Write for Infinite {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut stream = Infinite;
        let err = upgrade(&mut stream).unwrap_err();
        assert!(matches!(err, HandshakeError::RequestTooLarge));
    }
}
