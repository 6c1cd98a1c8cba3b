//! A transparent stream wrapper that sets a fresh per-call I/O deadline.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Wraps a [`TcpStream`] so every [`Read::read`]/[`Write::write`] call sets
/// a fresh deadline before delegating. A `timeout` of [`Duration::ZERO`]
/// disables wrapping structurally: [`DeadlineStream::new`] returns `None`
/// and callers use the raw stream directly, matching the "zero disables"
/// invariant exactly rather than merely skipping the deadline calls.
#[derive(Debug)]
pub struct DeadlineStream<'a> {
    stream: &'a TcpStream,
    timeout: Duration,
}

impl<'a> DeadlineStream<'a> {
    /// Wraps `stream` with `timeout`. Returns `None` when `timeout` is
    /// zero: the wrapper is structurally absent rather than a no-op.
    pub fn new(stream: &'a TcpStream, timeout: Duration) -> Option<Self> {
        if timeout.is_zero() {
            return None;
        }
        Some(Self { stream, timeout })
    }
}

impl Read for DeadlineStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(Some(self.timeout))?;
        (&mut &*self.stream).read(buf)
    }
}

impl Write for DeadlineStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(Some(self.timeout))?;
        (&mut &*self.stream).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&mut &*self.stream).flush()
    }
}
