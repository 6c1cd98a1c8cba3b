//! The per-connection state machine and the callback contract embedders
//! implement to observe it.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::deadline::DeadlineStream;

/// Lifecycle states a [`Connection`] moves through monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transient: inside the accept job, before a socket exists.
    Accepting,
    /// Handshake in progress; no poller registration yet.
    Upgrading,
    /// Registered with the poller; user callbacks may be invoked.
    Active,
    /// Hangup received, or the read callback returned an error; tearing down.
    Draining,
    /// Terminal: the socket is closed and the descriptor released.
    Closed,
}

/// An accepted, (optionally) upgraded connection.
///
/// Holds the raw byte-stream socket plus the bookkeeping the engine needs
/// to drive the state machine: closing exactly once regardless of which
/// path reaches [`ConnectionState::Closed`], and knowing the per-call I/O
/// timeout configured for this server.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    stream: TcpStream,
    peer_addr: SocketAddr,
    io_timeout: Duration,
    state: Mutex<ConnectionState>,
    closed: AtomicBool,
    teardown_started: AtomicBool,
}

impl Connection {
    pub(crate) fn new(id: u64, stream: TcpStream, peer_addr: SocketAddr, io_timeout: Duration) -> Self {
        Self {
            id,
            stream,
            peer_addr,
            io_timeout,
            state: Mutex::new(ConnectionState::Upgrading),
            closed: AtomicBool::new(false),
            teardown_started: AtomicBool::new(false),
        }
    }

    /// Claims the right to run teardown (unregister + `on_close` + close)
    /// for this connection. Returns `true` for exactly one caller, even
    /// under a race between a hangup event and a concurrent failing
    /// `on_read` for the same connection; every later caller gets `false`
    /// and must not touch teardown again.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.teardown_started.swap(true, Ordering::SeqCst)
    }

    /// A server-assigned identifier, stable for the lifetime of the connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The peer's socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The raw file descriptor backing this connection, used for poller
    /// (de)registration.
    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// The per-call I/O timeout configured for this connection's server.
    /// Zero means the Deadline Wrapper is disabled entirely.
    pub(crate) fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Reads into `buf`, applying the configured per-call I/O timeout
    /// (disabled entirely when it is zero, per the Deadline Wrapper
    /// contract).
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match DeadlineStream::new(&self.stream, self.io_timeout) {
            Some(mut wrapped) => wrapped.read(buf),
            None => (&self.stream).read(buf),
        }
    }

    /// Writes all of `buf`, applying the configured per-call I/O timeout.
    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        match DeadlineStream::new(&self.stream, self.io_timeout) {
            Some(mut wrapped) => wrapped.write_all(buf),
            None => (&self.stream).write_all(buf),
        }
    }

    /// Access to the raw, unwrapped stream, e.g. for the handshake, which
    /// manages its own buffering.
    pub fn raw_stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Closes the underlying socket. Idempotent: only the first caller
    /// observes a real shutdown, matching the "closed exactly once"
    /// invariant regardless of which teardown path gets there first.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    /// Whether [`Connection::close`] has already run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The capability triple an embedder provides to observe a connection's
/// lifecycle. A single trait (rather than three independent function
/// slots) makes the happens-before contract —
/// `on_connect` before any `on_read` before `on_close`, each exactly once —
/// explicit at the type level.
pub trait ConnectionCallbacks: Send + Sync + 'static {
    /// Invoked exactly once, after a successful upgrade, before any
    /// `on_read`. Runs on a pool worker, so bounded blocking work is fine.
    fn on_connect(&self, conn: &Connection);

    /// Invoked once per readiness delivery for an active connection. The
    /// callback is responsible for consuming at least one frame so
    /// readiness is edge-advanced. Returning an error triggers connection
    /// close.
    fn on_read(&self, conn: &Connection) -> io::Result<()>;

    /// Invoked exactly once during teardown, after every `on_read` for this
    /// connection has returned. Must not close the connection itself; the
    /// engine does that.
    fn on_close(&self, conn: &Connection);
}

/// A [`ConnectionCallbacks`] implementation that does nothing, used by
/// [`crate::server::Server::default_server`] when the embedder has not
/// supplied behavior yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl ConnectionCallbacks for NoopCallbacks {
    fn on_connect(&self, _conn: &Connection) {}

    fn on_read(&self, _conn: &Connection) -> io::Result<()> {
        Ok(())
    }

    fn on_close(&self, _conn: &Connection) {}
}
