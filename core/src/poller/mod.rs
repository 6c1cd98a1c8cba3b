//! The readiness poller adapter contract.
//!
//! The core does not implement an OS poller from scratch; it specifies the
//! contract it consumes and ships one concrete adapter ([`mio_poller::MioPoller`])
//! built on `mio`, the same crate the engine this project grew out of already
//! depended on for its own listener loop.

pub mod mio_poller;

use std::io;
use std::os::unix::io::RawFd;

/// Opaque handle identifying a registered subscription. Callers choose the
/// value (the engine uses `slab` keys); the poller only ever echoes it back
/// in delivered events.
pub type Token = mio::Token;

/// A readiness delivery for a single registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessEvent {
    /// The token the event pertains to.
    pub token: Token,
    /// The descriptor is readable, or a previously-readable edge is pending.
    pub readable: bool,
    /// The peer closed its write half (`EPOLLRDHUP`-class condition).
    pub read_hangup: bool,
    /// The descriptor hung up or errored.
    pub hangup: bool,
}

/// The readiness poller adapter contract described in the system design:
/// register/resume/unregister a subscription, and start a dispatch loop
/// that invokes a callback once per delivery.
///
/// Implementations MUST NOT deliver two events concurrently for the same
/// one-shot token: a one-shot subscription auto-disarms on delivery and is
/// not re-armed until [`Poller::resume`] is called.
pub trait Poller: Send + Sync + 'static {
    /// Subscribes `fd` for read readiness under `token`. When `one_shot` is
    /// set, the subscription auto-disarms after its first delivery.
    fn register(&self, fd: RawFd, token: Token, one_shot: bool) -> io::Result<()>;

    /// Re-arms a one-shot subscription previously registered under `token`.
    fn resume(&self, fd: RawFd, token: Token) -> io::Result<()>;

    /// Removes the subscription for `fd` registered under `token`.
    /// Idempotent: unregistering an already-removed or never-registered
    /// descriptor is not an error. Implementations must release any
    /// per-token bookkeeping here, not just the OS-level registration, so
    /// memory use tracks live connections rather than their high-water mark.
    fn unregister(&self, fd: RawFd, token: Token) -> io::Result<()>;

    /// Starts the poller's dispatch loop on a background thread. `on_event`
    /// is invoked once per readiness delivery, from the poller's own thread
    /// of control; it must not block. May only be called once per poller.
    fn start(&self, on_event: Box<dyn Fn(ReadinessEvent) + Send + Sync>) -> io::Result<()>;
}
