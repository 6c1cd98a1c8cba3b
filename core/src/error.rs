//! Error types for the connection engine and server facade.

use thiserror::Error;

pub use crate::pool::PoolError;
pub use crate::rlimit::RlimitError;

/// Errors that can terminate [`crate::server::Server::run`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// Raising `RLIMIT_NOFILE` failed at startup. Fatal: the server cannot
    /// meet its availability target without enough file descriptors.
    #[error("failed to raise file descriptor limit: {0}")]
    RlimitRaise(#[from] RlimitError),

    /// The poller's dispatch loop could not be started.
    #[error("failed to start readiness poller: {0}")]
    PollerStart(#[source] std::io::Error),

    /// Registering the listener with the poller failed.
    #[error("failed to register listener with poller: {0}")]
    ListenerRegister(#[source] std::io::Error),

    /// Putting the listener into non-blocking mode, or another one-time
    /// setup step, failed.
    #[error("listener setup failed: {0}")]
    ListenerSetup(#[source] std::io::Error),
}
