//! The embedding facade: configuration surface plus the blocking `run` loop.

use std::net::{TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::conn::{ConnectionCallbacks, NoopCallbacks};
use crate::engine::{Engine, EngineConfig};
use crate::error::{PoolError, ServerError};
use crate::poller::mio_poller::MioPoller;
use crate::poller::Poller;
use crate::pool::Pool;
use crate::rlimit::raise_nofile_limit;

/// Pool size and queue depth [`Server::default_server`] composes.
const DEFAULT_POOL_SIZE: usize = 128;
const DEFAULT_QUEUE_DEPTH: usize = 128;
const DEFAULT_SCHEDULE_TIMEOUT: Duration = Duration::from_millis(1);
const DEFAULT_COOLDOWN: Duration = Duration::from_millis(5);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(100);

/// The embeddable WebSocket server. Configuration (pool size/queue,
/// poller, timeouts, callbacks) is set before [`Server::run`] and not
/// mutated thereafter.
pub struct Server {
    listener: TcpListener,
    poller: Arc<dyn Poller>,
    pool: Arc<Pool>,
    schedule_timeout: Duration,
    cooldown: Duration,
    io_timeout: Duration,
    callbacks: Arc<dyn ConnectionCallbacks>,
}

impl Server {
    /// Builds a server around an already-bound listener. Binding the
    /// listener itself (address parsing, `SO_REUSEADDR`, backlog sizing)
    /// is the embedder's concern; the core only drives it once handed one.
    ///
    /// Defaults match `DefaultServer`: pool 128x128, scheduleTimeout=1ms,
    /// cooldown=5ms, ioTimeout=100ms. Call the `set_*` methods to change
    /// them before [`Server::run`].
    pub fn new(
        listener: TcpListener,
        callbacks: impl ConnectionCallbacks,
    ) -> Result<Self, ServerError> {
        let poller = Arc::new(MioPoller::new().map_err(ServerError::PollerStart)?);
        let pool = Arc::new(
            Pool::new(DEFAULT_POOL_SIZE, DEFAULT_QUEUE_DEPTH)
                .expect("default pool parameters are always valid"),
        );

        Ok(Self {
            listener,
            poller,
            pool,
            schedule_timeout: DEFAULT_SCHEDULE_TIMEOUT,
            cooldown: DEFAULT_COOLDOWN,
            io_timeout: DEFAULT_IO_TIMEOUT,
            callbacks: Arc::new(callbacks),
        })
    }

    /// Binds `addr` and builds a server with every default left in place
    /// and no-op callbacks, matching `DefaultServer` in the system this
    /// was distilled from. Embedders that want their own callbacks should
    /// bind their own listener and call [`Server::new`] instead.
    pub fn default_server(addr: impl ToSocketAddrs) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).map_err(ServerError::ListenerSetup)?;
        Self::new(listener, NoopCallbacks)
    }

    /// Replaces the pool with one of the given size and queue depth.
    /// Fails, and leaves the existing pool in place, if either is zero.
    /// The pool being replaced is drained and its workers joined before
    /// this call returns.
    pub fn set_pool(&mut self, size: usize, queue_depth: usize) -> Result<(), PoolError> {
        let pool = Pool::new(size, queue_depth)?;
        let old = std::mem::replace(&mut self.pool, Arc::new(pool));
        if let Ok(old) = Arc::try_unwrap(old) {
            old.shutdown();
        }
        Ok(())
    }

    /// Replaces the readiness poller adapter.
    pub fn set_poller(&mut self, poller: Arc<dyn Poller>) {
        self.poller = poller;
    }

    /// Sets the maximum time an accept job may wait for a pool slot.
    pub fn set_schedule_timeout(&mut self, timeout: Duration) {
        self.schedule_timeout = timeout;
    }

    /// Sets the bounded sleep in the accept path after any accept-path failure.
    pub fn set_cooldown_time(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Sets the per-call read/write timeout. Zero disables the Deadline
    /// Wrapper entirely.
    pub fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
    }

    /// Raises `RLIMIT_NOFILE`, starts the accept loop, and blocks forever.
    /// There is no graceful shutdown path; like the system this was
    /// distilled from, `run` only returns on a fatal setup error.
    pub fn run(self) -> Result<(), ServerError> {
        raise_nofile_limit()?;

        let engine = Arc::new(Engine::new(
            self.listener,
            self.poller,
            self.pool,
            self.callbacks,
            EngineConfig {
                schedule_timeout: self.schedule_timeout,
                cooldown: self.cooldown,
                io_timeout: self.io_timeout,
            },
        ));

        Engine::run(engine)
    }
}
