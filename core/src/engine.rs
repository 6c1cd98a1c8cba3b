//! The connection lifecycle engine: accept -> upgrade -> register -> dispatch -> close.
//!
//! This owns the interplay between the worker pool and the readiness
//! poller. Poller callbacks (running on the poller's own dispatch thread)
//! never block: admitting jobs onto the pool is the only thing they do.
//! Everything that can block — `accept`, the handshake, and the user's
//! `on_read` — runs inside a pool worker.
//!
//! Every entry point below takes `engine: &Arc<Engine>` rather than
//! `&self`/`self`: pool jobs and the poller's dispatch callback need
//! `'static` closures, and cloning the `Arc` to move into them is the
//! ordinary, stable way to do that (`self: &Arc<Self>` is not a stable
//! receiver type).

use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use slab::Slab;

use crate::conn::{Connection, ConnectionCallbacks, ConnectionState};
use crate::deadline::DeadlineStream;
use crate::error::ServerError;
use crate::poller::{Poller, ReadinessEvent, Token};
use crate::pool::Pool;

/// The token reserved for the listening socket; no connection is ever
/// assigned this slab key because [`Slab::insert`] starts at zero.
const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Tunable timing parameters for the accept loop and per-connection I/O.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum time an accept job may wait for a pool slot before being
    /// rejected with a schedule timeout.
    pub schedule_timeout: Duration,
    /// Bounded sleep in the accept path after any accept-path failure,
    /// including a schedule timeout.
    pub cooldown: Duration,
    /// Per-call read/write timeout for connection I/O. Zero disables the
    /// Deadline Wrapper entirely.
    pub io_timeout: Duration,
}

/// Couples a readiness poller, a bounded worker pool, and the
/// per-connection state machine into the accept/upgrade/dispatch/close
/// lifecycle.
pub struct Engine {
    listener: TcpListener,
    poller: Arc<dyn Poller>,
    pool: Arc<Pool>,
    callbacks: Arc<dyn ConnectionCallbacks>,
    config: EngineConfig,
    connections: Mutex<Slab<Arc<Connection>>>,
    next_id: AtomicU64,
}

impl Engine {
    /// Builds a new engine around an already-bound listener. Binding the
    /// listener is the embedder's responsibility; it is out of scope here.
    pub fn new(
        listener: TcpListener,
        poller: Arc<dyn Poller>,
        pool: Arc<Pool>,
        callbacks: Arc<dyn ConnectionCallbacks>,
        config: EngineConfig,
    ) -> Self {
        Self {
            listener,
            poller,
            pool,
            callbacks,
            config,
            connections: Mutex::new(Slab::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers the listener, starts the poller's dispatch loop, and
    /// blocks forever driving the accept loop. There is no shutdown
    /// signal: like the source this engine was distilled from, `run`
    /// never returns on the success path.
    pub fn run(engine: Arc<Self>) -> Result<(), ServerError> {
        engine
            .poller
            .register(engine.listener.as_raw_fd(), LISTENER_TOKEN, true)
            .map_err(ServerError::ListenerRegister)?;

        let dispatch_target = Arc::clone(&engine);
        engine
            .poller
            .start(Box::new(move |event| {
                on_readiness(&dispatch_target, event);
            }))
            .map_err(ServerError::PollerStart)?;

        loop {
            thread::sleep(Duration::from_secs(60 * 60 * 24));
        }
    }
}

fn on_readiness(engine: &Arc<Engine>, event: ReadinessEvent) {
    if event.token == LISTENER_TOKEN {
        on_listener_ready(engine);
    } else {
        on_connection_ready(engine, event);
    }
}

/// Non-blocking: submits an accept job to the pool. Classification of the
/// accept outcome, cooldown, and re-arming the listener all happen inside
/// that job (see [`accept_job`]) rather than via a synchronous rendezvous
/// back to this callback — the redesign the source's own ad-hoc
/// accept-result channel was pointing at.
fn on_listener_ready(engine: &Arc<Engine>) {
    let job_engine = Arc::clone(engine);
    let result = engine.pool.schedule_with_deadline(
        move || accept_job(&job_engine),
        engine.config.schedule_timeout,
    );

    if result.is_err() {
        tracing::debug!("accept schedule timed out; cooling down");
        cooldown_and_resume_listener(engine);
    }
}

/// Runs the cooldown sleep and listener re-arm on a pool worker rather than
/// blocking the poller's own dispatch thread, which also drives readiness
/// delivery for every other connection. The only suspension this function
/// performs directly is another bounded `ScheduleWithDeadline` admission —
/// the one suspension a poller callback is allowed (spec.md §5) — so the
/// actual `cooldown`-length sleep always happens inside a worker job.
fn cooldown_and_resume_listener(engine: &Arc<Engine>) {
    let job_engine = Arc::clone(engine);
    let result = engine.pool.schedule_with_deadline(
        move || {
            thread::sleep(job_engine.config.cooldown);
            if let Err(err) = job_engine
                .poller
                .resume(job_engine.listener.as_raw_fd(), LISTENER_TOKEN)
            {
                tracing::warn!(?err, "failed to resume listener after schedule timeout");
            }
        },
        engine.config.schedule_timeout,
    );

    if result.is_err() {
        tracing::warn!("pool saturated; resuming listener without cooldown");
        if let Err(err) = engine
            .poller
            .resume(engine.listener.as_raw_fd(), LISTENER_TOKEN)
        {
            tracing::warn!(?err, "failed to resume listener after schedule timeout");
        }
    }
}

/// Runs on a pool worker. Performs the accept, classifies the outcome,
/// cools down on any failure, and always re-arms the listener.
fn accept_job(engine: &Arc<Engine>) {
    match engine.listener.accept() {
        Ok((stream, addr)) => handle_new_connection(engine, stream, addr),
        Err(err) => {
            tracing::debug!(?err, "accept failed; cooling down");
            thread::sleep(engine.config.cooldown);
        }
    }

    if let Err(err) = engine
        .poller
        .resume(engine.listener.as_raw_fd(), LISTENER_TOKEN)
    {
        tracing::warn!(?err, "failed to resume listener registration");
    }
}

fn handle_new_connection(
    engine: &Arc<Engine>,
    stream: std::net::TcpStream,
    addr: SocketAddr,
) {
    let id = engine.next_id.fetch_add(1, Ordering::Relaxed);
    let conn = Arc::new(Connection::new(id, stream, addr, engine.config.io_timeout));

    if let Err(err) = perform_upgrade(&conn) {
        tracing::debug!(conn_id = id, ?err, "handshake failed, dropping connection");
        conn.close();
        return;
    }

    conn.set_state(ConnectionState::Active);
    engine.callbacks.on_connect(&conn);

    let token = {
        let mut connections = engine.connections.lock().unwrap();
        Token(connections.insert(Arc::clone(&conn)))
    };

    if let Err(err) = engine.poller.register(conn.raw_fd(), token, true) {
        tracing::warn!(conn_id = id, ?err, "failed to register connection with poller");
        engine.connections.lock().unwrap().remove(token.0);
        teardown_unregistered(engine, &conn);
    }
}

fn on_connection_ready(engine: &Arc<Engine>, event: ReadinessEvent) {
    let conn = {
        let connections = engine.connections.lock().unwrap();
        connections.get(event.token.0).cloned()
    };
    let Some(conn) = conn else {
        return;
    };

    if event.read_hangup || event.hangup {
        close_connection(engine, event.token, &conn);
        return;
    }

    if event.readable {
        let job_engine = Arc::clone(engine);
        let token = event.token;
        let job_conn = Arc::clone(&conn);
        engine
            .pool
            .schedule(move || run_on_read(&job_engine, token, job_conn));
    }
}

fn run_on_read(engine: &Arc<Engine>, token: Token, conn: Arc<Connection>) {
    match engine.callbacks.on_read(&conn) {
        Ok(()) => {
            if let Err(err) = engine.poller.resume(conn.raw_fd(), token) {
                tracing::warn!(
                    conn_id = conn.id(),
                    ?err,
                    "failed to resume connection readiness"
                );
                close_connection(engine, token, &conn);
            }
        }
        Err(err) => {
            tracing::debug!(conn_id = conn.id(), ?err, "on_read failed, closing connection");
            close_connection(engine, token, &conn);
        }
    }
}

/// Idempotent teardown, guarded by [`Connection`]'s internal
/// teardown-started flag so a hangup event racing a concurrent `on_read`
/// error for the same connection still invokes `on_close` exactly once.
fn close_connection(engine: &Arc<Engine>, token: Token, conn: &Arc<Connection>) {
    if !conn.begin_teardown() {
        return;
    }
    conn.set_state(ConnectionState::Draining);
    let _ = engine.poller.unregister(conn.raw_fd(), token);
    engine.connections.lock().unwrap().remove(token.0);
    engine.callbacks.on_close(conn);
    conn.close();
    conn.set_state(ConnectionState::Closed);
}

fn teardown_unregistered(engine: &Arc<Engine>, conn: &Arc<Connection>) {
    if !conn.begin_teardown() {
        return;
    }
    conn.set_state(ConnectionState::Draining);
    engine.callbacks.on_close(conn);
    conn.close();
    conn.set_state(ConnectionState::Closed);
}

/// Performs the handshake against the Deadline Wrapper when `io_timeout >
/// 0`, so a slow or silent peer cannot occupy a pool worker indefinitely
/// during the upgrade; against the raw stream otherwise, per §4.D.2's
/// "chosen view" (the same view used for payload I/O once Active).
fn perform_upgrade(conn: &Connection) -> Result<(), handshake::error::HandshakeError> {
    match DeadlineStream::new(conn.raw_stream(), conn.io_timeout()) {
        Some(mut wrapped) => handshake::upgrade(&mut wrapped),
        None => {
            let mut stream = conn.raw_stream();
            handshake::upgrade(&mut stream)
        }
    }
}
