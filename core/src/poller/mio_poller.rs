//! A [`Poller`] built on `mio`'s cross-platform epoll/kqueue/IOCP wrapper.
//!
//! `mio` does not expose a one-shot registration flag directly; this adapter
//! emulates it by tracking armed/disarmed state per token and forcing a
//! `reregister` on [`MioPoller::resume`], which makes the OS poller
//! re-evaluate current readiness immediately rather than waiting for a new
//! edge that may never come if the connection was already readable.
//!
//! Connections are registered via [`mio::unix::SourceFd`], which borrows a
//! raw file descriptor without taking ownership or toggling its blocking
//! mode. That matters here: the engine keeps connections as ordinary
//! blocking `std::net::TcpStream`s (so the Deadline Wrapper's
//! `set_read_timeout`/`set_write_timeout` behave as documented) while still
//! registering the same descriptor for edge-triggered readiness dispatch.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::thread;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry};

use super::{Poller, ReadinessEvent, Token};

struct ArmState {
    armed: bool,
}

/// A [`Poller`] backed by `mio::Poll`.
#[derive(Debug)]
pub struct MioPoller {
    registry: Registry,
    poll: Mutex<Option<Poll>>,
    armed: Arc<Mutex<HashMap<Token, ArmState>>>,
}

impl MioPoller {
    /// Creates a new poller with its own `mio::Poll` instance.
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        Ok(Self {
            registry,
            poll: Mutex::new(Some(poll)),
            armed: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

impl Poller for MioPoller {
    fn register(&self, fd: RawFd, token: Token, one_shot: bool) -> io::Result<()> {
        self.registry
            .register(&mut SourceFd(&fd), token, Interest::READABLE)?;
        if one_shot {
            self.armed
                .lock()
                .unwrap()
                .insert(token, ArmState { armed: true });
        }
        Ok(())
    }

    fn resume(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.registry
            .reregister(&mut SourceFd(&fd), token, Interest::READABLE)?;
        if let Some(state) = self.armed.lock().unwrap().get_mut(&token) {
            state.armed = true;
        }
        Ok(())
    }

    fn unregister(&self, fd: RawFd, token: Token) -> io::Result<()> {
        let _ = self.registry.deregister(&mut SourceFd(&fd));
        self.armed.lock().unwrap().remove(&token);
        Ok(())
    }

    fn start(&self, on_event: Box<dyn Fn(ReadinessEvent) + Send + Sync>) -> io::Result<()> {
        let mut guard = self.poll.lock().unwrap();
        let poll = guard
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "poller already started"))?;
        drop(guard);

        let armed = Arc::clone(&self.armed);
        thread::Builder::new()
            .name("wsrt-poller".to_string())
            .spawn(move || dispatch_loop(poll, armed, on_event))
            .expect("failed to spawn poller dispatch thread");
        Ok(())
    }
}

fn dispatch_loop(
    mut poll: Poll,
    armed: Arc<Mutex<HashMap<Token, ArmState>>>,
    on_event: Box<dyn Fn(ReadinessEvent) + Send + Sync>,
) {
    let mut events = Events::with_capacity(1024);
    loop {
        if let Err(err) = poll.poll(&mut events, None) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::error!(%err, "poller dispatch loop exiting after fatal poll error");
            return;
        }

        for event in events.iter() {
            let token = event.token();

            let deliver = {
                let mut armed = armed.lock().unwrap();
                match armed.get_mut(&token) {
                    Some(state) if state.armed => {
                        state.armed = false;
                        true
                    }
                    Some(_) => false,
                    None => true,
                }
            };

            if !deliver {
                continue;
            }

            on_event(ReadinessEvent {
                token,
                readable: event.is_readable(),
                read_hangup: event.is_read_closed(),
                hangup: event.is_error() || event.is_write_closed(),
            });
        }
    }
}
