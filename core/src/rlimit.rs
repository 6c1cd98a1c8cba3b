//! Raising `RLIMIT_NOFILE` at startup.
//!
//! The original source performed this at process load time inside an
//! `init()` function; the Design Notes call that out as global mutable
//! state happening implicitly, and recommend exposing it as an explicit,
//! independently callable (and therefore stubbable/testable) hook instead.
//! [`Server::run`](crate::server::Server::run) calls [`raise_nofile_limit`]
//! once at the start of the accept loop.

use thiserror::Error;

/// Failure to raise the open-file-descriptor limit.
#[derive(Debug, Error)]
#[error("getrlimit/setrlimit(RLIMIT_NOFILE) failed: {0}")]
pub struct RlimitError(#[source] std::io::Error);

/// Raises the soft limit on open file descriptors to the hard limit.
///
/// This is fatal for the server if it fails: the server cannot sustain its
/// target connection count without enough descriptors.
pub fn raise_nofile_limit() -> Result<(), RlimitError> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };

    // Safety: `limit` is a valid, appropriately-sized out-parameter for
    // `getrlimit`, which only ever writes to it.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        return Err(RlimitError(std::io::Error::last_os_error()));
    }

    if limit.rlim_cur >= limit.rlim_max {
        return Ok(());
    }

    limit.rlim_cur = limit.rlim_max;

    // Safety: `limit` was just read back from the kernel and only its
    // `rlim_cur` field was raised, which is always permitted up to
    // `rlim_max` for an unprivileged process.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) };
    if rc != 0 {
        return Err(RlimitError(std::io::Error::last_os_error()));
    }

    tracing::debug!(soft = limit.rlim_cur, hard = limit.rlim_max, "raised RLIMIT_NOFILE");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raising_the_limit_does_not_error() {
        // The test process always has permission to raise its own soft
        // limit up to its own hard limit, so this should never fail in CI.
        raise_nofile_limit().unwrap();
    }
}
