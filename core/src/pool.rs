//! Fixed-size worker pool with a bounded job queue and timeout-based
//! admission control.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, SendTimeoutError};
use thiserror::Error;

/// A unit of deferred work run on a pool worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors constructing a [`Pool`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PoolError {
    /// `size` was zero; a pool needs at least one worker.
    #[error("pool requires at least one worker")]
    NoWorkers,
    /// `queue_depth` was zero; the job queue needs nonzero capacity.
    #[error("pool job queue requires nonzero capacity")]
    NoQueueCapacity,
}

/// Returned by [`Pool::schedule_with_deadline`] when no slot became
/// available before the deadline elapsed. The job was not enqueued and
/// will never run.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("schedule timed out waiting for a pool slot")]
pub struct ScheduleTimeout;

/// A fixed-size set of worker threads draining a bounded job queue.
///
/// Jobs admitted via [`Pool::schedule`] or a successful
/// [`Pool::schedule_with_deadline`] are guaranteed to run exactly once, in
/// FIFO order with respect to admission (completion order is unspecified).
#[derive(Debug)]
pub struct Pool {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Constructs a pool with `size` workers and a job queue of capacity
    /// `queue_depth`. Fails if either is zero.
    pub fn new(size: usize, queue_depth: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }
        if queue_depth == 0 {
            return Err(PoolError::NoQueueCapacity);
        }

        let (sender, receiver): (Sender<Job>, Receiver<Job>) = bounded(queue_depth);
        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("wsrt-pool-{idx}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })
                .expect("failed to spawn pool worker thread");
            workers.push(handle);
        }

        Ok(Self { sender, workers })
    }

    /// Blocking admission: parks the caller until a slot is available.
    /// Never fails under normal operation.
    pub fn schedule(&self, job: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            tracing::error!("pool schedule failed: all worker threads have exited");
        }
    }

    /// Attempts to enqueue `job`, racing the enqueue against a timer of
    /// duration `deadline`. The job is either enqueued (and will run) or
    /// rejected with [`ScheduleTimeout`] (and will not run) — never both.
    pub fn schedule_with_deadline(
        &self,
        job: impl FnOnce() + Send + 'static,
        deadline: Duration,
    ) -> Result<(), ScheduleTimeout> {
        match self.sender.send_timeout(Box::new(job), deadline) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(ScheduleTimeout),
            Err(SendTimeoutError::Disconnected(_)) => {
                tracing::error!("pool schedule failed: all worker threads have exited");
                Err(ScheduleTimeout)
            }
        }
    }

    /// Closes the job queue and joins every worker after it drains any
    /// jobs already enqueued. Consumes the pool: nothing can be scheduled
    /// on it afterward, which Rust's ownership rules enforce statically.
    pub fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn rejects_zero_workers() {
        assert_eq!(Pool::new(0, 3).unwrap_err(), PoolError::NoWorkers);
    }

    #[test]
    fn rejects_zero_queue_depth() {
        assert_eq!(Pool::new(5, 0).unwrap_err(), PoolError::NoQueueCapacity);
    }

    #[test]
    fn executes_all_scheduled_jobs() {
        let pool = Pool::new(5, 5).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            pool.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        pool.shutdown();
    }

    #[test]
    fn schedule_with_deadline_times_out_when_queue_is_full() {
        let pool = Pool::new(1, 1).unwrap();
        // occupies the single worker for the duration of the test
        pool.schedule(|| thread::sleep(Duration::from_millis(40)));
        // fills the single queue slot
        pool.schedule(|| {});

        let result = pool.schedule_with_deadline(|| {}, Duration::from_millis(5));
        assert_eq!(result, Err(ScheduleTimeout));
        pool.shutdown();
    }

    #[test]
    fn schedule_with_deadline_succeeds_given_enough_time() {
        let pool = Pool::new(1, 1).unwrap();
        pool.schedule(|| thread::sleep(Duration::from_millis(20)));
        pool.schedule(|| {});

        let result = pool.schedule_with_deadline(|| {}, Duration::from_millis(100));
        assert_eq!(result, Ok(()));
        pool.shutdown();
    }
}
