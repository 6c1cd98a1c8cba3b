use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use wsrt_core::pool::Pool;

#[test]
fn new_rejects_zero_size_or_zero_queue() {
    assert!(Pool::new(0, 3).is_err());
    assert!(Pool::new(5, 0).is_err());
}

#[test]
fn executes_every_scheduled_job_exactly_once() {
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
fn schedule_with_deadline_times_out_when_saturated_then_succeeds_with_more_time() {
    let pool = Pool::new(1, 1).unwrap();
    pool.schedule(|| thread::sleep(Duration::from_millis(20)));
    pool.schedule(|| {});

    assert!(pool
        .schedule_with_deadline(|| {}, Duration::from_millis(10))
        .is_err());

    let pool = Pool::new(1, 1).unwrap();
    pool.schedule(|| thread::sleep(Duration::from_millis(20)));
    pool.schedule(|| {});
    assert!(pool
        .schedule_with_deadline(|| {}, Duration::from_millis(100))
        .is_ok());
    pool.shutdown();
}

proptest! {
    /// For any sequence of blocking admissions into a bounded pool, every
    /// admitted job eventually runs exactly once.
    #[test]
    fn blocking_admissions_all_run_exactly_once(job_count in 1usize..200, workers in 1usize..8, queue in 1usize..8) {
        let pool = Pool::new(workers, queue).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..job_count {
            let seen = Arc::clone(&seen);
            pool.schedule(move || {
                seen.lock().unwrap().push(i);
            });
        }
        pool.shutdown();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..job_count).collect::<Vec<_>>());
    }

    /// A job rejected with a schedule timeout never runs.
    #[test]
    fn timed_out_admissions_never_run(deadline_ms in 0u64..5) {
        let pool = Pool::new(1, 1).unwrap();
        pool.schedule(|| thread::sleep(Duration::from_millis(50)));
        pool.schedule(|| {});

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let result = pool.schedule_with_deadline(
            move || { ran_clone.fetch_add(1, Ordering::SeqCst); },
            Duration::from_millis(deadline_ms),
        );

        if result.is_err() {
            thread::sleep(Duration::from_millis(80));
            prop_assert_eq!(ran.load(Ordering::SeqCst), 0);
        }
        pool.shutdown();
    }
}
