//! Worker pool and futures through the public API.

use kestrel_core::pool::{schedule_future, SchedulePolicy, ShutdownPolicy, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_three_tasks_two_workers_wait_threshold() {
    // Three long tasks on two workers: wait(1) returns once only one task
    // remains in flight, and the queue is drained by then.
    let pool = WorkerPool::new(2);
    let running = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let running = running.clone();
        pool.schedule(move || {
            running.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
        });
    }

    let start = Instant::now();
    pool.wait(1);
    assert!(start.elapsed() < Duration::from_millis(900));
    assert_eq!(pool.pending(), 0);
    pool.wait(0);
    assert_eq!(running.load(Ordering::SeqCst), 3);
}

#[test]
fn test_future_cancel_before_run() {
    let pool = WorkerPool::new(1);
    pool.schedule(|| std::thread::sleep(Duration::from_millis(200)));

    let touched = Arc::new(AtomicUsize::new(0));
    let probe = touched.clone();
    let fut = schedule_future(&pool, move || {
        probe.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_secs(1));
        42
    });

    assert!(fut.cancel());
    fut.wait();
    assert!(fut.ready());
    assert_eq!(fut.get(), None);
    assert_eq!(touched.load(Ordering::SeqCst), 0);
}

#[test]
fn test_priority_pool_runs_high_first() {
    let pool = WorkerPool::with_policies(
        1,
        SchedulePolicy::Priority,
        ShutdownPolicy::WaitForAllTasks,
    );
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    // Park the worker so the queue orders the rest.
    pool.schedule(|| std::thread::sleep(Duration::from_millis(100)));
    std::thread::sleep(Duration::from_millis(20));
    for (prio, tag) in [(1u32, "low"), (9, "high"), (5, "mid")] {
        let order = order.clone();
        pool.schedule_prio(move || order.lock().push(tag), prio);
    }
    pool.wait(0);

    assert_eq!(*order.lock(), vec!["high", "mid", "low"]);
}

#[test]
fn test_pool_survives_poisoned_tasks_under_load() {
    let pool = WorkerPool::new(4);
    let done = Arc::new(AtomicUsize::new(0));
    for i in 0..100 {
        let done = done.clone();
        pool.schedule(move || {
            if i % 10 == 0 {
                panic!("scripted failure");
            }
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    pool.wait(0);
    assert_eq!(done.load(Ordering::SeqCst), 90);
    assert_eq!(pool.size(), 4);
}
