//! Deferred results for pool-scheduled computations
//!
//! A `Future<R>` is a handle to a value produced by a task running on a
//! [`WorkerPool`](super::WorkerPool). State lives under one mutex with one
//! condvar: `(ready, cancelled, executing, value)`. Cancellation is
//! cooperative: it never interrupts running code, it only prevents a task
//! that has not started from producing a value.

use super::pool::WorkerPool;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Instant;

struct FutureState<R> {
    ready: bool,
    cancelled: bool,
    executing: bool,
    value: Option<R>,
}

struct FutureShared<R> {
    state: Mutex<FutureState<R>>,
    ready_cond: Condvar,
}

/// Handle to a value that a pool task will produce.
pub struct Future<R> {
    shared: Arc<FutureShared<R>>,
}

impl<R> Clone for Future<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R> Default for Future<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Future<R> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FutureShared {
                state: Mutex::new(FutureState {
                    ready: false,
                    cancelled: false,
                    executing: false,
                    value: None,
                }),
                ready_cond: Condvar::new(),
            }),
        }
    }

    /// True once the task has produced its value or been skipped after
    /// cancellation.
    pub fn ready(&self) -> bool {
        self.shared.state.lock().ready
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.lock().cancelled
    }

    /// Request cancellation. Succeeds while the result is not yet ready, or
    /// while the task is executing (the flag is set but the code keeps
    /// running). Fails once the value is ready.
    pub fn cancel(&self) -> bool {
        let mut st = self.shared.state.lock();
        if !st.ready || st.executing {
            st.cancelled = true;
            true
        } else {
            false
        }
    }

    /// Block until the result is ready.
    pub fn wait(&self) {
        let mut st = self.shared.state.lock();
        while !st.ready {
            self.shared.ready_cond.wait(&mut st);
        }
    }

    /// Block until ready or the deadline passes; false on timeout. The task
    /// keeps running either way.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        let mut st = self.shared.state.lock();
        while !st.ready {
            if self
                .shared
                .ready_cond
                .wait_until(&mut st, deadline)
                .timed_out()
            {
                return false;
            }
        }
        true
    }

    fn mark_ready(&self, value: Option<R>) {
        let mut st = self.shared.state.lock();
        if !st.ready {
            if !st.cancelled {
                st.value = value;
            }
            st.ready = true;
        }
        self.shared.ready_cond.notify_all();
    }

    fn begin_execution(&self) -> bool {
        let mut st = self.shared.state.lock();
        if st.cancelled {
            return false;
        }
        st.executing = true;
        true
    }

    fn end_execution(&self) {
        self.shared.state.lock().executing = false;
    }
}

impl<R: Clone> Future<R> {
    /// Block until ready and return the value; `None` when the task was
    /// cancelled before producing one.
    pub fn get(&self) -> Option<R> {
        self.wait();
        self.shared.state.lock().value.clone()
    }

    /// Non-blocking peek.
    pub fn try_get(&self) -> Option<R> {
        let st = self.shared.state.lock();
        if st.ready {
            st.value.clone()
        } else {
            None
        }
    }
}

/// Schedule `f` on `pool` and return the future observing its result.
///
/// The future becomes ready when the task returns, or when the pool reaches
/// a task whose future was already cancelled (skipped, no value). If the
/// pool refuses the submission the future is resolved immediately as
/// cancelled.
pub fn schedule_future<R, F>(pool: &WorkerPool, f: F) -> Future<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let fut = Future::new();
    let task_view = fut.clone();
    let accepted = pool.schedule(move || {
        if !task_view.begin_execution() {
            task_view.mark_ready(None);
            return;
        }
        let value = f();
        task_view.end_execution();
        task_view.mark_ready(Some(value));
    });

    if !accepted {
        fut.cancel();
        fut.mark_ready(None);
    }
    fut
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_get_returns_value() {
        let pool = WorkerPool::new(2);
        let fut = schedule_future(&pool, || 21 * 2);
        assert_eq!(fut.get(), Some(42));
        assert!(fut.ready());
    }

    #[test]
    fn test_cancel_before_run_skips_execution() {
        // Keep the only worker busy so the second task sits in the queue.
        let pool = WorkerPool::new(1);
        pool.schedule(|| std::thread::sleep(Duration::from_millis(150)));

        let ran = Arc::new(AtomicBool::new(false));
        let ran_probe = ran.clone();
        let fut = schedule_future(&pool, move || {
            ran_probe.store(true, Ordering::SeqCst);
            7
        });

        assert!(fut.cancel());
        fut.wait();
        assert!(fut.ready());
        assert!(fut.is_cancelled());
        assert_eq!(fut.get(), None);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_after_ready_fails() {
        let pool = WorkerPool::new(1);
        let fut = schedule_future(&pool, || 1);
        fut.wait();
        assert!(!fut.cancel());
        assert_eq!(fut.get(), Some(1));
    }

    #[test]
    fn test_cancel_during_execution_keeps_running() {
        let pool = WorkerPool::new(1);
        let fut = schedule_future(&pool, || {
            std::thread::sleep(Duration::from_millis(120));
            5
        });
        std::thread::sleep(Duration::from_millis(30));
        // The task is mid-flight: cancel succeeds but does not interrupt it.
        assert!(fut.cancel());
        fut.wait();
        assert!(fut.is_cancelled());
        assert_eq!(fut.get(), None);
    }

    #[test]
    fn test_wait_deadline_timeout() {
        let pool = WorkerPool::new(1);
        let fut = schedule_future(&pool, || {
            std::thread::sleep(Duration::from_millis(200));
            1
        });
        assert!(!fut.wait_deadline(Instant::now() + Duration::from_millis(20)));
        assert!(fut.wait_deadline(Instant::now() + Duration::from_secs(2)));
        assert_eq!(fut.get(), Some(1));
    }

    #[test]
    fn test_schedule_on_stopped_pool_resolves_cancelled() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        let fut = schedule_future(&pool, || 3);
        assert!(fut.ready());
        assert_eq!(fut.get(), None);
    }
}
