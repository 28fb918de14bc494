//! Bounded worker pool
//!
//! A fixed-target pool of worker threads draining one task queue. Submissions
//! are serialized through the pool lock; tasks run unlocked. A task that
//! panics takes its worker down through the panic boundary and the pool
//! immediately spawns a replacement to restore the target count.
//!
//! Shutdown behavior is chosen at construction:
//! - `WaitForAllTasks` drains the queue, then joins every worker.
//! - `WaitForActiveTasks` drops pending tasks, waits for in-flight ones,
//!   then joins.
//! - `Immediately` drops pending tasks and detaches the workers; in-flight
//!   tasks still run to completion.

use super::queue::{SchedulePolicy, Task, TaskQueue};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// What happens to queued and running tasks when the pool goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    #[default]
    WaitForAllTasks,
    WaitForActiveTasks,
    Immediately,
}

struct PoolState {
    queue: TaskQueue,
    worker_count: usize,
    target_worker_count: usize,
    active_count: usize,
    terminate_all: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    /// Signaled when a worker goes idle or terminates; `wait` sleeps here.
    idle_or_terminated: Condvar,
    /// Signaled when a task arrives or workers must shrink/terminate.
    task_or_terminate: Condvar,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// One worker's life: fetch under the lock, run unlocked, repeat.
fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let task = {
            let mut st = shared.state.lock();

            if st.worker_count > st.target_worker_count {
                st.worker_count -= 1;
                st.active_count -= 1;
                shared.idle_or_terminated.notify_all();
                return;
            }

            loop {
                if !st.queue.is_empty() {
                    break;
                }
                if st.worker_count > st.target_worker_count {
                    st.worker_count -= 1;
                    st.active_count -= 1;
                    shared.idle_or_terminated.notify_all();
                    return;
                }
                st.active_count -= 1;
                shared.idle_or_terminated.notify_all();
                shared.task_or_terminate.wait(&mut st);
                st.active_count += 1;
            }

            st.queue.pop().expect("queue checked non-empty under lock")
        };

        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::warn!("worker task panicked; replacing worker");
            worker_died(&shared);
            return;
        }
    }
}

/// Panic path: retire this worker and restore the target count.
fn worker_died(shared: &Arc<PoolShared>) {
    let respawn = {
        let mut st = shared.state.lock();
        st.worker_count -= 1;
        st.active_count -= 1;
        shared.idle_or_terminated.notify_all();
        if st.terminate_all {
            false
        } else {
            st.worker_count += 1;
            st.active_count += 1;
            true
        }
    };
    if respawn {
        spawn_worker(shared);
    }
}

fn spawn_worker(shared: &Arc<PoolShared>) {
    let cloned = Arc::clone(shared);
    let handle = std::thread::spawn(move || worker_loop(cloned));
    shared.handles.lock().push(handle);
}

/// Thread pool executing detached nullary tasks.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    shutdown_policy: ShutdownPolicy,
    down: AtomicBool,
}

impl WorkerPool {
    /// FIFO pool with `workers` threads that drains on shutdown.
    pub fn new(workers: usize) -> Self {
        Self::with_policies(workers, SchedulePolicy::Fifo, ShutdownPolicy::WaitForAllTasks)
    }

    pub fn with_policies(
        workers: usize,
        schedule: SchedulePolicy,
        shutdown: ShutdownPolicy,
    ) -> Self {
        let pool = Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    queue: TaskQueue::new(schedule),
                    worker_count: 0,
                    target_worker_count: 0,
                    active_count: 0,
                    terminate_all: false,
                }),
                idle_or_terminated: Condvar::new(),
                task_or_terminate: Condvar::new(),
                handles: Mutex::new(Vec::new()),
            }),
            shutdown_policy: shutdown,
            down: AtomicBool::new(false),
        };
        pool.resize(workers);
        pool
    }

    /// Queue a task for asynchronous execution. Returns false once the pool
    /// is terminating. An accepted task runs at most once.
    pub fn schedule<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_prio(task, 0)
    }

    /// Queue a task with an explicit priority (meaningful only under the
    /// priority policy; ignored otherwise).
    pub fn schedule_prio<F>(&self, task: F, priority: u32) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut st = self.shared.state.lock();
        if st.terminate_all {
            return false;
        }
        st.queue.push(Box::new(task) as Task, priority);
        self.shared.task_or_terminate.notify_one();
        true
    }

    /// Current number of worker threads (idle and busy).
    pub fn size(&self) -> usize {
        self.shared.state.lock().worker_count
    }

    /// Number of tasks currently executing.
    pub fn active(&self) -> usize {
        self.shared.state.lock().active_count
    }

    /// Number of queued tasks not yet started.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().queue.is_empty()
    }

    /// Drop every task that has not started. In-flight tasks are unaffected.
    pub fn clear(&self) {
        self.shared.state.lock().queue.clear();
    }

    /// Change the target worker count. Growth spawns immediately; shrinkage
    /// happens as workers come back to the queue.
    pub fn resize(&self, workers: usize) -> bool {
        let to_spawn = {
            let mut st = self.shared.state.lock();
            if st.terminate_all {
                return false;
            }
            st.target_worker_count = workers;
            if st.worker_count < workers {
                let add = workers - st.worker_count;
                st.worker_count += add;
                st.active_count += add;
                add
            } else {
                self.shared.task_or_terminate.notify_all();
                0
            }
        };
        for _ in 0..to_spawn {
            spawn_worker(&self.shared);
        }
        true
    }

    /// Block until `active + pending <= threshold`.
    pub fn wait(&self, threshold: usize) {
        let mut st = self.shared.state.lock();
        while st.active_count + st.queue.len() > threshold {
            self.shared.idle_or_terminated.wait(&mut st);
        }
    }

    /// Like [`wait`](Self::wait) with an absolute deadline. Returns false on
    /// timeout, leaving queued and running tasks untouched.
    pub fn wait_deadline(&self, deadline: Instant, threshold: usize) -> bool {
        let mut st = self.shared.state.lock();
        while st.active_count + st.queue.len() > threshold {
            if self
                .shared
                .idle_or_terminated
                .wait_until(&mut st, deadline)
                .timed_out()
            {
                return false;
            }
        }
        true
    }

    /// Apply the construction-time shutdown policy. Idempotent.
    pub fn shutdown(&self) {
        if self.down.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.shutdown_policy {
            ShutdownPolicy::WaitForAllTasks => {
                self.wait(0);
                self.terminate_all_workers(true);
            }
            ShutdownPolicy::WaitForActiveTasks => {
                self.clear();
                self.wait(0);
                self.terminate_all_workers(true);
            }
            ShutdownPolicy::Immediately => {
                self.clear();
                self.terminate_all_workers(false);
            }
        }
    }

    fn terminate_all_workers(&self, wait: bool) {
        {
            let mut st = self.shared.state.lock();
            st.terminate_all = true;
            st.target_worker_count = 0;
            self.shared.task_or_terminate.notify_all();
        }

        if wait {
            {
                let mut st = self.shared.state.lock();
                while st.worker_count > 0 {
                    self.shared.idle_or_terminated.wait(&mut st);
                }
            }
            let handles = std::mem::take(&mut *self.shared.handles.lock());
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_executes_all_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..64 {
            let counter = counter.clone();
            assert!(pool.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.wait(0);
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn test_wait_threshold_and_pending_drain() {
        // Three long tasks on two workers; wait(1) returns once at most
        // one task remains in flight.
        let pool = WorkerPool::new(2);
        for _ in 0..3 {
            pool.schedule(|| std::thread::sleep(Duration::from_millis(200)));
        }
        let start = Instant::now();
        pool.wait(1);
        assert!(start.elapsed() < Duration::from_millis(600));
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_wait_deadline_times_out() {
        let pool = WorkerPool::new(1);
        pool.schedule(|| std::thread::sleep(Duration::from_millis(400)));
        let deadline = Instant::now() + Duration::from_millis(50);
        assert!(!pool.wait_deadline(deadline, 0));
        // The task keeps running and eventually drains.
        assert!(pool.wait_deadline(Instant::now() + Duration::from_secs(2), 0));
    }

    #[test]
    fn test_panicking_task_replaces_worker() {
        let pool = WorkerPool::new(2);
        pool.schedule(|| panic!("boom"));
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = counter.clone();
            pool.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait(0);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_clear_drops_unstarted_tasks() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        // First task occupies the only worker.
        pool.schedule(|| std::thread::sleep(Duration::from_millis(150)));
        for _ in 0..5 {
            let counter = counter.clone();
            pool.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        std::thread::sleep(Duration::from_millis(30));
        pool.clear();
        pool.wait(0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fifo_pop_order_single_worker() {
        let pool = WorkerPool::with_policies(
            1,
            SchedulePolicy::Fifo,
            ShutdownPolicy::WaitForAllTasks,
        );
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..6 {
            let order = order.clone();
            pool.schedule(move || order.lock().push(i));
        }
        pool.wait(0);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_shutdown_wait_for_all_runs_everything() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2);
            for _ in 0..10 {
                let counter = counter.clone();
                pool.schedule(move || {
                    std::thread::sleep(Duration::from_millis(10));
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            pool.shutdown();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_shutdown_immediately_drops_pending() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::with_policies(
            1,
            SchedulePolicy::Fifo,
            ShutdownPolicy::Immediately,
        );
        pool.schedule(|| std::thread::sleep(Duration::from_millis(100)));
        for _ in 0..5 {
            let counter = counter.clone();
            pool.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        std::thread::sleep(Duration::from_millis(20));
        pool.shutdown();
        assert!(!pool.schedule(|| {}));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resize_shrinks_idle_workers() {
        let pool = WorkerPool::new(4);
        pool.wait(0);
        pool.resize(1);
        // Workers observe the new target when they next touch the queue.
        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.size() > 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.size(), 1);
    }
}
