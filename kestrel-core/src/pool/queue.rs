//! Task queues for the worker pool
//!
//! The original policy knob (which order pending tasks are handed to idle
//! workers) is a closed set, so it is one enum over three containers rather
//! than a trait. The queue itself is not thread-safe; the pool serializes
//! access through its own lock.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// A scheduled unit of work. Panics inside the closure are contained by the
/// worker that runs it.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Queue ordering selected at pool construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulePolicy {
    /// Insertion order.
    #[default]
    Fifo,
    /// Stack order: the newest submission runs first.
    Lifo,
    /// Highest priority first; equal priorities are unordered.
    Priority,
}

pub(crate) struct PrioTask {
    priority: u32,
    task: Task,
}

impl PartialEq for PrioTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for PrioTask {}

impl PartialOrd for PrioTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority)
    }
}

pub(crate) enum TaskQueue {
    Fifo(VecDeque<Task>),
    Lifo(VecDeque<Task>),
    Priority(BinaryHeap<PrioTask>),
}

impl TaskQueue {
    pub fn new(policy: SchedulePolicy) -> Self {
        match policy {
            SchedulePolicy::Fifo => TaskQueue::Fifo(VecDeque::new()),
            SchedulePolicy::Lifo => TaskQueue::Lifo(VecDeque::new()),
            SchedulePolicy::Priority => TaskQueue::Priority(BinaryHeap::new()),
        }
    }

    /// Priority is ignored by the FIFO/LIFO variants.
    pub fn push(&mut self, task: Task, priority: u32) {
        match self {
            TaskQueue::Fifo(q) => q.push_back(task),
            TaskQueue::Lifo(q) => q.push_front(task),
            TaskQueue::Priority(q) => q.push(PrioTask { priority, task }),
        }
    }

    /// Remove and return the task that should run next.
    pub fn pop(&mut self) -> Option<Task> {
        match self {
            TaskQueue::Fifo(q) | TaskQueue::Lifo(q) => q.pop_front(),
            TaskQueue::Priority(q) => q.pop().map(|p| p.task),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TaskQueue::Fifo(q) | TaskQueue::Lifo(q) => q.len(),
            TaskQueue::Priority(q) => q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TaskQueue::Fifo(q) | TaskQueue::Lifo(q) => q.is_empty(),
            TaskQueue::Priority(q) => q.is_empty(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            TaskQueue::Fifo(q) | TaskQueue::Lifo(q) => q.clear(),
            TaskQueue::Priority(q) => q.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn tagged(order: &Arc<parking_lot::Mutex<Vec<u32>>>, tag: u32) -> Task {
        let order = order.clone();
        Box::new(move || order.lock().push(tag))
    }

    fn drain(queue: &mut TaskQueue) {
        while let Some(task) = queue.pop() {
            task();
        }
    }

    #[test]
    fn test_fifo_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut q = TaskQueue::new(SchedulePolicy::Fifo);
        for i in 0..4 {
            q.push(tagged(&order, i), 0);
        }
        drain(&mut q);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_lifo_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut q = TaskQueue::new(SchedulePolicy::Lifo);
        for i in 0..4 {
            q.push(tagged(&order, i), 0);
        }
        drain(&mut q);
        assert_eq!(*order.lock(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_priority_highest_first() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut q = TaskQueue::new(SchedulePolicy::Priority);
        q.push(tagged(&order, 1), 1);
        q.push(tagged(&order, 9), 9);
        q.push(tagged(&order, 5), 5);
        drain(&mut q);
        assert_eq!(*order.lock(), vec![9, 5, 1]);
    }

    #[test]
    fn test_clear_drops_pending() {
        let ran = Arc::new(AtomicU32::new(0));
        let mut q = TaskQueue::new(SchedulePolicy::Fifo);
        for _ in 0..3 {
            let ran = ran.clone();
            q.push(
                Box::new(move || {
                    ran.fetch_add(1, AtomicOrdering::SeqCst);
                }),
                0,
            );
        }
        q.clear();
        assert!(q.is_empty());
        drain(&mut q);
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);
    }
}
