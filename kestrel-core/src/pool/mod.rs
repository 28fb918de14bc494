//! Generic worker-pool primitive
//!
//! Used by surrounding I/O code to execute detached callables and to
//! fulfill future results. Policy knobs: scheduling order (FIFO / LIFO /
//! priority), a static worker count restored on worker death, and one of
//! three shutdown behaviors.

mod future;
#[allow(clippy::module_inception)]
mod pool;
mod queue;

pub use future::{schedule_future, Future};
pub use pool::{ShutdownPolicy, WorkerPool};
pub use queue::{SchedulePolicy, Task};
