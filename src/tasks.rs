//! Background task pipeline: task model, priority queue, producer API,
//! dispatcher and worker pool.

mod emitter;
mod handler;
mod queue;
mod task;
mod worker;

pub use emitter::TaskEmitter;
pub use handler::TaskHandler;
pub use queue::{TaskQueue, TaskSelector, TaskSink};
pub use task::{
    DEFAULT_PRIORITY, HIGHEST_PRIORITY, LOWEST_PRIORITY, Task, cascade_priority,
};
pub use worker::{TaskWorkers, drain_blocking};
