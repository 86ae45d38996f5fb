//! Error types for the worker pool.
//!
//! Saturation is reported only by [`crate::WorkerPool::try_submit`]. The plain
//! [`crate::WorkerPool::submit`] swallows it: a dropped task is the expected
//! outcome of a best-effort handoff, not a failure.
//!
//! ## Error Cases
//! - `Saturated`: no worker was idle when the task was offered.
//! - `Stopped`: the pool was cancelled or stopped.
//! - `InvalidCapacity`: a pool cannot run with zero workers.
//! - `Spawn`: the OS refused to start a thread.
//! - `TaskDropped`: a dispatched task never produced its result.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the worker pool.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No worker was ready to take the task, so it was discarded.
    #[error("Worker pool is saturated, task dropped")]
    Saturated,

    /// The pool's lifecycle token was cancelled or `stop` was called.
    #[error("Worker pool is stopped")]
    Stopped,

    /// The requested worker count is not usable.
    #[error("Invalid capacity: {0} (must be greater than 0)")]
    InvalidCapacity(usize),

    /// A worker or lifecycle thread could not be spawned.
    #[error("Failed to spawn thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The task was dropped or panicked before sending its result.
    #[error("Task was dropped before producing a result")]
    TaskDropped,
}
