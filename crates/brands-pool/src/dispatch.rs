//! Result dispatch helpers.
//!
//! Service code typically submits a closure that sends its result back over a
//! single-slot channel and then waits on that channel. These helpers encode
//! that convention with a [`oneshot`] channel.
//!
//! The handoff is still the best-effort [`WorkerPool::submit`]. When a task
//! is dropped, its captured sender is dropped with it, so the receiver closes
//! instead of waiting forever. The same happens if the task panics.

use crate::{
    error::{Error, Result},
    pool::WorkerPool,
    worker::WorkerId,
};
use core::future::Future;
use tokio::sync::oneshot;

impl WorkerPool {
    /// Submits `job` and returns a receiver for its return value.
    ///
    /// The receiver resolves to an error if the task was dropped because no
    /// worker was idle, the pool was stopped, or `job` panicked. Synchronous
    /// callers can use [`oneshot::Receiver::blocking_recv`].
    pub fn submit_with_result<T, F>(&self, job: F) -> oneshot::Receiver<T>
    where
        F: FnOnce(WorkerId) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(move |worker_id| {
            // The caller may have stopped waiting.
            let _ = tx.send(job(worker_id));
        });
        rx
    }

    /// Submits `job` and waits for its return value.
    ///
    /// The task is offered to the pool immediately, before the returned future
    /// is first polled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDropped`] if the task never produced a value.
    pub fn run<T, F>(&self, job: F) -> impl Future<Output = Result<T>> + use<T, F>
    where
        F: FnOnce(WorkerId) -> T + Send + 'static,
        T: Send + 'static,
    {
        let rx = self.submit_with_result(job);
        async move { rx.await.map_err(|_| Error::TaskDropped) }
    }
}
