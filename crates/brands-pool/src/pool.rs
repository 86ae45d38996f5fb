//! Resizable pool of worker threads with a direct, unqueued task handoff.
//!
//! This module defines the [`WorkerPool`] struct. An idle worker puts itself
//! on the pool's idle list and blocks on its own single-task slot. A task is
//! handed off only if some worker is on that list at the moment it is
//! submitted. Nothing is ever queued.
//!
//! Workers are stopped individually through a separate channel (each message
//! is received by exactly one worker) or all at once by cancelling the pool's
//! [`CancellationToken`].
//!
//! # Submission is not a queue
//!
//! [`WorkerPool::submit`] never blocks. When every worker is busy the task is
//! discarded and the caller is not told. Callers that need the result must
//! capture their own channel, and must be prepared for it to close without a
//! value. See [`WorkerPool::submit_with_result`].

use crate::{
    error::{Error, Result},
    lifecycle::Lifecycle,
    worker::{IdleWorker, Worker, WorkerId},
};
use core::cmp::Ordering as CapacityChange;
use crossbeam_channel::{Receiver, Sender, unbounded};
use crossbeam_utils::sync::WaitGroup;
use parking_lot::{Mutex, Once};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio_util::sync::CancellationToken;

/// Mutable sizing state, guarded by [`Shared::state`].
pub(crate) struct PoolState {
    pub(crate) capacity: usize,
    pub(crate) active_workers: usize,
    next_worker_id: WorkerId,
    /// `None` once the pool has been stopped.
    wait_group: Option<WaitGroup>,
}

/// State shared between the pool handle and its worker threads.
pub(crate) struct Shared {
    pub(crate) state: Mutex<PoolState>,
    /// Workers ready to take a task right now.
    pub(crate) idle: Mutex<Vec<IdleWorker>>,
    pub(crate) panicked: AtomicU64,
}

/// A dynamically sized pool of worker threads.
///
/// Tasks are closures receiving the ID of the worker that runs them. Any idle
/// worker may pick up the next task; there is no ordering guarantee when more
/// than one worker is idle.
///
/// The pool is stopped by [`WorkerPool::stop`], by cancelling the parent token
/// passed at construction, or by dropping it.
pub struct WorkerPool {
    shared: Arc<Shared>,
    lifecycle: Lifecycle,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    dropped: AtomicU64,
    stop_once: Once,
    #[cfg(feature = "tracing")]
    dispatch: tracing::Dispatch,
}

impl WorkerPool {
    /// Creates a pool with one worker per logical CPU.
    ///
    /// The pool's lifecycle is a child of `parent`: cancelling `parent` stops
    /// the pool, stopping the pool does not cancel `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if a thread cannot be started. Workers started
    /// before the failure are shut down.
    pub fn new(parent: &CancellationToken) -> Result<Self> {
        Self::with_capacity(parent, num_cpus::get())
    }

    /// Creates a pool with exactly `capacity` workers.
    ///
    /// On success every worker is on the idle list, so the first `capacity`
    /// submissions are all handed off.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCapacity`] if `capacity` is zero.
    /// - [`Error::Spawn`] if a thread cannot be started.
    pub fn with_capacity(parent: &CancellationToken, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        let (stop_tx, stop_rx) = unbounded();

        let pool = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    capacity: 0,
                    active_workers: 0,
                    next_worker_id: 0,
                    wait_group: Some(WaitGroup::new()),
                }),
                idle: Mutex::new(Vec::with_capacity(capacity)),
                panicked: AtomicU64::new(0),
            }),
            lifecycle: Lifecycle::new(parent)?,
            stop_tx,
            stop_rx,
            dropped: AtomicU64::new(0),
            stop_once: Once::new(),
            #[cfg(feature = "tracing")]
            dispatch: tracing::dispatcher::get_default(Clone::clone),
        };

        // On failure `pool` is dropped here, which stops the partial set.
        pool.resize(capacity)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool started with {capacity} workers");

        Ok(pool)
    }

    /// Hands `task` to an idle worker, or drops it.
    ///
    /// Never blocks and never reports the outcome. If no worker is waiting at
    /// this instant, or the pool is stopped, the task is discarded without
    /// running. Use [`WorkerPool::try_submit`] to observe the decision.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce(WorkerId) + Send + 'static,
    {
        if let Err(_e) = self.try_submit(task) {
            #[cfg(feature = "tracing")]
            tracing::debug!("Task dropped: {_e}");
        }
    }

    /// Same handoff as [`WorkerPool::submit`], but reports why a task was
    /// dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::Saturated`] if no worker was idle.
    /// - [`Error::Stopped`] if the pool is cancelled or stopped.
    ///
    /// In both cases the task has been dropped.
    pub fn try_submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(WorkerId) + Send + 'static,
    {
        let outcome = if self.lifecycle.is_cancelled() {
            Err(Error::Stopped)
        } else {
            // Held across the handoff so a withdrawing worker either is still
            // listed or already has the task in its slot.
            let mut idle = self.shared.idle.lock();
            match idle.pop() {
                Some(worker) => worker.hand_off(Box::new(task)),
                None => Err(Error::Saturated),
            }
        };

        if outcome.is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Changes the target number of workers.
    ///
    /// Growing is synchronous: when this returns every new worker is on the
    /// idle list and can be handed a task.
    /// Stop signals still pending from an earlier shrink are withdrawn first,
    /// so they cannot take down the workers being added.
    ///
    /// Shrinking is fire-and-forget: one stop signal is sent per worker to
    /// remove and each is consumed by exactly one worker. Busy workers finish
    /// their current task first, so [`WorkerPool::active_workers`] converges
    /// to the new capacity rather than matching it on return.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCapacity`] if `new_capacity` is zero.
    /// - [`Error::Stopped`] if the pool is cancelled or stopped.
    /// - [`Error::Spawn`] if a thread cannot be started. Workers started
    ///   before the failure are kept and counted in the capacity.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        if new_capacity == 0 {
            return Err(Error::InvalidCapacity(new_capacity));
        }

        let mut state = self.shared.state.lock();
        if self.lifecycle.is_cancelled() || state.wait_group.is_none() {
            return Err(Error::Stopped);
        }

        match new_capacity.cmp(&state.capacity) {
            CapacityChange::Greater => {
                let mut missing = new_capacity - state.capacity;
                while missing > 0 && self.stop_rx.try_recv().is_ok() {
                    missing -= 1;
                    state.capacity += 1;
                }

                let started = WaitGroup::new();
                let mut spawned = Ok(());
                for _ in 0..missing {
                    spawned = self.spawn_worker(&mut state, &started);
                    if spawned.is_err() {
                        break;
                    }
                    state.capacity += 1;
                }
                started.wait();
                spawned?;
            }
            CapacityChange::Less => {
                for _ in new_capacity..state.capacity {
                    // Never fails: the pool holds a receiver.
                    let _ = self.stop_tx.send(());
                }
                state.capacity = new_capacity;
            }
            CapacityChange::Equal => {}
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Worker pool resized to {} ({} active)",
            state.capacity,
            state.active_workers
        );

        Ok(())
    }

    /// Starts one worker thread. Must be called with the state lock held.
    fn spawn_worker(&self, state: &mut PoolState, started: &WaitGroup) -> Result<()> {
        let Some(wait_group) = state.wait_group.clone() else {
            return Err(Error::Stopped);
        };

        let worker_id = state.next_worker_id + 1;
        let worker = Worker {
            id: worker_id,
            stop: self.stop_rx.clone(),
            done: self.lifecycle.done().clone(),
            token: self.lifecycle.token().clone(),
            shared: Arc::clone(&self.shared),
        };
        let started = started.clone();
        #[cfg(feature = "tracing")]
        let dispatch = self.dispatch.clone();

        let name = format!("brands-pool-worker-{worker_id}");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                #[cfg(feature = "tracing")]
                let _dispatch = tracing::dispatcher::set_default(&dispatch);
                worker.run(started, wait_group);
            })
            .map_err(|source| Error::Spawn { name, source })?;

        state.next_worker_id = worker_id;
        state.active_workers += 1;
        Ok(())
    }

    /// Stops every worker and clears the idle list.
    ///
    /// Cancels the lifecycle token, waits for all workers to finish their
    /// current task and exit, then clears the idle list. Running tasks are
    /// never interrupted, so a task that hangs makes this hang too. A task
    /// accepted just before cancellation still runs.
    ///
    /// Calling it more than once is a no-op; concurrent callers return once
    /// the first call has finished. Must not be called from inside a task,
    /// since that worker would wait on itself.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn stop(&self) {
        self.stop_once.call_once(|| {
            #[cfg(feature = "tracing")]
            tracing::debug!("Stopping worker pool");

            self.lifecycle.cancel();

            let wait_group = self.shared.state.lock().wait_group.take();
            if let Some(wait_group) = wait_group {
                wait_group.wait();
            }

            self.shared.idle.lock().clear();
            self.lifecycle.join();

            #[cfg(feature = "tracing")]
            tracing::info!("Worker pool stopped");
        });
    }

    /// Target number of workers.
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }

    /// Number of worker loops currently running.
    pub fn active_workers(&self) -> usize {
        self.shared.state.lock().active_workers
    }

    /// Total workers ever started. Also the highest worker ID handed out.
    pub fn spawned_workers(&self) -> usize {
        self.shared.state.lock().next_worker_id
    }

    /// Submissions discarded because no worker was idle or the pool was
    /// stopped.
    pub fn dropped_tasks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Tasks that panicked. Their workers kept running.
    pub fn panicked_tasks(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Whether the lifecycle token has been cancelled, either by
    /// [`WorkerPool::stop`] or through the parent token.
    pub fn is_stopped(&self) -> bool {
        self.lifecycle.is_cancelled()
    }
}

/// Dropping the pool calls [`WorkerPool::stop`] and blocks until every worker
/// has exited. Dropping the last handle (for example the last
/// `Arc<WorkerPool>`) from inside a task deadlocks, since that worker would
/// wait on itself.
impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}
