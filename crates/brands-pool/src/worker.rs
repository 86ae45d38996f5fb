use crate::{
    error::{Error, Result},
    lifecycle::Never,
    pool::Shared,
};
#[cfg(feature = "tracing")]
use core::any::Any;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use crossbeam_utils::sync::WaitGroup;
use portable_atomic::Ordering;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Identifier of the worker running a task. Assigned at spawn, starting at 1,
/// and never reused within a pool.
pub type WorkerId = usize;

/// A unit of work. Receives the ID of the worker executing it.
pub type Task = Box<dyn FnOnce(WorkerId) + Send + 'static>;

/// An idle worker, reachable through its single-task slot.
///
/// A worker is on the idle list only while its slot is empty and it is about
/// to block on it, so a handoff to a listed worker never fails.
pub(crate) struct IdleWorker {
    id: WorkerId,
    slot: Sender<Task>,
}

impl IdleWorker {
    /// Puts `task` in the worker's slot. Must be called while still holding
    /// the idle list lock the worker was taken from.
    pub(crate) fn hand_off(self, task: Task) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::trace!("Task handed to worker {}", self.id);

        self.slot.try_send(task).map_err(|_| Error::Stopped)
    }
}

/// Everything a single worker loop needs, moved onto its thread.
pub(crate) struct Worker {
    pub(crate) id: WorkerId,
    pub(crate) stop: Receiver<()>,
    pub(crate) done: Receiver<Never>,
    pub(crate) token: CancellationToken,
    pub(crate) shared: Arc<Shared>,
}

/// Decrements the active worker count when the loop exits, however it exits.
///
/// The count is updated before the wait group handle drops, so a caller that
/// returns from `WaitGroup::wait` always observes zero active workers.
struct ExitGuard {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    worker_id: WorkerId,
    shared: Arc<Shared>,
    _wait_group: WaitGroup,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.active_workers = state.active_workers.saturating_sub(1);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            "Worker {} stopped ({} still active)",
            self.worker_id,
            state.active_workers
        );
    }
}

impl Worker {
    /// Runs until the lifecycle token is cancelled or a stop signal is
    /// received.
    ///
    /// `started` is released once the worker is on the idle list for the first
    /// time, which lets `resize` return only after every new worker can be
    /// handed a task.
    pub(crate) fn run(self, started: WaitGroup, wait_group: WaitGroup) {
        let Self {
            id,
            stop,
            done,
            token,
            shared,
        } = self;

        let _guard = ExitGuard {
            worker_id: id,
            shared: Arc::clone(&shared),
            _wait_group: wait_group,
        };

        let (slot_tx, slot) = bounded::<Task>(1);
        let mut started = Some(started);

        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {id} started");

        loop {
            // Cancellation is only observed between tasks.
            if token.is_cancelled() {
                break;
            }

            shared.idle.lock().push(IdleWorker {
                id,
                slot: slot_tx.clone(),
            });
            drop(started.take());

            let (task, exit) = select! {
                recv(slot) -> task => {
                    let task = task.ok();
                    let exit = task.is_none();
                    (task, exit)
                },
                recv(done) -> _ => (withdraw(id, &slot, &shared), true),
                recv(stop) -> _ => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {id} received stop signal");
                    (withdraw(id, &slot, &shared), true)
                },
            };

            if let Some(task) = task {
                run_task(id, task, &shared);
            }
            if exit {
                break;
            }
        }
    }
}

/// Takes the worker off the idle list before it exits.
///
/// If a submitter already claimed the worker, the task is sitting in its slot
/// (handoff happens under the idle list lock) and is returned so it still
/// runs: an accepted task is never lost.
fn withdraw(id: WorkerId, slot: &Receiver<Task>, shared: &Shared) -> Option<Task> {
    let mut idle = shared.idle.lock();
    match idle.iter().position(|worker| worker.id == id) {
        Some(index) => {
            idle.swap_remove(index);
            None
        }
        None => slot.try_recv().ok(),
    }
}

/// Runs `task` behind a panic boundary so a faulty task never takes its
/// worker down with it.
fn run_task(worker_id: WorkerId, task: Task, shared: &Shared) {
    if let Err(_payload) = panic::catch_unwind(AssertUnwindSafe(move || task(worker_id))) {
        shared.panicked.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::error!(
            worker_id,
            "Task panicked: {}",
            panic_message(_payload.as_ref())
        );
    }
}

#[cfg(feature = "tracing")]
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
