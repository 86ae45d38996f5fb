//! Lifecycle token plumbing for worker threads.
//!
//! Workers block in a `crossbeam_channel::select!`, which cannot wait on a
//! [`CancellationToken`] directly. A watcher thread parks on the token and
//! drops the sending half of the `done` channel once it is cancelled, which
//! wakes every worker selecting on the receiving half.

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, bounded};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Uninhabited message type: the `done` channel only ever disconnects.
pub(crate) enum Never {}

pub(crate) struct Lifecycle {
    token: CancellationToken,
    done: Receiver<Never>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Lifecycle {
    /// Derives a child of `parent` so cancelling the parent also stops the
    /// pool, while stopping the pool leaves the parent untouched.
    pub(crate) fn new(parent: &CancellationToken) -> Result<Self> {
        let token = parent.child_token();
        let (done_tx, done) = bounded::<Never>(0);

        let watched = token.clone();
        let name = String::from("brands-pool-lifecycle");
        let watcher = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                futures::executor::block_on(watched.cancelled());
                drop(done_tx);
            })
            .map_err(|source| Error::Spawn { name, source })?;

        Ok(Self {
            token,
            done,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn done(&self) -> &Receiver<Never> {
        &self.done
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the watcher thread. Only meaningful after [`Self::cancel`].
    pub(crate) fn join(&self) {
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            if watcher.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Lifecycle watcher thread panicked");
            }
        }
    }
}
