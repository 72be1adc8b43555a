//! Leader lockout around the transaction submission path.
//!
//! With a lock service configured, a submission path only becomes active after
//! this node holds the lock and has sequenced the pending delayed messages
//! under it. The lock is then held for the life of the process. Without a lock
//! service, the path is activated directly after the same sequencing step.

use std::sync::Arc;

use slog::{Logger, o};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::NodeError;
use crate::services::LockService;
use crate::submission::Batcher;

pub struct LeaderLockout {
    lock: Option<Arc<dyn LockService>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    logger: Logger,
}

impl LeaderLockout {
    /// `tasks` receives the release of a lock whose activation was abandoned
    /// midway, so teardown waiting on it also waits for the release.
    pub fn new(
        lock: Option<Arc<dyn LockService>>,
        cancel: CancellationToken,
        tasks: TaskTracker,
        logger: Logger,
    ) -> Self {
        Self {
            lock,
            cancel,
            tasks,
            logger: logger.new(o!("component" => "lockout")),
        }
    }

    /// Gate `batcher` behind the lock, if any.
    ///
    /// Returns only once the path may run. On error nothing is held: a lock
    /// acquired for this attempt has been released again. The same holds when
    /// the returned future is dropped after acquisition.
    pub async fn activate(&self, batcher: Batcher) -> Result<ActiveSubmission, NodeError> {
        let Some(lock) = &self.lock else {
            self.sequence_pending(&batcher).await?;
            return Ok(ActiveSubmission {
                batcher,
                lock: None,
            });
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(NodeError::Cancelled("lockout acquisition")),
            acquired = lock.acquire(&self.cancel) => acquired?,
        }
        let held = AcquiredLock {
            lock: Some(Arc::clone(lock)),
            tasks: self.tasks.clone(),
            logger: self.logger.clone(),
        };
        slog::info!(self.logger, "Acquired sequencer lockout");

        let sequenced = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(NodeError::Cancelled("lockout sequencing")),
            sequenced = self.sequence_pending(&batcher) => sequenced,
        };
        if let Err(e) = sequenced {
            held.release().await;
            return Err(e);
        }

        Ok(ActiveSubmission {
            batcher,
            lock: held.keep(),
        })
    }

    async fn sequence_pending(&self, batcher: &Batcher) -> Result<(), NodeError> {
        if let Some(sequencer) = batcher.as_sequencer() {
            sequencer.sequence_delayed_messages().await?;
            slog::debug!(self.logger, "Sequenced pending delayed messages");
        }
        Ok(())
    }
}

/// A lock acquired during activation and not yet handed over.
///
/// Dropping it releases the lock on a background task.
struct AcquiredLock {
    lock: Option<Arc<dyn LockService>>,
    tasks: TaskTracker,
    logger: Logger,
}

impl AcquiredLock {
    fn keep(mut self) -> Option<Arc<dyn LockService>> {
        self.lock.take()
    }

    async fn release(mut self) {
        if let Some(lock) = self.lock.take() {
            release_lock(lock.as_ref(), &self.logger).await;
        }
    }
}

impl Drop for AcquiredLock {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let logger = self.logger.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                slog::warn!(logger, "Lockout activation abandoned, releasing lock");
                self.tasks
                    .spawn_on(async move { release_lock(lock.as_ref(), &logger).await }, &handle);
            }
            Err(_) => slog::error!(logger, "Lockout activation abandoned outside a runtime, lock left to expire"),
        }
    }
}

async fn release_lock(lock: &dyn LockService, logger: &Logger) {
    match lock.release().await {
        Ok(()) => slog::info!(logger, "Released sequencer lockout"),
        Err(e) => slog::warn!(logger, "Failed to release lockout"; "error" => %e),
    }
}

/// A submission path cleared to run, plus the lock gating it.
pub struct ActiveSubmission {
    batcher: Batcher,
    lock: Option<Arc<dyn LockService>>,
}

impl ActiveSubmission {
    pub fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Run the submission path on `tasks`.
    pub fn spawn_batcher(
        &self,
        tasks: &TaskTracker,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), NodeError>> {
        let batcher = self.batcher.clone();
        tasks.spawn(async move { batcher.start(cancel).await })
    }

    /// Keep the lock on `tasks`. Resolves with an error on lease loss.
    pub fn spawn_hold(
        &self,
        tasks: &TaskTracker,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<Result<(), NodeError>>> {
        let lock = self.lock.clone()?;
        Some(tasks.spawn(async move { lock.hold(&cancel).await }))
    }

    /// Release the lock, if held.
    pub async fn release(&self, logger: &Logger) {
        if let Some(lock) = &self.lock {
            release_lock(lock.as_ref(), logger).await;
        }
    }
}
