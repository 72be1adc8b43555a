//! Periodic storage maintenance.

use std::sync::Arc;
use std::time::Duration;

use slog::{Logger, o};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::services::LedgerCore;

/// Advance the prune point once. Failures are logged and otherwise ignored.
pub async fn prune_once(core: &dyn LedgerCore, logger: &Logger) {
    if let Err(e) = core.update_prune_point().await {
        slog::error!(logger, "Error pruning database"; "error" => %e);
    }
}

/// Advances the prune point every interval until cancellation.
pub struct PruneLoop {
    core: Arc<dyn LedgerCore>,
    interval: Duration,
    cancel: CancellationToken,
    logger: Logger,
}

impl PruneLoop {
    pub fn new(
        core: Arc<dyn LedgerCore>,
        interval: Duration,
        cancel: CancellationToken,
        logger: Logger,
    ) -> Self {
        Self {
            core,
            interval,
            cancel,
            logger: logger.new(o!("component" => "pruning")),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; startup has just pruned.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    slog::debug!(self.logger, "Pruning loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    prune_once(self.core.as_ref(), &self.logger).await;
                }
            }
        }
    }
}
