//! Block consistency watchdog.
//!
//! A forwarder with an upstream target periodically compares a local block
//! header against the upstream node's header at the same height. Repeated
//! consecutive divergence means the node is on a wrong fork, or has lost its
//! upstream for good, and the whole process is cancelled. The trip is recorded
//! in a [`TripSignal`] so the supervisor can tell it apart from an operator stop.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use slog::{Logger, o};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Timings;
use crate::error::NodeError;
use crate::services::{HeaderSource, TxIndex, UpstreamDialer};
use crate::types::BlockHash;

/// Mismatch bookkeeping. Owned by the watchdog loop alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsistencyState {
    consecutive_mismatches: u32,
    warmup_blocks: u64,
    threshold: u32,
}

impl ConsistencyState {
    pub fn new(warmup_blocks: u64, threshold: u32) -> Self {
        Self {
            consecutive_mismatches: 0,
            warmup_blocks,
            threshold,
        }
    }

    pub fn from_timings(timings: &Timings) -> Self {
        Self::new(timings.warmup_blocks, timings.fail_limit)
    }

    /// Height to compare for a local block count, or `None` while there is
    /// too little history for the comparison to mean anything.
    pub fn check_height(&self, block_count: u64) -> Option<u64> {
        if block_count < self.warmup_blocks {
            None
        } else {
            Some(block_count - self.warmup_blocks)
        }
    }

    pub fn record_match(&mut self) {
        self.consecutive_mismatches = 0;
    }

    pub fn record_mismatch(&mut self) {
        self.consecutive_mismatches = self.consecutive_mismatches.saturating_add(1);
    }

    pub fn consecutive_mismatches(&self) -> u32 {
        self.consecutive_mismatches
    }

    pub fn limit_reached(&self) -> bool {
        self.consecutive_mismatches >= self.threshold
    }
}

/// Set once when the watchdog gives up on the local chain.
#[derive(Clone, Debug, Default)]
pub struct TripSignal(Arc<OnceLock<u32>>);

impl TripSignal {
    /// Consecutive mismatches at the trip, or `None` if it never tripped.
    pub fn mismatches(&self) -> Option<u32> {
        self.0.get().copied()
    }

    fn trip(&self, mismatches: u32) {
        let _ = self.0.set(mismatches);
    }
}

/// Outcome of one successful comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Fewer than the warm-up number of blocks are known locally.
    InsufficientHistory,
    Match,
    Mismatch {
        height: u64,
        local: BlockHash,
        upstream: BlockHash,
    },
}

pub struct ConsistencyWatchdog {
    target: String,
    local: Arc<dyn TxIndex>,
    dialer: Arc<dyn UpstreamDialer>,
    interval: Duration,
    state: ConsistencyState,
    trip: TripSignal,
    cancel: CancellationToken,
    logger: Logger,
}

impl ConsistencyWatchdog {
    pub fn new(
        target: String,
        local: Arc<dyn TxIndex>,
        dialer: Arc<dyn UpstreamDialer>,
        timings: &Timings,
        cancel: CancellationToken,
        logger: Logger,
    ) -> Self {
        let logger = logger.new(o!("component" => "consistency_watchdog", "target" => target.clone()));
        Self {
            target,
            local,
            dialer,
            interval: timings.check_interval,
            state: ConsistencyState::from_timings(timings),
            trip: TripSignal::default(),
            cancel,
            logger,
        }
    }

    pub fn trip_signal(&self) -> TripSignal {
        self.trip.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Check immediately, then once per interval, until cancellation or the
    /// mismatch limit.
    pub async fn run(mut self) {
        let mut upstream = self.dial().await;

        loop {
            let checked = self.check(upstream.as_deref()).await;
            match checked {
                Ok(CheckOutcome::InsufficientHistory) | Ok(CheckOutcome::Match) => {
                    self.state.record_match();
                }
                Ok(CheckOutcome::Mismatch {
                    height,
                    local,
                    upstream,
                }) => {
                    self.state.record_mismatch();
                    slog::warn!(
                        self.logger,
                        "Block hash mismatch with upstream";
                        "height" => height,
                        "local" => %local,
                        "upstream" => %upstream,
                        "consecutive" => self.state.consecutive_mismatches(),
                    );
                }
                Err(e) => {
                    slog::warn!(self.logger, "Failed to look up block hash for consistency check"; "error" => %e);
                    upstream = self.dial().await;
                }
            }

            if self.state.limit_reached() {
                slog::error!(
                    self.logger,
                    "Exiting due to repeated block hash mismatches";
                    "mismatches" => self.state.consecutive_mismatches(),
                );
                self.trip.trip(self.state.consecutive_mismatches());
                self.cancel.cancel();
                return;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn dial(&self) -> Option<Arc<dyn HeaderSource>> {
        let dialed = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            dialed = self.dialer.dial(&self.target) => dialed,
        };
        match dialed {
            Ok(source) => Some(source),
            Err(e) => {
                slog::warn!(self.logger, "Failed to connect to forward target"; "error" => %e);
                None
            }
        }
    }

    async fn check(&self, upstream: Option<&dyn HeaderSource>) -> Result<CheckOutcome, NodeError> {
        let upstream = upstream
            .ok_or_else(|| NodeError::Unavailable("forward target client".to_string()))?;

        let count = self.local.block_count().await?;
        let Some(height) = self.state.check_height(count) else {
            return Ok(CheckOutcome::InsufficientHistory);
        };

        let local = self.local.block_header(height).await?;
        let remote = upstream.header_by_number(local.number).await?;

        if remote.hash == local.hash {
            Ok(CheckOutcome::Match)
        } else {
            Ok(CheckOutcome::Mismatch {
                height: local.number,
                local: local.hash,
                upstream: remote.hash,
            })
        }
    }
}
