//! Fixed-delay retry loop for fallible startup steps.

use std::future::Future;
use std::time::Duration;

use slog::{Logger, o};
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;

/// Result of a single attempt.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success(T),
    /// Retry after the configured delay.
    Transient(NodeError),
    /// Abort without further attempts.
    Fatal(NodeError),
}

impl<T> From<Result<T, NodeError>> for RetryOutcome<T> {
    fn from(result: Result<T, NodeError>) -> Self {
        match result {
            Ok(value) => RetryOutcome::Success(value),
            Err(e) if e.is_fatal() => RetryOutcome::Fatal(e),
            Err(e) => RetryOutcome::Transient(e),
        }
    }
}

/// Re-runs a startup step until it succeeds, fails fatally, or the shared
/// scope is cancelled. There is no attempt cap: an operator stops a step that
/// never succeeds by cancelling.
pub struct RetryingInitializer {
    name: &'static str,
    delay: Duration,
    cancel: CancellationToken,
    logger: Logger,
}

impl RetryingInitializer {
    pub fn new(
        name: &'static str,
        delay: Duration,
        cancel: CancellationToken,
        logger: Logger,
    ) -> Self {
        Self {
            name,
            delay,
            cancel,
            logger: logger.new(o!("step" => name)),
        }
    }

    /// Run `op` until it yields a value.
    ///
    /// `op` receives the 1-based attempt number. Its output may be a
    /// [`RetryOutcome`] or a plain `Result`, in which case the error's own
    /// classification decides between retrying and aborting.
    pub async fn run<T, O, F, Fut>(&self, mut op: F) -> Result<T, NodeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = O>,
        O: Into<RetryOutcome<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(NodeError::Cancelled(self.name));
            }
            attempt = attempt.saturating_add(1);

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(NodeError::Cancelled(self.name)),
                outcome = op(attempt) => outcome.into(),
            };

            match outcome {
                RetryOutcome::Success(value) => {
                    if attempt > 1 {
                        slog::info!(self.logger, "Startup step succeeded after retries"; "attempts" => attempt);
                    }
                    return Ok(value);
                }
                RetryOutcome::Fatal(e) => {
                    slog::error!(self.logger, "Startup step failed fatally"; "attempt" => attempt, "error" => %e);
                    return Err(e);
                }
                RetryOutcome::Transient(e) => {
                    slog::warn!(
                        self.logger,
                        "Startup step failed, retrying";
                        "attempt" => attempt,
                        "delay_ms" => self.delay.as_millis() as u64,
                        "error" => %e,
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(NodeError::Cancelled(self.name)),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}
