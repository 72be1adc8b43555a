//! First-signal-wins shutdown aggregation.
//!
//! Every long-running subsystem hands the aggregator the future through which
//! it reports termination: an error channel, a completion channel or a task
//! handle. [`ShutdownAggregator::wait`] races them all together with the
//! shared cancellation token. Whichever resolves first is the process outcome.
//! Cancellation is then broadcast and every later signal is discarded.

use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, select_all};
use slog::{Logger, o};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;

/// Origin of a shutdown signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subsystem {
    TxIndex,
    Batcher,
    Broadcaster,
    FeedClient,
    Rpc,
    Lockout,
    ValidatorDriver,
    InboxReader,
    /// Cancellation of the shared scope, e.g. an operator interrupt.
    External,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::TxIndex => "tx_index",
            Subsystem::Batcher => "batcher",
            Subsystem::Broadcaster => "broadcaster",
            Subsystem::FeedClient => "feed_client",
            Subsystem::Rpc => "rpc",
            Subsystem::Lockout => "lockout",
            Subsystem::ValidatorDriver => "validator_driver",
            Subsystem::InboxReader => "inbox_reader",
            Subsystem::External => "external",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum ShutdownOutcome {
    Clean,
    Error(NodeError),
}

impl From<Result<(), NodeError>> for ShutdownOutcome {
    fn from(result: Result<(), NodeError>) -> Self {
        match result {
            Ok(()) => ShutdownOutcome::Clean,
            Err(e) => ShutdownOutcome::Error(e),
        }
    }
}

/// The accepted termination signal.
#[derive(Debug)]
pub struct ShutdownSignal {
    pub origin: Subsystem,
    pub outcome: ShutdownOutcome,
}

impl ShutdownSignal {
    pub fn into_result(self) -> Result<Subsystem, NodeError> {
        match self.outcome {
            ShutdownOutcome::Clean => Ok(self.origin),
            ShutdownOutcome::Error(e) => Err(e),
        }
    }
}

pub struct ShutdownAggregator {
    cancel: CancellationToken,
    watchers: Vec<BoxFuture<'static, ShutdownSignal>>,
    logger: Logger,
}

impl ShutdownAggregator {
    pub fn new(cancel: CancellationToken, logger: Logger) -> Self {
        Self {
            cancel,
            watchers: Vec::new(),
            logger: logger.new(o!("component" => "shutdown")),
        }
    }

    /// Number of registered subsystem watchers.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Watch an arbitrary termination future.
    pub fn watch<F>(&mut self, origin: Subsystem, fut: F)
    where
        F: Future<Output = Result<(), NodeError>> + Send + 'static,
    {
        self.watchers.push(
            async move {
                ShutdownSignal {
                    origin,
                    outcome: fut.await.into(),
                }
            }
            .boxed(),
        );
    }

    /// Watch an error channel. The first error received is the signal. A
    /// channel whose senders are all gone never signals.
    pub fn watch_errors(&mut self, origin: Subsystem, mut errors: mpsc::Receiver<NodeError>) {
        self.watch(origin, async move {
            match errors.recv().await {
                Some(e) => Err(e),
                None => std::future::pending().await,
            }
        });
    }

    /// Watch a completion channel. A dropped sender counts as clean completion.
    pub fn watch_completion(
        &mut self,
        origin: Subsystem,
        done: oneshot::Receiver<Result<(), NodeError>>,
    ) {
        self.watch(origin, async move { done.await.unwrap_or(Ok(())) });
    }

    /// Watch a spawned task. A panicked task is a fatal error.
    pub fn watch_task(&mut self, origin: Subsystem, handle: JoinHandle<Result<(), NodeError>>) {
        self.watch(origin, async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(NodeError::fatal(anyhow::anyhow!("{origin} task failed: {e}"))),
            }
        });
    }

    /// Block until the first signal, then broadcast cancellation.
    pub async fn wait(self) -> ShutdownSignal {
        let Self {
            cancel,
            mut watchers,
            logger,
        } = self;

        let external = cancel.clone();
        watchers.push(
            async move {
                external.cancelled().await;
                ShutdownSignal {
                    origin: Subsystem::External,
                    outcome: ShutdownOutcome::Clean,
                }
            }
            .boxed(),
        );

        slog::debug!(logger, "Waiting for first shutdown signal"; "watchers" => watchers.len());
        let (signal, _, remaining) = select_all(watchers).await;
        drop(remaining);

        cancel.cancel();
        match &signal.outcome {
            ShutdownOutcome::Clean => {
                slog::info!(logger, "Shutdown requested"; "origin" => %signal.origin);
            }
            ShutdownOutcome::Error(e) => {
                slog::error!(logger, "Subsystem failed, shutting down"; "origin" => %signal.origin, "error" => %e);
            }
        }
        signal
    }
}
