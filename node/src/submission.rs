//! Transaction submission path selection.
//!
//! The submission path is chosen once at startup from the resolved role and
//! never changes afterwards. [`BatcherMode`] is the closed set of variants the
//! backend knows how to build; [`Batcher`] is the built path.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{RoleConfig, RpcMode, SequencerDangerous};
use crate::error::NodeError;
use crate::services::{SequencerBatcher, TransactionBatcher};
use crate::types::Address;

/// Reason reported by the error-stub submission path.
pub const VALIDATOR_REJECTION: &str = "validator nodes do not accept transactions";

/// Role-dependent submission strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatcherMode {
    /// Relay submissions to an upstream node.
    Forwarder { target: String },
    /// Order and post batches, with authority over delayed messages.
    Sequencer { dangerous: SequencerDangerous },
    /// Post batches directly to the inbox, tracking them across restarts.
    StatefulAggregator {
        inbox: Address,
        max_batch_time: Duration,
    },
    /// Post batches directly to the inbox.
    StatelessAggregator {
        inbox: Address,
        max_batch_time: Duration,
    },
    /// Reject every submission.
    Error { reason: String },
}

impl BatcherMode {
    /// Select the submission strategy for a role. `None` means submission is
    /// disabled entirely and no path is ever constructed.
    pub fn for_role(role: &RoleConfig) -> Option<BatcherMode> {
        match role {
            RoleConfig::Forwarder(forwarder) => match (&forwarder.target, forwarder.rpc_mode) {
                (_, RpcMode::NonMutating) | (None, _) => None,
                (Some(target), RpcMode::Full) => Some(BatcherMode::Forwarder {
                    target: target.clone(),
                }),
            },
            RoleConfig::Aggregator(aggregator) if aggregator.stateful => {
                Some(BatcherMode::StatefulAggregator {
                    inbox: aggregator.inbox_address,
                    max_batch_time: aggregator.max_batch_time,
                })
            }
            RoleConfig::Aggregator(aggregator) => Some(BatcherMode::StatelessAggregator {
                inbox: aggregator.inbox_address,
                max_batch_time: aggregator.max_batch_time,
            }),
            RoleConfig::Sequencer(sequencer) => Some(BatcherMode::Sequencer {
                dangerous: sequencer.dangerous,
            }),
            RoleConfig::Validator(_) => Some(BatcherMode::Error {
                reason: VALIDATOR_REJECTION.to_string(),
            }),
        }
    }

    /// Whether the path posts to the base layer and so needs a funded signer.
    pub fn requires_signer(&self) -> bool {
        matches!(
            self,
            BatcherMode::Sequencer { .. }
                | BatcherMode::StatefulAggregator { .. }
                | BatcherMode::StatelessAggregator { .. }
        )
    }

    pub fn is_sequencer(&self) -> bool {
        matches!(self, BatcherMode::Sequencer { .. })
    }

    /// Whether the backend builds this path. The error stub is built locally.
    pub fn is_backend_built(&self) -> bool {
        !matches!(self, BatcherMode::Error { .. })
    }
}

impl fmt::Display for BatcherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatcherMode::Forwarder { target } => write!(f, "forwarder({target})"),
            BatcherMode::Sequencer { .. } => f.write_str("sequencer"),
            BatcherMode::StatefulAggregator { inbox, .. } => {
                write!(f, "stateful-aggregator({inbox})")
            }
            BatcherMode::StatelessAggregator { inbox, .. } => {
                write!(f, "stateless-aggregator({inbox})")
            }
            BatcherMode::Error { .. } => f.write_str("error"),
        }
    }
}

/// A constructed submission path.
#[derive(Clone)]
pub enum Batcher {
    Sequencer(Arc<dyn SequencerBatcher>),
    Standard(Arc<dyn TransactionBatcher>),
}

impl Batcher {
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), NodeError> {
        match self {
            Batcher::Sequencer(batcher) => batcher.start(cancel).await,
            Batcher::Standard(batcher) => batcher.start(cancel).await,
        }
    }

    pub async fn submit_transaction(&self, raw: Vec<u8>) -> Result<(), NodeError> {
        match self {
            Batcher::Sequencer(batcher) => batcher.submit_transaction(raw).await,
            Batcher::Standard(batcher) => batcher.submit_transaction(raw).await,
        }
    }

    /// The sequencing half of the path, when it has one.
    pub fn as_sequencer(&self) -> Option<&Arc<dyn SequencerBatcher>> {
        match self {
            Batcher::Sequencer(batcher) => Some(batcher),
            Batcher::Standard(_) => None,
        }
    }
}

/// What the API server submits through.
#[derive(Clone)]
pub enum SubmissionPath {
    /// Read-only API. No path exists.
    ReadOnly,
    Active(Batcher),
}

impl SubmissionPath {
    pub fn is_read_only(&self) -> bool {
        matches!(self, SubmissionPath::ReadOnly)
    }
}

/// Error-stub submission path. Idles until cancellation and rejects every transaction.
pub struct RejectingBatcher {
    reason: String,
}

impl RejectingBatcher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TransactionBatcher for RejectingBatcher {
    async fn start(&self, cancel: CancellationToken) -> Result<(), NodeError> {
        cancel.cancelled().await;
        Ok(())
    }

    async fn submit_transaction(&self, _raw: Vec<u8>) -> Result<(), NodeError> {
        Err(NodeError::Other(anyhow::anyhow!("{}", self.reason)))
    }
}
