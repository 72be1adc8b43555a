//! Collaborator interfaces.
//!
//! The supervisor never touches the ledger engine, the inbox reader, the batch
//! poster, the API server or the validating-party driver directly. It talks to
//! them through the traits below and constructs them through a single
//! [`NodeBackend`] factory, so every collaborator can be swapped for an
//! in-memory implementation in tests.
//!
//! Long-running entry points take a [`CancellationToken`] and must return once
//! it fires. Their `Err` results are what the shutdown aggregator sees.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::{LockoutConfig, RollupSettings, ValidatorStrategy};
use crate::error::NodeError;
use crate::submission::{Batcher, BatcherMode, SubmissionPath};
use crate::types::{Address, BlockHeader, Signer};

/// Capacity of the shared feed message channel.
pub const FEED_CHANNEL_CAPACITY: usize = 4096;

/// One sequenced message received from a sequencer feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedMessage {
    pub sequence_number: u64,
    pub payload: Vec<u8>,
}

/// Shared receiving end of the feed channel.
///
/// Every feed connection writes into the same channel. The inbox reader takes
/// the lock for as long as it consumes, so a retried reader start picks up
/// exactly where the previous attempt stopped.
pub type FeedMessages = Arc<Mutex<mpsc::Receiver<FeedMessage>>>;

/// Persistent ledger engine.
#[async_trait]
pub trait LedgerCore: Send + Sync {
    /// Number of inbox messages the engine has processed.
    async fn message_count(&self) -> Result<u64, NodeError>;

    /// Advance the pruning point to the latest confirmed checkpoint.
    async fn update_prune_point(&self) -> Result<(), NodeError>;

    async fn close(&self);
}

/// Running inbox ingestion subsystem.
#[async_trait]
pub trait InboxReader: Send + Sync {
    /// Resolve once ingestion has caught up with the base layer.
    async fn wait_to_catch_up(&self, cancel: &CancellationToken) -> Result<(), NodeError>;
}

/// Local transaction index over the processed rollup blocks.
#[async_trait]
pub trait TxIndex: Send + Sync {
    async fn block_count(&self) -> Result<u64, NodeError>;

    async fn block_header(&self, height: u64) -> Result<BlockHeader, NodeError>;

    async fn close(&self);
}

/// Header lookups against an external rollup node.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    async fn header_by_number(&self, height: u64) -> Result<BlockHeader, NodeError>;
}

/// Establishes [`HeaderSource`] connections. Called again after lookup failures.
#[async_trait]
pub trait UpstreamDialer: Send + Sync {
    async fn dial(&self, target: &str) -> Result<Arc<dyn HeaderSource>, NodeError>;
}

/// Distributed lock shared by cooperating sequencers.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Block until this node holds the lock.
    async fn acquire(&self, cancel: &CancellationToken) -> Result<(), NodeError>;

    /// Keep the lock until cancellation. Returns an error if the lease is lost.
    async fn hold(&self, cancel: &CancellationToken) -> Result<(), NodeError>;

    async fn release(&self) -> Result<(), NodeError>;
}

/// Transaction submission path.
#[async_trait]
pub trait TransactionBatcher: Send + Sync {
    /// Run batch submission until cancellation or a fatal error.
    async fn start(&self, cancel: CancellationToken) -> Result<(), NodeError>;

    /// Accept a raw transaction for submission.
    async fn submit_transaction(&self, raw: Vec<u8>) -> Result<(), NodeError>;
}

/// Submission path with ordering authority over delayed messages.
#[async_trait]
pub trait SequencerBatcher: TransactionBatcher {
    /// Order every delayed message that is already pending.
    async fn sequence_delayed_messages(&self) -> Result<(), NodeError>;
}

/// Public API server.
#[async_trait]
pub trait RpcServer: Send + Sync {
    /// Serve until cancellation. Returns an error only when serving failed.
    async fn serve(&self, cancel: CancellationToken) -> Result<(), NodeError>;
}

/// Result of the idempotent wallet creation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletCreation {
    /// A wallet already existed on chain for this signer.
    Existing(Address),
    /// A new wallet was deployed.
    Created(Address),
}

impl WalletCreation {
    pub fn address(&self) -> Address {
        match self {
            WalletCreation::Existing(address) | WalletCreation::Created(address) => *address,
        }
    }
}

/// On-chain validator wallet contracts.
#[async_trait]
pub trait WalletContracts: Send + Sync {
    /// Current owner of the wallet contract.
    async fn owner(&self, wallet: Address) -> Result<Address, NodeError>;

    /// Look up the signer's wallet through the factory, deploying one if none exists.
    async fn create_wallet_if_needed(
        &self,
        known: Option<Address>,
    ) -> Result<WalletCreation, NodeError>;
}

/// Validating-party driver.
#[async_trait]
pub trait ValidatorDriver: Send + Sync {
    /// Run rounds until cancellation.
    async fn run(&self, cancel: CancellationToken) -> Result<(), NodeError>;
}

/// Settings used to open the ledger engine.
#[derive(Clone, Debug)]
pub struct CoreParams {
    pub database_path: PathBuf,
    pub machine_file: PathBuf,
    pub max_execution_gas: u64,
    pub rollup: RollupSettings,
}

/// Settings used to start inbox ingestion.
#[derive(Clone, Debug)]
pub struct InboxParams {
    pub l1_url: String,
    pub rollup: RollupSettings,
    pub bridge_utils_address: Address,
}

/// Handle to a started inbox reader.
pub struct InboxReaderHandle {
    pub reader: Arc<dyn InboxReader>,
    /// Resolves when ingestion stops.
    pub done: oneshot::Receiver<Result<(), NodeError>>,
}

/// Handle to an opened transaction index.
pub struct TxIndexHandle {
    pub index: Arc<dyn TxIndex>,
    pub errors: mpsc::Receiver<NodeError>,
}

/// A constructed submission path plus the feed broadcaster it may own.
pub struct BatcherSetup {
    pub batcher: Batcher,
    pub broadcaster_errors: Option<mpsc::Receiver<NodeError>>,
}

/// Everything the API server is wired to.
pub struct RpcContext {
    pub chain_id: u64,
    pub core: Arc<dyn LedgerCore>,
    pub tx_index: Arc<dyn TxIndex>,
    pub submission: SubmissionPath,
    /// Present when base-layer calls are enabled.
    pub inbox_reader: Option<Arc<dyn InboxReader>>,
}

/// Settings for the validating-party driver.
#[derive(Clone, Debug)]
pub struct ValidatorParams {
    pub strategy: ValidatorStrategy,
    pub utils_address: Address,
    /// `None` for watch-only operation.
    pub wallet: Option<Address>,
    pub signer: Option<Signer>,
    pub staker_delay: Duration,
}

/// Factory for every collaborator the supervisor drives.
#[async_trait]
pub trait NodeBackend: Send + Sync + 'static {
    async fn open_core(&self, params: &CoreParams) -> Result<Arc<dyn LedgerCore>, NodeError>;

    /// Connect to one feed URL, forwarding messages and connection errors into
    /// the shared channels until cancellation.
    ///
    /// A connection idle for `timeout` is re-established.
    async fn connect_feed(
        &self,
        url: &str,
        start_from: u64,
        timeout: Duration,
        messages: mpsc::Sender<FeedMessage>,
        errors: mpsc::Sender<NodeError>,
        cancel: CancellationToken,
    ) -> Result<(), NodeError>;

    async fn start_inbox_reader(
        &self,
        params: &InboxParams,
        core: Arc<dyn LedgerCore>,
        feed: Option<FeedMessages>,
        cancel: CancellationToken,
    ) -> Result<InboxReaderHandle, NodeError>;

    /// Load the signing identity from the keystore.
    async fn signer(&self) -> Result<Signer, NodeError>;

    /// Resolve once the signer holds a non-zero balance.
    async fn wait_for_balance(
        &self,
        signer: &Signer,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError>;

    async fn open_tx_index(
        &self,
        core: Arc<dyn LedgerCore>,
        cancel: CancellationToken,
    ) -> Result<TxIndexHandle, NodeError>;

    async fn setup_batcher(
        &self,
        mode: &BatcherMode,
        signer: Option<Signer>,
        core: Arc<dyn LedgerCore>,
        inbox_reader: Arc<dyn InboxReader>,
    ) -> Result<BatcherSetup, NodeError>;

    async fn connect_lock_service(
        &self,
        lockout: &LockoutConfig,
    ) -> Result<Arc<dyn LockService>, NodeError>;

    fn upstream_dialer(&self) -> Arc<dyn UpstreamDialer>;

    async fn rpc_server(&self, context: RpcContext) -> Result<Arc<dyn RpcServer>, NodeError>;

    async fn wallet_contracts(
        &self,
        signer: &Signer,
        factory: Address,
    ) -> Result<Arc<dyn WalletContracts>, NodeError>;

    async fn validator_driver(
        &self,
        params: &ValidatorParams,
        core: Arc<dyn LedgerCore>,
    ) -> Result<Arc<dyn ValidatorDriver>, NodeError>;
}
