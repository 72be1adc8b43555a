//! In-memory collaborators for supervisor end-to-end tests.
//!
//! [`FakeBackend`] implements every collaborator the supervisor drives and
//! appends an [`Event`] to a shared log whenever something observable happens,
//! so scenarios can assert on ordering as well as on outcomes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rollup_node::config::{LockoutConfig, NodeConfig};
use rollup_node::services::{
    BatcherSetup, CoreParams, FeedMessage, FeedMessages, HeaderSource, InboxParams, InboxReader,
    InboxReaderHandle, LedgerCore, LockService, NodeBackend, RpcContext, RpcServer,
    SequencerBatcher, TransactionBatcher, TxIndex, TxIndexHandle, UpstreamDialer,
    ValidatorDriver, ValidatorParams, WalletContracts, WalletCreation,
};
use rollup_node::submission::{Batcher, BatcherMode, SubmissionPath};
use rollup_node::types::{Address, BlockHash, BlockHeader, Signer};
use rollup_node::{NodeError, NodeSupervisor, Subsystem, SupervisorStage};
use slog::{Drain, Level, Logger, o};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ROLLUP: &str = "0xc12ba48c781f6e392b49db2e25cd0c28cd77531a";
pub const BRIDGE_UTILS: &str = "0x84efa170dc6d521495d7942e372b8e4b2fb918ec";
pub const INBOX: &str = "0x4dbd4fc535ac27206064b68ffcf827b0a60bab3f";
pub const UTILS: &str = "0x2b081fbaf716e59e3dfa9e5b4c4e0d2a5fa63c3b";
pub const FACTORY: &str = "0xe17d8fa6bc62590f840c5dd35f300f77d55cc178";
pub const UPSTREAM: &str = "http://upstream:8547";

pub const SIGNER: Address = Address([0xaa; 20]);
pub const DEPLOYED_WALLET: Address = Address([0x77; 20]);

const LOCAL_HASH: BlockHash = BlockHash([0x01; 32]);
const DIVERGED_HASH: BlockHash = BlockHash([0x02; 32]);

/// Creates a logger for integration tests.
///
/// Respects the `RUST_LOG` environment variable and defaults to `error` so
/// test output stays readable.
pub fn create_test_logger() -> Logger {
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|env_str| Level::from_str(&env_str).ok())
        .unwrap_or(Level::Error);

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain)
        .build()
        .fuse()
        .filter_level(log_level)
        .fuse();

    slog::Logger::root(drain, o!())
}

/// A complete configuration for `role` with its data directory at `chain_dir`.
pub fn node_config(role: &str, chain_dir: &Path) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.l1.url = Some("http://127.0.0.1:8545".into());
    config.rollup.address = Some(ROLLUP.into());
    config.rollup.machine.filename = Some(chain_dir.join("machine.mexe"));
    config.bridge_utils_address = Some(BRIDGE_UTILS.into());
    config.persistent.chain = Some(chain_dir.to_path_buf());
    config.node.kind = Some(role.into());
    config.node.chain_id = Some(42161);
    config.core.checkpoint_max_execution_gas = Some(0);
    config.node.forwarder.target = Some(UPSTREAM.into());
    config.node.aggregator.inbox_address = Some(INBOX.into());
    config.validator.strategy = Some("MakeNodes".into());
    config.validator.utils_address = Some(UTILS.into());
    config.validator.wallet_factory_address = Some(FACTORY.into());
    config
}

/// Write a validator configuration file into `dir` and return its path.
pub fn write_validator_config(dir: &Path, chain_dir: &Path) -> PathBuf {
    let path = dir.join("validator.toml");
    let content = format!(
        r#"bridge_utils_address = "{BRIDGE_UTILS}"

[l1]
url = "http://127.0.0.1:8545"

[rollup]
address = "{ROLLUP}"
machine = {{ filename = "{machine}" }}

[persistent]
chain = "{chain}"

[node]
type = "validator"
chain_id = 42161

[validator]
strategy = "MakeNodes"
utils_address = "{UTILS}"
wallet_factory_address = "{FACTORY}"

[core]
checkpoint_max_execution_gas = 0
"#,
        machine = chain_dir.join("machine.mexe").display(),
        chain = chain_dir.display(),
    );
    std::fs::write(&path, content).expect("write config file");
    path
}

/// Write a persisted wallet record into `chain_dir`.
pub fn write_wallet_record(chain_dir: &Path, wallet: Address) {
    std::fs::create_dir_all(chain_dir).expect("create chain dir");
    std::fs::write(
        chain_dir.join("chainState.json"),
        format!(r#"{{"validatorWallet": "{wallet}"}}"#),
    )
    .expect("write wallet record");
}

/// Something observable a collaborator did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CoreOpened { max_execution_gas: u64 },
    FeedConnected { url: String, start_from: u64, timeout: Duration },
    InboxStartAttempt(u32),
    InboxStarted { with_feed: bool },
    SignerLoaded,
    BalanceFunded,
    TxIndexOpened,
    BatcherSetup(String),
    LockConnected,
    LockAttempt(u32),
    LockAcquired,
    LockReleased,
    DelayedMessagesSequenced,
    BatcherStarted,
    BatcherStopped,
    RpcBuilt { read_only: bool, l1_calls: bool },
    TestSubmission { accepted: bool },
    RpcServing,
    RpcStopped,
    UpstreamDialed(String),
    UpstreamHeader(u64),
    WalletContractsBuilt,
    WalletDeployed(Address),
    DriverBuilt { wallet: Option<Address> },
    DriverRunning,
    Pruned,
    TxIndexClosed,
    CoreClosed,
}

type Events = Arc<Mutex<Vec<Event>>>;

fn record(events: &Events, event: Event) {
    events.lock().expect("event log poisoned").push(event);
}

/// Knobs controlling how the fake collaborators behave.
#[derive(Clone, Debug)]
pub struct Script {
    pub message_count: u64,
    /// Transient inbox start failures before success.
    pub inbox_failures: u32,
    /// Fail inbox start with an engine abort.
    pub inbox_fatal: bool,
    /// Transient lock acquisition failures before success.
    pub lock_failures: u32,
    /// The lock service refuses this node outright.
    pub lock_fatal: bool,
    pub block_count: u64,
    pub upstream_matches: bool,
    /// Wallet already deployed for the signer.
    pub deployed_wallet: Option<Address>,
    /// The driver returns on its own instead of waiting for cancellation.
    pub driver_finishes: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            message_count: 0,
            inbox_failures: 0,
            inbox_fatal: false,
            lock_failures: 0,
            lock_fatal: false,
            block_count: 1,
            upstream_matches: true,
            deployed_wallet: None,
            driver_finishes: false,
        }
    }
}

pub struct FakeBackend {
    script: Script,
    events: Events,
    calls: AtomicUsize,
    inbox_attempts: AtomicU32,
    lock_attempts: Arc<AtomicU32>,
    inbox_done: Mutex<Vec<oneshot::Sender<Result<(), NodeError>>>>,
    tx_index_errors: Mutex<Option<mpsc::Sender<NodeError>>>,
    deployed: Arc<Mutex<Option<Address>>>,
}

impl FakeBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            deployed: Arc::new(Mutex::new(script.deployed_wallet)),
            script,
            events: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
            inbox_attempts: AtomicU32::new(0),
            lock_attempts: Arc::new(AtomicU32::new(0)),
            inbox_done: Mutex::new(Vec::new()),
            tx_index_errors: Mutex::new(None),
        })
    }

    /// Number of backend methods invoked so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.position(event).is_some()
    }

    /// Report a failure through the transaction index error channel.
    pub async fn fail_tx_index(&self, error: NodeError) {
        let sender = self
            .tx_index_errors
            .lock()
            .expect("sender slot poisoned")
            .clone();
        if let Some(sender) = sender {
            sender.send(error).await.ok();
        }
    }

    fn call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn record(&self, event: Event) {
        record(&self.events, event);
    }
}

#[async_trait]
impl NodeBackend for FakeBackend {
    async fn open_core(&self, params: &CoreParams) -> Result<Arc<dyn LedgerCore>, NodeError> {
        self.call();
        self.record(Event::CoreOpened {
            max_execution_gas: params.max_execution_gas,
        });
        Ok(Arc::new(FakeCore {
            message_count: self.script.message_count,
            events: self.events.clone(),
        }))
    }

    async fn connect_feed(
        &self,
        url: &str,
        start_from: u64,
        timeout: Duration,
        _messages: mpsc::Sender<FeedMessage>,
        _errors: mpsc::Sender<NodeError>,
        cancel: CancellationToken,
    ) -> Result<(), NodeError> {
        self.call();
        self.record(Event::FeedConnected {
            url: url.to_string(),
            start_from,
            timeout,
        });
        cancel.cancelled().await;
        Ok(())
    }

    async fn start_inbox_reader(
        &self,
        _params: &InboxParams,
        _core: Arc<dyn LedgerCore>,
        feed: Option<FeedMessages>,
        _cancel: CancellationToken,
    ) -> Result<InboxReaderHandle, NodeError> {
        self.call();
        let attempt = self.inbox_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(Event::InboxStartAttempt(attempt));
        if self.script.inbox_fatal {
            return Err(NodeError::EngineAborted("inbox core".into()));
        }
        if attempt <= self.script.inbox_failures {
            return Err(NodeError::Unavailable("base-layer RPC".into()));
        }

        let (done_tx, done) = oneshot::channel();
        self.inbox_done.lock().expect("inbox slot poisoned").push(done_tx);
        self.record(Event::InboxStarted {
            with_feed: feed.is_some(),
        });
        Ok(InboxReaderHandle {
            reader: Arc::new(FakeInbox),
            done,
        })
    }

    async fn signer(&self) -> Result<Signer, NodeError> {
        self.call();
        self.record(Event::SignerLoaded);
        Ok(Signer { address: SIGNER })
    }

    async fn wait_for_balance(
        &self,
        _signer: &Signer,
        _cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        self.call();
        self.record(Event::BalanceFunded);
        Ok(())
    }

    async fn open_tx_index(
        &self,
        _core: Arc<dyn LedgerCore>,
        _cancel: CancellationToken,
    ) -> Result<TxIndexHandle, NodeError> {
        self.call();
        let (errors_tx, errors) = mpsc::channel(1);
        *self.tx_index_errors.lock().expect("sender slot poisoned") = Some(errors_tx);
        self.record(Event::TxIndexOpened);
        Ok(TxIndexHandle {
            index: Arc::new(FakeTxIndex {
                block_count: self.script.block_count,
                events: self.events.clone(),
            }),
            errors,
        })
    }

    async fn setup_batcher(
        &self,
        mode: &BatcherMode,
        _signer: Option<Signer>,
        _core: Arc<dyn LedgerCore>,
        _inbox_reader: Arc<dyn InboxReader>,
    ) -> Result<BatcherSetup, NodeError> {
        self.call();
        self.record(Event::BatcherSetup(mode.to_string()));
        let fake = Arc::new(FakeBatcher {
            events: self.events.clone(),
        });
        let batcher = if mode.is_sequencer() {
            Batcher::Sequencer(fake)
        } else {
            Batcher::Standard(fake)
        };
        Ok(BatcherSetup {
            batcher,
            broadcaster_errors: None,
        })
    }

    async fn connect_lock_service(
        &self,
        _lockout: &LockoutConfig,
    ) -> Result<Arc<dyn LockService>, NodeError> {
        self.call();
        self.record(Event::LockConnected);
        Ok(Arc::new(FakeLock {
            failures: self.script.lock_failures,
            fatal: self.script.lock_fatal,
            attempts: self.lock_attempts.clone(),
            events: self.events.clone(),
        }))
    }

    fn upstream_dialer(&self) -> Arc<dyn UpstreamDialer> {
        self.call();
        Arc::new(FakeDialer {
            matches: self.script.upstream_matches,
            events: self.events.clone(),
        })
    }

    async fn rpc_server(&self, context: RpcContext) -> Result<Arc<dyn RpcServer>, NodeError> {
        self.call();
        self.record(Event::RpcBuilt {
            read_only: context.submission.is_read_only(),
            l1_calls: context.inbox_reader.is_some(),
        });
        if let SubmissionPath::Active(batcher) = &context.submission {
            let accepted = batcher.submit_transaction(vec![0xf8]).await.is_ok();
            self.record(Event::TestSubmission { accepted });
        }
        Ok(Arc::new(FakeRpc {
            events: self.events.clone(),
        }))
    }

    async fn wallet_contracts(
        &self,
        signer: &Signer,
        _factory: Address,
    ) -> Result<Arc<dyn WalletContracts>, NodeError> {
        self.call();
        self.record(Event::WalletContractsBuilt);
        Ok(Arc::new(FakeWallets {
            owner: signer.address,
            deployed: self.deployed.clone(),
            events: self.events.clone(),
        }))
    }

    async fn validator_driver(
        &self,
        params: &ValidatorParams,
        _core: Arc<dyn LedgerCore>,
    ) -> Result<Arc<dyn ValidatorDriver>, NodeError> {
        self.call();
        self.record(Event::DriverBuilt {
            wallet: params.wallet,
        });
        Ok(Arc::new(FakeDriver {
            finishes: self.script.driver_finishes,
            events: self.events.clone(),
        }))
    }
}

struct FakeCore {
    message_count: u64,
    events: Events,
}

#[async_trait]
impl LedgerCore for FakeCore {
    async fn message_count(&self) -> Result<u64, NodeError> {
        Ok(self.message_count)
    }

    async fn update_prune_point(&self) -> Result<(), NodeError> {
        record(&self.events, Event::Pruned);
        Ok(())
    }

    async fn close(&self) {
        record(&self.events, Event::CoreClosed);
    }
}

struct FakeInbox;

#[async_trait]
impl InboxReader for FakeInbox {
    async fn wait_to_catch_up(&self, _cancel: &CancellationToken) -> Result<(), NodeError> {
        Ok(())
    }
}

struct FakeTxIndex {
    block_count: u64,
    events: Events,
}

#[async_trait]
impl TxIndex for FakeTxIndex {
    async fn block_count(&self) -> Result<u64, NodeError> {
        Ok(self.block_count)
    }

    async fn block_header(&self, height: u64) -> Result<BlockHeader, NodeError> {
        Ok(BlockHeader {
            number: height,
            hash: LOCAL_HASH,
        })
    }

    async fn close(&self) {
        record(&self.events, Event::TxIndexClosed);
    }
}

struct FakeDialer {
    matches: bool,
    events: Events,
}

#[async_trait]
impl UpstreamDialer for FakeDialer {
    async fn dial(&self, target: &str) -> Result<Arc<dyn HeaderSource>, NodeError> {
        record(&self.events, Event::UpstreamDialed(target.to_string()));
        Ok(Arc::new(FakeUpstream {
            matches: self.matches,
            events: self.events.clone(),
        }))
    }
}

struct FakeUpstream {
    matches: bool,
    events: Events,
}

#[async_trait]
impl HeaderSource for FakeUpstream {
    async fn header_by_number(&self, height: u64) -> Result<BlockHeader, NodeError> {
        record(&self.events, Event::UpstreamHeader(height));
        Ok(BlockHeader {
            number: height,
            hash: if self.matches { LOCAL_HASH } else { DIVERGED_HASH },
        })
    }
}

struct FakeLock {
    failures: u32,
    fatal: bool,
    attempts: Arc<AtomicU32>,
    events: Events,
}

#[async_trait]
impl LockService for FakeLock {
    async fn acquire(&self, _cancel: &CancellationToken) -> Result<(), NodeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        record(&self.events, Event::LockAttempt(attempt));
        if self.fatal {
            return Err(NodeError::fatal(anyhow::anyhow!("lock service rejected credentials")));
        }
        if attempt <= self.failures {
            return Err(NodeError::Unavailable("lock service".into()));
        }
        record(&self.events, Event::LockAcquired);
        Ok(())
    }

    async fn hold(&self, cancel: &CancellationToken) -> Result<(), NodeError> {
        cancel.cancelled().await;
        Ok(())
    }

    async fn release(&self) -> Result<(), NodeError> {
        record(&self.events, Event::LockReleased);
        Ok(())
    }
}

struct FakeBatcher {
    events: Events,
}

#[async_trait]
impl TransactionBatcher for FakeBatcher {
    async fn start(&self, cancel: CancellationToken) -> Result<(), NodeError> {
        record(&self.events, Event::BatcherStarted);
        cancel.cancelled().await;
        record(&self.events, Event::BatcherStopped);
        Ok(())
    }

    async fn submit_transaction(&self, _raw: Vec<u8>) -> Result<(), NodeError> {
        Ok(())
    }
}

#[async_trait]
impl SequencerBatcher for FakeBatcher {
    async fn sequence_delayed_messages(&self) -> Result<(), NodeError> {
        record(&self.events, Event::DelayedMessagesSequenced);
        Ok(())
    }
}

struct FakeRpc {
    events: Events,
}

#[async_trait]
impl RpcServer for FakeRpc {
    async fn serve(&self, cancel: CancellationToken) -> Result<(), NodeError> {
        record(&self.events, Event::RpcServing);
        cancel.cancelled().await;
        record(&self.events, Event::RpcStopped);
        Ok(())
    }
}

/// Factory with at most one wallet per signer.
struct FakeWallets {
    owner: Address,
    deployed: Arc<Mutex<Option<Address>>>,
    events: Events,
}

#[async_trait]
impl WalletContracts for FakeWallets {
    async fn owner(&self, _wallet: Address) -> Result<Address, NodeError> {
        Ok(self.owner)
    }

    async fn create_wallet_if_needed(
        &self,
        known: Option<Address>,
    ) -> Result<WalletCreation, NodeError> {
        let mut deployed = self.deployed.lock().expect("wallet slot poisoned");
        if let Some(wallet) = known.or(*deployed) {
            return Ok(WalletCreation::Existing(wallet));
        }
        *deployed = Some(DEPLOYED_WALLET);
        record(&self.events, Event::WalletDeployed(DEPLOYED_WALLET));
        Ok(WalletCreation::Created(DEPLOYED_WALLET))
    }
}

struct FakeDriver {
    finishes: bool,
    events: Events,
}

#[async_trait]
impl ValidatorDriver for FakeDriver {
    async fn run(&self, cancel: CancellationToken) -> Result<(), NodeError> {
        record(&self.events, Event::DriverRunning);
        if self.finishes {
            tokio::time::sleep(Duration::from_secs(1)).await;
        } else {
            cancel.cancelled().await;
        }
        Ok(())
    }
}

/// A supervisor running in the background.
pub struct RunningNode {
    pub cancel: CancellationToken,
    pub stages: watch::Receiver<SupervisorStage>,
    pub handle: JoinHandle<Result<Subsystem, NodeError>>,
}

impl RunningNode {
    /// Validate `config` and start the supervisor on `backend`.
    pub fn spawn(config: &NodeConfig, backend: Arc<FakeBackend>) -> Self {
        let supervisor = NodeSupervisor::from_config(config, backend, create_test_logger())
            .expect("configuration should validate");
        let cancel = supervisor.cancellation();
        let stages = supervisor.stages();
        let handle = tokio::spawn(supervisor.run());
        Self {
            cancel,
            stages,
            handle,
        }
    }

    /// Wait until startup has finished, successfully or not.
    pub async fn wait_running(&mut self) -> SupervisorStage {
        self.stages
            .wait_for(|stage| *stage >= SupervisorStage::Running)
            .await
            .map(|stage| *stage)
            .unwrap_or(SupervisorStage::Terminated)
    }

    /// Cancel the shared scope and wait for termination.
    pub async fn stop(self) -> Result<Subsystem, NodeError> {
        self.cancel.cancel();
        self.finish().await
    }

    /// Wait for the supervisor to terminate on its own.
    pub async fn finish(self) -> Result<Subsystem, NodeError> {
        self.handle.await.expect("supervisor task panicked")
    }
}
