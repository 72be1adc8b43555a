//! Node supervisor.
//!
//! [`NodeSupervisor`] is the only component aware of role-specific branching.
//! It walks through the startup stages in dependency order, blocks in the
//! shutdown aggregator once everything is live, and releases what it owns on
//! the way out:
//!
//! ```text
//! ConfigValidated -> RoleResolved -> CoreOpened -> SubsystemsStarting
//!                 -> Running -> ShuttingDown -> Terminated
//! ```
//!
//! ## Startup Order
//!
//! 1. Role resolution: role notes are logged; a validator loads its signer and,
//!    in one-shot wallet mode, resolves or creates its wallet and stops here.
//! 2. Ledger core, then the feed subscription. The feed has to be listening
//!    before inbox ingestion starts reading from it.
//! 3. Inbox ingestion, retried until it starts or fails fatally.
//! 4. Initial prune, then role-specific preparation (wallet bootstrap for
//!    validators; signer and balance wait for posting roles).
//! 5. Transaction index, then the optional catch-up wait.
//! 6. Submission path behind the leader lockout, retried like ingestion.
//!    Pending delayed messages are sequenced here, before the API opens.
//! 7. API server, consistency watchdog, pruning loop, validating-party driver.
//!
//! Any error before `Running` aborts startup. Owned resources are released
//! either way.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use slog::{Logger, o};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{
    LockoutConfig, NodeConfig, NodeRole, RoleConfig, SequencerDangerous, ValidatedConfig,
    WalletSettings,
};
use crate::error::{ConfigError, NodeError};
use crate::lockout::{ActiveSubmission, LeaderLockout};
use crate::maintenance::{PruneLoop, prune_once};
use crate::retry::RetryingInitializer;
use crate::services::{
    CoreParams, FEED_CHANNEL_CAPACITY, FeedMessage, FeedMessages, InboxParams, InboxReader,
    InboxReaderHandle, LedgerCore, NodeBackend, RpcContext, TxIndex, ValidatorDriver,
    ValidatorParams,
};
use crate::shutdown::{ShutdownAggregator, Subsystem};
use crate::submission::{Batcher, BatcherMode, RejectingBatcher, SubmissionPath};
use crate::types::Signer;
use crate::wallet::WalletBootstrapper;
use crate::watchdog::ConsistencyWatchdog;

/// Capacity of the shared feed error channel.
const FEED_ERROR_CAPACITY: usize = 16;

/// Supervisor lifecycle stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SupervisorStage {
    ConfigValidated,
    RoleResolved,
    CoreOpened,
    SubsystemsStarting,
    Running,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for SupervisorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What happens to the sequencer feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedPlan {
    /// No feed URL configured.
    NotConfigured,
    /// Validators never consume the feed.
    Ignored,
    Subscribe(Vec<String>),
}

/// How the validator wallet is handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletPlan {
    /// Not a validator.
    NotApplicable,
    /// Watchtower: no signer and no wallet.
    WatchOnly,
    /// Resolve and validate, then run the driver.
    Resolve(WalletSettings),
    /// Resolve or create, then exit.
    CreateAndExit(WalletSettings),
}

/// Side-effect free summary of what the supervisor will construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartupPlan {
    pub role: NodeRole,
    /// `None` when submission is disabled entirely.
    pub submission: Option<BatcherMode>,
    pub needs_signer: bool,
    pub lockout: Option<LockoutConfig>,
    pub feed: FeedPlan,
    pub watchdog_target: Option<String>,
    pub wait_to_catch_up: bool,
    pub pruning: bool,
    pub wallet: WalletPlan,
    /// Execution-gas ceiling handed to the core. Forced to unlimited for validators.
    pub max_execution_gas: u64,
    pub dangerous: SequencerDangerous,
}

impl StartupPlan {
    pub fn from_config(config: &ValidatedConfig) -> Self {
        let role = config.node_role();
        let submission = BatcherMode::for_role(&config.role);

        let feed = if config.feed.urls.is_empty() {
            FeedPlan::NotConfigured
        } else if role == NodeRole::Validator {
            FeedPlan::Ignored
        } else {
            FeedPlan::Subscribe(config.feed.urls.clone())
        };

        let (lockout, dangerous, watchdog_target, wallet) = match &config.role {
            RoleConfig::Sequencer(sequencer) => (
                sequencer.lockout.clone(),
                sequencer.dangerous,
                None,
                WalletPlan::NotApplicable,
            ),
            RoleConfig::Forwarder(forwarder) => (
                None,
                SequencerDangerous::default(),
                forwarder.target.clone(),
                WalletPlan::NotApplicable,
            ),
            RoleConfig::Aggregator(_) => (
                None,
                SequencerDangerous::default(),
                None,
                WalletPlan::NotApplicable,
            ),
            RoleConfig::Validator(validator) => {
                let wallet = if !validator.needs_wallet() {
                    WalletPlan::WatchOnly
                } else if validator.wallet.only_create {
                    WalletPlan::CreateAndExit(validator.wallet.clone())
                } else {
                    WalletPlan::Resolve(validator.wallet.clone())
                };
                (None, SequencerDangerous::default(), None, wallet)
            }
        };

        let needs_signer = submission.as_ref().is_some_and(BatcherMode::requires_signer)
            || matches!(wallet, WalletPlan::Resolve(_) | WalletPlan::CreateAndExit(_));

        let max_execution_gas = if role == NodeRole::Validator {
            0
        } else {
            config.max_execution_gas
        };

        Self {
            role,
            submission,
            needs_signer,
            lockout,
            feed,
            watchdog_target,
            wait_to_catch_up: config.wait_to_catch_up,
            pruning: config.pruning_enabled,
            wallet,
            max_execution_gas,
            dangerous,
        }
    }
}

impl fmt::Display for StartupPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "role:              {}", self.role)?;
        match &self.submission {
            Some(mode) => writeln!(f, "submission:        {mode}")?,
            None => writeln!(f, "submission:        disabled (read-only API)")?,
        }
        writeln!(f, "signer required:   {}", self.needs_signer)?;
        match &self.lockout {
            Some(lockout) => writeln!(
                f,
                "lockout:           {} (advertising {})",
                lockout.lock_service, lockout.self_rpc_url
            )?,
            None => writeln!(f, "lockout:           none")?,
        }
        match &self.feed {
            FeedPlan::NotConfigured => writeln!(f, "feed:              not configured")?,
            FeedPlan::Ignored => writeln!(f, "feed:              ignored")?,
            FeedPlan::Subscribe(urls) => writeln!(f, "feed:              {}", urls.join(", "))?,
        }
        match &self.watchdog_target {
            Some(target) => writeln!(f, "watchdog:          {target}")?,
            None => writeln!(f, "watchdog:          off")?,
        }
        writeln!(f, "wait to catch up:  {}", self.wait_to_catch_up)?;
        writeln!(f, "pruning:           {}", self.pruning)?;
        match &self.wallet {
            WalletPlan::NotApplicable => writeln!(f, "wallet:            n/a"),
            WalletPlan::WatchOnly => writeln!(f, "wallet:            watch-only"),
            WalletPlan::Resolve(settings) => {
                writeln!(f, "wallet:            {}", settings.state_file.display())
            }
            WalletPlan::CreateAndExit(settings) => writeln!(
                f,
                "wallet:            create and exit ({})",
                settings.state_file.display()
            ),
        }
    }
}

/// Resources released during teardown, in reverse order of acquisition.
#[derive(Default)]
struct OwnedResources {
    core: Option<Arc<dyn LedgerCore>>,
    tx_index: Option<Arc<dyn TxIndex>>,
    submission: Option<ActiveSubmission>,
}

impl OwnedResources {
    async fn release(self, tasks: &TaskTracker, timeout: Duration, logger: &Logger) {
        tasks.close();
        if tokio::time::timeout(timeout, tasks.wait()).await.is_err() {
            slog::warn!(logger, "Timed out waiting for background tasks"; "remaining" => tasks.len());
        }
        if let Some(submission) = self.submission {
            submission.release(logger).await;
        }
        if let Some(index) = self.tx_index {
            index.close().await;
        }
        if let Some(core) = self.core {
            core.close().await;
        }
    }
}

/// Output of the role-specific preparation step.
struct RolePreparation {
    signer: Option<Signer>,
    driver: Option<Arc<dyn ValidatorDriver>>,
    submission: SubmissionPath,
}

pub struct NodeSupervisor<B: NodeBackend> {
    config: ValidatedConfig,
    plan: StartupPlan,
    backend: Arc<B>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    stage: watch::Sender<SupervisorStage>,
    logger: Logger,
}

impl<B: NodeBackend> NodeSupervisor<B> {
    pub fn new(config: ValidatedConfig, backend: Arc<B>, logger: Logger) -> Self {
        let plan = StartupPlan::from_config(&config);
        let (stage, _) = watch::channel(SupervisorStage::ConfigValidated);
        Self {
            logger: logger.new(o!("component" => "supervisor", "role" => plan.role.to_string())),
            config,
            plan,
            backend,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            stage,
        }
    }

    /// Validate raw configuration. Nothing is constructed on failure.
    pub fn from_config(
        config: &NodeConfig,
        backend: Arc<B>,
        logger: Logger,
    ) -> Result<Self, ConfigError> {
        let validated = config.validate()?;
        Ok(Self::new(validated, backend, logger))
    }

    /// The shared cancellation scope. Cancelling it stops the node.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn plan(&self) -> &StartupPlan {
        &self.plan
    }

    /// Observe lifecycle stage transitions.
    pub fn stages(&self) -> watch::Receiver<SupervisorStage> {
        self.stage.subscribe()
    }

    /// Run the node until the first shutdown signal.
    ///
    /// Returns the subsystem whose clean exit ended the run, or the error
    /// that ended it. Errors for which [`NodeError::is_expected_termination`]
    /// holds are deliberate stops, not failures.
    pub async fn run(self) -> Result<Subsystem, NodeError> {
        let mut owned = OwnedResources::default();
        let result = self.start_and_supervise(&mut owned).await;

        self.advance(SupervisorStage::ShuttingDown);
        self.cancel.cancel();
        owned
            .release(&self.tasks, self.config.timings.shutdown_timeout, &self.logger)
            .await;
        slog::info!(self.logger, "Cleanly shutting down node");
        self.advance(SupervisorStage::Terminated);

        result
    }

    fn advance(&self, stage: SupervisorStage) {
        self.stage.send_replace(stage);
        slog::debug!(self.logger, "Supervisor stage"; "stage" => %stage);
    }

    async fn start_and_supervise(&self, owned: &mut OwnedResources) -> Result<Subsystem, NodeError> {
        let mut aggregator = ShutdownAggregator::new(self.cancel.clone(), self.logger.clone());

        self.advance(SupervisorStage::RoleResolved);
        self.log_launch();

        let validator_signer = match &self.plan.wallet {
            WalletPlan::Resolve(_) | WalletPlan::CreateAndExit(_) => Some(self.backend.signer().await?),
            WalletPlan::NotApplicable | WalletPlan::WatchOnly => None,
        };
        if let (WalletPlan::CreateAndExit(settings), Some(signer)) = (&self.plan.wallet, validator_signer) {
            slog::info!(self.logger, "Only creating validator wallet contract, then exiting");
            let bootstrapper = self.wallet_bootstrapper(settings, signer).await?;
            return Err(bootstrapper.create_and_exit().await);
        }

        let core = self
            .backend
            .open_core(&CoreParams {
                database_path: self.config.database_path.clone(),
                machine_file: self.config.machine_file.clone(),
                max_execution_gas: self.plan.max_execution_gas,
                rollup: self.config.rollup,
            })
            .await?;
        owned.core = Some(Arc::clone(&core));
        self.advance(SupervisorStage::CoreOpened);
        slog::info!(self.logger, "Ledger core opened"; "database" => %self.config.database_path.display());

        let feed = self.subscribe_feed(core.as_ref(), &mut aggregator).await?;

        self.advance(SupervisorStage::SubsystemsStarting);
        let inbox = self.start_inbox_reader(&core, feed).await?;
        let inbox_reader = inbox.reader;
        aggregator.watch_completion(Subsystem::InboxReader, inbox.done);

        if self.plan.pruning {
            prune_once(core.as_ref(), &self.logger).await;
        }

        let prepared = self.prepare_role(validator_signer, &core).await?;

        let tx_index = self
            .backend
            .open_tx_index(Arc::clone(&core), self.cancel.clone())
            .await?;
        let index = tx_index.index;
        owned.tx_index = Some(Arc::clone(&index));
        aggregator.watch_errors(Subsystem::TxIndex, tx_index.errors);

        if self.plan.wait_to_catch_up {
            slog::info!(self.logger, "Waiting for inbox reader to catch up");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(NodeError::Cancelled("inbox catch-up")),
                caught_up = inbox_reader.wait_to_catch_up(&self.cancel) => caught_up?,
            }
            slog::info!(self.logger, "Inbox reader caught up");
        }

        let submission = match &self.plan.submission {
            Some(mode) if mode.is_backend_built() => {
                let active = self
                    .activate_submission(mode, prepared.signer, &core, &inbox_reader, &mut aggregator)
                    .await?;
                let path = SubmissionPath::Active(active.batcher().clone());
                owned.submission = Some(active);
                path
            }
            _ => prepared.submission,
        };

        let rpc = self
            .backend
            .rpc_server(RpcContext {
                chain_id: self.config.chain_id,
                core: Arc::clone(&core),
                tx_index: Arc::clone(&index),
                submission,
                inbox_reader: self
                    .config
                    .enable_l1_calls
                    .then(|| Arc::clone(&inbox_reader)),
            })
            .await?;
        let cancel = self.cancel.clone();
        aggregator.watch_task(
            Subsystem::Rpc,
            self.tasks.spawn(async move { rpc.serve(cancel).await }),
        );
        slog::info!(self.logger, "API server started");

        let mut watchdog_trip = None;
        if let Some(target) = &self.plan.watchdog_target {
            let watchdog = ConsistencyWatchdog::new(
                target.clone(),
                Arc::clone(&index),
                self.backend.upstream_dialer(),
                &self.config.timings,
                self.cancel.clone(),
                self.logger.clone(),
            );
            watchdog_trip = Some(watchdog.trip_signal());
            self.tasks.spawn(watchdog.run());
        }

        if self.plan.pruning {
            let pruning = PruneLoop::new(
                Arc::clone(&core),
                self.config.timings.prune_interval,
                self.cancel.clone(),
                self.logger.clone(),
            );
            self.tasks.spawn(pruning.run());
        }

        if let Some(driver) = prepared.driver {
            let cancel = self.cancel.clone();
            aggregator.watch_task(
                Subsystem::ValidatorDriver,
                self.tasks.spawn(async move { driver.run(cancel).await }),
            );
            slog::info!(self.logger, "Validating-party driver started");
        }

        self.advance(SupervisorStage::Running);
        slog::info!(self.logger, "Node running"; "watched_subsystems" => aggregator.len());

        let result = aggregator.wait().await.into_result();
        match (result, watchdog_trip.and_then(|trip| trip.mismatches())) {
            // The watchdog stops the node by cancelling the shared scope, so
            // any clean exit after a trip is a consequence of it.
            (Ok(_), Some(mismatches)) => {
                Err(NodeError::ConsistencyLost { mismatches })
            }
            (result, _) => result,
        }
    }

    fn log_launch(&self) {
        slog::info!(
            self.logger,
            "Launching rollup node";
            "chain_id" => self.config.chain_id,
            "rollup" => %self.config.rollup.address,
            "from_block" => self.config.rollup.from_block,
            "database" => %self.config.database_path.display(),
        );

        if self.plan.role == NodeRole::Validator && self.config.max_execution_gas != 0 {
            slog::warn!(self.logger, "Allowing unlimited core execution because running as validator");
        }

        let dangerous = self.plan.dangerous;
        if dangerous.any_enabled() {
            slog::error!(
                self.logger,
                "Sequencer starting up with dangerous options enabled";
                "disable_batch_posting" => dangerous.disable_batch_posting,
                "reorg_out_huge_messages" => dangerous.reorg_out_huge_messages,
            );
        }
    }

    async fn subscribe_feed(
        &self,
        core: &dyn LedgerCore,
        aggregator: &mut ShutdownAggregator,
    ) -> Result<Option<FeedMessages>, NodeError> {
        let urls = match &self.plan.feed {
            FeedPlan::NotConfigured => {
                slog::warn!(self.logger, "Missing feed URL, not subscribing to feed");
                return Ok(None);
            }
            FeedPlan::Ignored => {
                slog::info!(self.logger, "Ignoring feed because running as validator");
                return Ok(None);
            }
            FeedPlan::Subscribe(urls) => urls,
        };

        // Message count is 1-based and sequence numbers 0-based, so the next
        // sequence number to request equals the current count.
        let start_from = core.message_count().await?;

        let (messages_tx, messages_rx) = mpsc::channel::<FeedMessage>(FEED_CHANNEL_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(FEED_ERROR_CAPACITY);
        let timeout = self.config.feed.timeout;
        for url in urls {
            let backend = Arc::clone(&self.backend);
            let url = url.clone();
            let messages = messages_tx.clone();
            let errors = errors_tx.clone();
            let cancel = self.cancel.clone();
            self.tasks.spawn(async move {
                let connected = backend
                    .connect_feed(&url, start_from, timeout, messages, errors.clone(), cancel)
                    .await;
                if let Err(e) = connected {
                    errors.send(e).await.ok();
                }
            });
        }
        aggregator.watch_errors(Subsystem::FeedClient, errors_rx);
        slog::info!(self.logger, "Subscribed to feed"; "urls" => urls.len(), "start_from" => start_from);

        Ok(Some(Arc::new(Mutex::new(messages_rx))))
    }

    async fn start_inbox_reader(
        &self,
        core: &Arc<dyn LedgerCore>,
        feed: Option<FeedMessages>,
    ) -> Result<InboxReaderHandle, NodeError> {
        let params = InboxParams {
            l1_url: self.config.l1_url.clone(),
            rollup: self.config.rollup,
            bridge_utils_address: self.config.bridge_utils_address,
        };
        let initializer = RetryingInitializer::new(
            "inbox reader start",
            self.config.timings.retry_delay,
            self.cancel.clone(),
            self.logger.new(o!(
                "url" => params.l1_url.clone(),
                "bridge_utils" => params.bridge_utils_address.to_string(),
            )),
        );

        let handle: InboxReaderHandle = initializer
            .run(|_| {
                let backend = Arc::clone(&self.backend);
                let core = Arc::clone(core);
                let feed = feed.clone();
                let params = params.clone();
                let cancel = self.cancel.clone();
                async move {
                    backend
                        .start_inbox_reader(&params, core, feed, cancel)
                        .await
                }
            })
            .await?;
        slog::info!(self.logger, "Inbox reader started");
        Ok(handle)
    }

    async fn prepare_role(
        &self,
        validator_signer: Option<Signer>,
        core: &Arc<dyn LedgerCore>,
    ) -> Result<RolePreparation, NodeError> {
        match &self.config.role {
            RoleConfig::Validator(validator) => {
                let wallet = match (&self.plan.wallet, validator_signer) {
                    (WalletPlan::Resolve(settings), Some(signer)) => {
                        Some(self.wallet_bootstrapper(settings, signer).await?.resolve().await?)
                    }
                    _ => None,
                };
                let params = ValidatorParams {
                    strategy: validator.strategy,
                    utils_address: validator.utils_address,
                    wallet,
                    signer: validator_signer,
                    staker_delay: validator.staker_delay,
                };
                let driver = self
                    .backend
                    .validator_driver(&params, Arc::clone(core))
                    .await?;
                slog::info!(self.logger, "Initialized validator"; "strategy" => %validator.strategy);

                let reason = match &self.plan.submission {
                    Some(BatcherMode::Error { reason }) => reason.clone(),
                    _ => crate::submission::VALIDATOR_REJECTION.to_string(),
                };
                Ok(RolePreparation {
                    signer: validator_signer,
                    driver: Some(driver),
                    submission: SubmissionPath::Active(Batcher::Standard(Arc::new(
                        RejectingBatcher::new(reason),
                    ))),
                })
            }
            RoleConfig::Forwarder(forwarder) => {
                match &forwarder.target {
                    Some(target) => {
                        slog::info!(self.logger, "Node starting in forwarder mode"; "target" => target)
                    }
                    None => slog::info!(self.logger, "Node starting with a read-only API"),
                }
                Ok(RolePreparation {
                    signer: None,
                    driver: None,
                    submission: SubmissionPath::ReadOnly,
                })
            }
            RoleConfig::Aggregator(_) | RoleConfig::Sequencer(_) => {
                let signer = self.backend.signer().await?;
                if self.plan.dangerous.disable_batch_posting {
                    slog::info!(self.logger, "Node with disabled batch posting"; "from" => %signer.address);
                } else {
                    slog::info!(self.logger, "Node submitting batches"; "from" => %signer.address);
                }

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(NodeError::Cancelled("balance wait")),
                    funded = self.backend.wait_for_balance(&signer, &self.cancel) => funded?,
                }

                Ok(RolePreparation {
                    signer: Some(signer),
                    driver: None,
                    submission: SubmissionPath::ReadOnly,
                })
            }
        }
    }

    async fn wallet_bootstrapper(
        &self,
        settings: &WalletSettings,
        signer: Signer,
    ) -> Result<WalletBootstrapper, NodeError> {
        let RoleConfig::Validator(validator) = &self.config.role else {
            return Err(NodeError::fatal(anyhow::anyhow!(
                "wallet bootstrap requires the validator role"
            )));
        };
        let contracts = self
            .backend
            .wallet_contracts(&signer, validator.wallet_factory_address)
            .await?;
        Ok(WalletBootstrapper::new(
            settings.clone(),
            signer,
            contracts,
            self.logger.clone(),
        ))
    }

    async fn activate_submission(
        &self,
        mode: &BatcherMode,
        signer: Option<Signer>,
        core: &Arc<dyn LedgerCore>,
        inbox_reader: &Arc<dyn InboxReader>,
        aggregator: &mut ShutdownAggregator,
    ) -> Result<ActiveSubmission, NodeError> {
        let initializer = RetryingInitializer::new(
            "batcher setup",
            self.config.timings.retry_delay,
            self.cancel.clone(),
            self.logger.new(o!("mode" => mode.to_string())),
        );

        let (active, broadcaster_errors): (ActiveSubmission, Option<mpsc::Receiver<NodeError>>) =
            initializer
                .run(|_| {
                    let backend = Arc::clone(&self.backend);
                    let core = Arc::clone(core);
                    let inbox_reader = Arc::clone(inbox_reader);
                    let lockout_config = self.plan.lockout.clone();
                    let cancel = self.cancel.clone();
                    let tasks = self.tasks.clone();
                    let logger = self.logger.clone();
                    async move {
                        let setup = backend.setup_batcher(mode, signer, core, inbox_reader).await?;
                        let lock = match &lockout_config {
                            Some(config) => Some(backend.connect_lock_service(config).await?),
                            None => None,
                        };
                        let active = LeaderLockout::new(lock, cancel, tasks, logger)
                            .activate(setup.batcher)
                            .await?;
                        Ok::<_, NodeError>((active, setup.broadcaster_errors))
                    }
                })
                .await?;

        aggregator.watch_task(
            Subsystem::Batcher,
            active.spawn_batcher(&self.tasks, self.cancel.clone()),
        );
        if let Some(hold) = active.spawn_hold(&self.tasks, self.cancel.clone()) {
            aggregator.watch_task(Subsystem::Lockout, hold);
        }
        if let Some(errors) = broadcaster_errors {
            aggregator.watch_errors(Subsystem::Broadcaster, errors);
        }
        slog::info!(self.logger, "Submission path active"; "mode" => %mode, "locked" => active.is_locked());
        Ok(active)
    }
}
