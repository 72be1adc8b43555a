//! Node configuration types.
//!
//! [`NodeConfig`] is the raw, loosely typed configuration as loaded from
//! TOML/YAML files and `ROLLUP_NODE_` environment variables. Every field is
//! optional at this level. [`NodeConfig::validate`] turns it into an immutable
//! [`ValidatedConfig`] whose [`RoleConfig`] carries exactly the settings the
//! resolved role needs. All role-specific checks run there, before the
//! supervisor constructs any subsystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Address;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "ROLLUP_NODE_";

/// Default file name of the persisted validator wallet record.
pub const DEFAULT_CHAIN_STATE_FILE: &str = "chainState.json";

/// Operating role of the node. Exactly one is active per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Forwarder,
    Aggregator,
    Sequencer,
    Validator,
}

impl FromStr for NodeRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forwarder" => Ok(NodeRole::Forwarder),
            "aggregator" => Ok(NodeRole::Aggregator),
            "sequencer" => Ok(NodeRole::Sequencer),
            "validator" => Ok(NodeRole::Validator),
            _ => Err(ConfigError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Forwarder => "forwarder",
            NodeRole::Aggregator => "aggregator",
            NodeRole::Sequencer => "sequencer",
            NodeRole::Validator => "validator",
        };
        f.write_str(name)
    }
}

/// Strategy run by the validating-party driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidatorStrategy {
    Watchtower,
    Defensive,
    StakeLatest,
    MakeNodes,
}

impl FromStr for ValidatorStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "watchtower" => Ok(ValidatorStrategy::Watchtower),
            "defensive" => Ok(ValidatorStrategy::Defensive),
            "stakelatest" => Ok(ValidatorStrategy::StakeLatest),
            "makenodes" => Ok(ValidatorStrategy::MakeNodes),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for ValidatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorStrategy::Watchtower => "Watchtower",
            ValidatorStrategy::Defensive => "Defensive",
            ValidatorStrategy::StakeLatest => "StakeLatest",
            ValidatorStrategy::MakeNodes => "MakeNodes",
        };
        f.write_str(name)
    }
}

/// API mode of a forwarder node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcMode {
    /// Accepts transactions and forwards them upstream.
    Full,
    /// Read-only API. Submission is disabled entirely.
    NonMutating,
}

impl FromStr for RpcMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "full" => Ok(RpcMode::Full),
            "non-mutating" | "non_mutating" | "nonmutating" | "read-only" => {
                Ok(RpcMode::NonMutating)
            }
            _ => Err(ConfigError::UnknownRpcMode(s.to_string())),
        }
    }
}

impl fmt::Display for RpcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcMode::Full => f.write_str("full"),
            RpcMode::NonMutating => f.write_str("non-mutating"),
        }
    }
}

/// Base-layer connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct L1Config {
    /// Base-layer RPC endpoint.
    pub url: Option<String>,
}

/// Rollup contract settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    /// Rollup contract address.
    pub address: Option<String>,

    /// Base-layer block the rollup was deployed at.
    pub from_block: u64,

    /// Number of base-layer blocks scanned per event query.
    pub block_search_size: u64,

    /// Initial ledger snapshot.
    pub machine: MachineConfig,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            address: None,
            from_block: 0,
            block_search_size: 100,
            machine: MachineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub filename: Option<PathBuf>,
}

/// Persistent storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// Node data directory. The ledger database lives in `<chain>/db`.
    pub chain: Option<PathBuf>,
}

/// Role selection and role-specific sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// One of `forwarder`, `aggregator`, `sequencer`, `validator`.
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Rollup chain id.
    pub chain_id: Option<u64>,

    pub forwarder: ForwarderConfig,
    pub aggregator: AggregatorConfig,
    pub sequencer: SequencerConfig,
    pub rpc: RpcConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Upstream node that receives forwarded submissions.
    pub target: Option<String>,

    /// `full` (default) or `non-mutating`.
    pub rpc_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Inbox contract used for direct submission.
    pub inbox_address: Option<String>,

    /// Track submitted batches across restarts.
    pub stateful: bool,

    /// Maximum time a batch stays open.
    pub max_batch_time: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            inbox_address: None,
            stateful: false,
            max_batch_time: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub lockout: LockoutSection,
    pub dangerous: SequencerDangerous,
}

/// Raw lockout settings. Both fields or neither.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutSection {
    /// Lock service address.
    pub redis: Option<String>,

    /// RPC address this node advertises to its peers while holding the lock.
    pub self_rpc_url: Option<String>,
}

/// Options that trade safety for operator convenience.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerDangerous {
    pub disable_batch_posting: bool,
    pub reorg_out_huge_messages: bool,
}

impl SequencerDangerous {
    pub fn any_enabled(&self) -> bool {
        *self != SequencerDangerous::default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Expose the inbox reader to the API surface for base-layer calls.
    pub enable_l1_calls: bool,
}

/// Validating-party settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSection {
    pub strategy: Option<String>,
    pub utils_address: Option<String>,
    pub wallet_factory_address: Option<String>,

    /// Explicit wallet contract. Overrides the persisted record for this run only.
    pub contract_wallet_address: Option<String>,

    /// Persisted wallet record, relative to `persistent.chain` unless absolute.
    pub contract_wallet_address_filename: PathBuf,

    /// Resolve or create the wallet contract, then exit.
    pub only_create_wallet_contract: bool,

    /// Delay between validating-party driver rounds.
    pub staker_delay: Duration,
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            strategy: None,
            utils_address: None,
            wallet_factory_address: None,
            contract_wallet_address: None,
            contract_wallet_address_filename: PathBuf::from(DEFAULT_CHAIN_STATE_FILE),
            only_create_wallet_contract: false,
            staker_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub input: FeedInputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedInputConfig {
    /// Sequencer feed endpoints. Empty means no subscription.
    pub urls: Vec<String>,

    /// Idle timeout after which a feed connection is re-established.
    pub timeout: Duration,
}

impl Default for FeedInputConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Ledger engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Execution-gas ceiling per checkpoint. `0` means unlimited.
    pub checkpoint_max_execution_gas: Option<u64>,

    /// `off` disables pruning; any other value enables it.
    pub checkpoint_pruning_mode: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            checkpoint_max_execution_gas: None,
            checkpoint_pruning_mode: "default".to_string(),
        }
    }
}

/// Supervisor timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Delay between attempts of a retried startup step.
    pub retry_delay: Duration,

    /// Interval between consistency checks.
    pub check_interval: Duration,

    /// Blocks held back from the tip before comparing headers.
    pub warmup_blocks: u64,

    /// Consecutive header mismatches that trigger shutdown.
    pub fail_limit: u32,

    /// Interval between prune-point updates.
    pub prune_interval: Duration,

    /// Upper bound on waiting for background workers during teardown.
    pub shutdown_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            check_interval: Duration::from_secs(30),
            warmup_blocks: 5,
            fail_limit: 6,
            prune_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete raw node configuration.
///
/// # Example TOML
///
/// ```toml
/// bridge_utils_address = "0x84efa170dc6d521495d7942e372b8e4b2fb918ec"
/// wait_to_catch_up = false
///
/// [l1]
/// url = "http://127.0.0.1:8545"
///
/// [rollup]
/// address = "0xc12ba48c781f6e392b49db2e25cd0c28cd77531a"
/// from_block = 12525700
/// machine = { filename = "/var/lib/rollup/mainnet.arb1.mexe" }
///
/// [persistent]
/// chain = "/var/lib/rollup/chain"
///
/// [node]
/// type = "sequencer"
/// chain_id = 42161
///
/// [node.sequencer.lockout]
/// redis = "redis://10.0.0.5:6379"
/// self_rpc_url = "http://10.0.0.6:8547"
///
/// [core]
/// checkpoint_max_execution_gas = 0
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub l1: L1Config,
    pub rollup: RollupConfig,
    pub bridge_utils_address: Option<String>,
    pub persistent: PersistentConfig,
    pub node: NodeSection,
    pub wait_to_catch_up: bool,
    pub validator: ValidatorSection,
    pub feed: FeedConfig,
    pub core: CoreConfig,
    pub timings: Timings,
}

impl NodeConfig {
    /// Load configuration from a file path.
    ///
    /// Supports TOML (.toml) and YAML (.yaml, .yml) formats.
    /// Environment variables can override file values using the `ROLLUP_NODE_`
    /// prefix, with `__` separating nested keys: `ROLLUP_NODE_NODE__CHAIN_ID=42161`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let mut figment = Figment::new();

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            figment = match ext {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                _ => {
                    return Err(ConfigError::Load(Box::new(figment::Error::from(format!(
                        "unsupported config file format: {ext}. Use .toml, .yaml, or .yml"
                    )))));
                }
            };
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Validate the configuration and resolve the node role.
    ///
    /// Each missing required field yields a distinct
    /// [`ConfigError::MissingField`] naming it.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let l1_url = required_str(&self.l1.url, "l1.url")?;
        let rollup_address = required_address(&self.rollup.address, "rollup.address")?;
        let bridge_utils_address =
            required_address(&self.bridge_utils_address, "bridge_utils_address")?;
        let storage_path = self
            .persistent
            .chain
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingField("persistent.chain"))?;
        let chain_id = self
            .node
            .chain_id
            .filter(|id| *id != 0)
            .ok_or(ConfigError::MissingField("node.chain_id"))?;
        let machine_file = self
            .rollup
            .machine
            .filename
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingField("rollup.machine.filename"))?;
        let max_execution_gas = self
            .core
            .checkpoint_max_execution_gas
            .ok_or(ConfigError::MissingField("core.checkpoint_max_execution_gas"))?;

        let lockout = self.lockout()?;

        let kind = non_empty(&self.node.kind).ok_or(ConfigError::MissingField("node.type"))?;
        let role_kind: NodeRole = kind.parse()?;

        if lockout.is_some() && role_kind != NodeRole::Sequencer {
            return Err(ConfigError::LockoutRequiresSequencer);
        }

        let mut wait_to_catch_up = self.wait_to_catch_up;
        let role = match role_kind {
            NodeRole::Forwarder => {
                let forwarder = &self.node.forwarder;
                let mode = forwarder.rpc_mode.as_deref().unwrap_or("full").parse::<RpcMode>();
                match mode {
                    Ok(RpcMode::NonMutating) => RoleConfig::Forwarder(ForwarderRole {
                        target: None,
                        rpc_mode: RpcMode::NonMutating,
                    }),
                    other => {
                        let target = required_str(&forwarder.target, "node.forwarder.target")?;
                        RoleConfig::Forwarder(ForwarderRole {
                            target: Some(target),
                            rpc_mode: other?,
                        })
                    }
                }
            }
            NodeRole::Aggregator => {
                let aggregator = &self.node.aggregator;
                RoleConfig::Aggregator(AggregatorRole {
                    inbox_address: required_address(
                        &aggregator.inbox_address,
                        "node.aggregator.inbox_address",
                    )?,
                    stateful: aggregator.stateful,
                    max_batch_time: aggregator.max_batch_time,
                })
            }
            NodeRole::Sequencer => {
                // A sequencer must never open its API ahead of the base layer.
                wait_to_catch_up = true;
                RoleConfig::Sequencer(SequencerRole {
                    lockout,
                    dangerous: self.node.sequencer.dangerous,
                })
            }
            NodeRole::Validator => {
                let validator = &self.validator;
                let strategy = non_empty(&validator.strategy)
                    .ok_or(ConfigError::MissingField("validator.strategy"))?
                    .parse::<ValidatorStrategy>()?;
                if strategy == ValidatorStrategy::Watchtower && validator.only_create_wallet_contract {
                    return Err(ConfigError::WatchtowerWalletCreation);
                }
                let utils_address =
                    required_address(&validator.utils_address, "validator.utils_address")?;
                let wallet_factory_address = required_address(
                    &validator.wallet_factory_address,
                    "validator.wallet_factory_address",
                )?;
                let explicit_wallet = non_empty(&validator.contract_wallet_address)
                    .map(|raw| parse_address(&raw, "validator.contract_wallet_address"))
                    .transpose()?;
                let state_file = if validator.contract_wallet_address_filename.is_absolute() {
                    validator.contract_wallet_address_filename.clone()
                } else {
                    storage_path.join(&validator.contract_wallet_address_filename)
                };
                RoleConfig::Validator(ValidatorRole {
                    strategy,
                    utils_address,
                    wallet_factory_address,
                    wallet: WalletSettings {
                        explicit_address: explicit_wallet,
                        state_file,
                        only_create: validator.only_create_wallet_contract,
                    },
                    staker_delay: validator.staker_delay,
                })
            }
        };

        Ok(ValidatedConfig {
            l1_url,
            rollup: RollupSettings {
                address: rollup_address,
                from_block: self.rollup.from_block,
                block_search_size: self.rollup.block_search_size,
            },
            bridge_utils_address,
            chain_id,
            database_path: storage_path.join("db"),
            storage_path,
            machine_file,
            max_execution_gas,
            pruning_enabled: !self.core.checkpoint_pruning_mode.eq_ignore_ascii_case("off"),
            feed: FeedSettings {
                urls: self
                    .feed
                    .input
                    .urls
                    .iter()
                    .filter(|url| !url.trim().is_empty())
                    .cloned()
                    .collect(),
                timeout: self.feed.input.timeout,
            },
            wait_to_catch_up,
            enable_l1_calls: self.node.rpc.enable_l1_calls,
            timings: self.timings,
            role,
        })
    }

    fn lockout(&self) -> Result<Option<LockoutConfig>, ConfigError> {
        let section = &self.node.sequencer.lockout;
        match (non_empty(&section.redis), non_empty(&section.self_rpc_url)) {
            (Some(lock_service), Some(self_rpc_url)) => Ok(Some(LockoutConfig {
                lock_service,
                self_rpc_url,
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InconsistentLockout),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_str(value: &Option<String>, field: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::MissingField(field))
}

fn parse_address(raw: &str, field: &'static str) -> Result<Address, ConfigError> {
    Address::from_hex(raw).map_err(|_| ConfigError::InvalidAddress {
        field,
        value: raw.to_string(),
    })
}

fn required_address(value: &Option<String>, field: &'static str) -> Result<Address, ConfigError> {
    let raw = required_str(value, field)?;
    parse_address(&raw, field)
}

/// Lock service coordinates. Only constructed with both fields present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutConfig {
    pub lock_service: String,
    pub self_rpc_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupSettings {
    pub address: Address,
    pub from_block: u64,
    pub block_search_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub urls: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderRole {
    /// `None` exactly when the API is read-only.
    pub target: Option<String>,
    pub rpc_mode: RpcMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorRole {
    pub inbox_address: Address,
    pub stateful: bool,
    pub max_batch_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerRole {
    pub lockout: Option<LockoutConfig>,
    pub dangerous: SequencerDangerous,
}

/// How the validator wallet contract is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSettings {
    pub explicit_address: Option<Address>,
    pub state_file: PathBuf,
    pub only_create: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRole {
    pub strategy: ValidatorStrategy,
    pub utils_address: Address,
    pub wallet_factory_address: Address,
    pub wallet: WalletSettings,
    pub staker_delay: Duration,
}

impl ValidatorRole {
    /// Watchtowers never transact, so they need neither a signer nor a wallet.
    pub fn needs_wallet(&self) -> bool {
        self.strategy != ValidatorStrategy::Watchtower
    }
}

/// Role-specific settings of the resolved role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleConfig {
    Forwarder(ForwarderRole),
    Aggregator(AggregatorRole),
    Sequencer(SequencerRole),
    Validator(ValidatorRole),
}

impl RoleConfig {
    pub fn role(&self) -> NodeRole {
        match self {
            RoleConfig::Forwarder(_) => NodeRole::Forwarder,
            RoleConfig::Aggregator(_) => NodeRole::Aggregator,
            RoleConfig::Sequencer(_) => NodeRole::Sequencer,
            RoleConfig::Validator(_) => NodeRole::Validator,
        }
    }
}

/// Configuration after validation. Immutable for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub l1_url: String,
    pub rollup: RollupSettings,
    pub bridge_utils_address: Address,
    pub chain_id: u64,
    pub storage_path: PathBuf,
    pub database_path: PathBuf,
    pub machine_file: PathBuf,
    pub max_execution_gas: u64,
    pub pruning_enabled: bool,
    pub feed: FeedSettings,
    pub wait_to_catch_up: bool,
    pub enable_l1_calls: bool,
    pub timings: Timings,
    pub role: RoleConfig,
}

impl ValidatedConfig {
    pub fn node_role(&self) -> NodeRole {
        self.role.role()
    }
}
