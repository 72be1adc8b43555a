//! Supervisor error types.
//!
//! Errors carry their retry classification in the variant itself. A failure is
//! transient only when it is one of [`NodeError::Unavailable`],
//! [`NodeError::NotReady`] or an unclassified [`NodeError::Other`]; everything
//! else aborts the startup step that produced it.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Address;

/// Configuration faults detected before any subsystem is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A required field is absent. The payload is the stable field name.
    #[error("missing required configuration field `{0}`")]
    MissingField(&'static str),

    /// `node.type` is not one of the supported roles.
    #[error("unrecognized node type {0}")]
    UnknownRole(String),

    /// `validator.strategy` is not one of the supported strategies.
    #[error(
        "unrecognized validator.strategy {0}, should be Watchtower, Defensive, StakeLatest, or MakeNodes"
    )]
    UnknownStrategy(String),

    /// `node.forwarder.rpc_mode` is not one of the supported modes.
    #[error("unrecognized RPC mode {0}")]
    UnknownRpcMode(String),

    /// Only one of the lock-service address and the self-advertised address is set.
    #[error(
        "node.sequencer.lockout.redis and node.sequencer.lockout.self_rpc_url must be set together"
    )]
    InconsistentLockout,

    /// A lock service is configured on a role that never submits as sequencer.
    #[error("node.sequencer.lockout.redis is only supported for sequencer nodes")]
    LockoutRequiresSequencer,

    /// A watchtower never transacts, so it has no wallet to create.
    #[error("validator.only_create_wallet_contract cannot be used with the Watchtower strategy")]
    WatchtowerWalletCreation,

    /// A configured address is not a well-formed hex address.
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },
}

impl ConfigError {
    /// Name of the offending configuration field, when the error concerns one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::MissingField(field) => Some(field),
            ConfigError::InvalidAddress { field, .. } => Some(field),
            ConfigError::UnknownRole(_) => Some("node.type"),
            ConfigError::UnknownStrategy(_) => Some("validator.strategy"),
            ConfigError::UnknownRpcMode(_) => Some("node.forwarder.rpc_mode"),
            ConfigError::WatchtowerWalletCreation => Some("validator.only_create_wallet_contract"),
            ConfigError::InconsistentLockout | ConfigError::LockoutRequiresSequencer => {
                Some("node.sequencer.lockout")
            }
            ConfigError::Load(_) => None,
        }
    }
}

/// Operational errors raised while starting or running the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A remote dependency could not be reached.
    #[error("{0} unavailable")]
    Unavailable(String),

    /// A dependency is reachable but not ready yet.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The ledger engine's worker thread died. Never recoverable in-process.
    #[error("internal engine thread aborted: {0}")]
    EngineAborted(String),

    #[error("validator smart contract wallet {wallet} owner {owner} doesn't match validator wallet {signer}")]
    WalletOwnerMismatch {
        wallet: Address,
        owner: Address,
        signer: Address,
    },

    #[error(
        "validator smart contract wallet not present, set validator.only_create_wallet_contract to create one"
    )]
    WalletMissing,

    /// One-shot wallet mode found an existing wallet.
    #[error(
        "validator smart contract wallet ({0}) already exists, unset validator.only_create_wallet_contract to run normally"
    )]
    WalletAlreadyExists(Address),

    /// One-shot wallet mode created a new wallet.
    #[error(
        "validator smart contract wallet ({0}) created, unset validator.only_create_wallet_contract to run normally"
    )]
    WalletCreated(Address),

    #[error("failed to access chain state file {}: {source}", path.display())]
    ChainStateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse chain state file {}: {source}", path.display())]
    ChainStateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The consistency watchdog saw the local chain diverge from upstream.
    #[error("local chain diverged from upstream after {mismatches} consecutive block hash mismatches")]
    ConsistencyLost { mismatches: u32 },

    /// The shared cancellation scope fired while the named step was pending.
    #[error("cancelled during {0}")]
    Cancelled(&'static str),

    /// A collaborator explicitly marked this failure as unrecoverable.
    #[error("fatal: {0:#}")]
    Fatal(anyhow::Error),

    /// Unclassified collaborator failure, retried by default.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    /// Wrap an error as explicitly fatal.
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        NodeError::Fatal(err.into())
    }

    /// Returns true when retrying the failed step cannot help.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            NodeError::Unavailable(_) | NodeError::NotReady(_) | NodeError::Other(_)
        )
    }

    /// Returns true for deliberate, user-facing terminations that are not failures.
    pub fn is_expected_termination(&self) -> bool {
        matches!(
            self,
            NodeError::WalletAlreadyExists(_) | NodeError::WalletCreated(_)
        )
    }
}
