//! Validator wallet resolution.
//!
//! A validating party transacts through an on-chain wallet contract. Its
//! address is remembered in a small JSON record under the data directory so
//! that restarts reuse the same wallet instead of deploying a new one:
//!
//! ```json
//! {"validatorWallet": "0x84efa170dc6d521495d7942e372b8e4b2fb918ec"}
//! ```
//!
//! An address pinned in configuration takes precedence for the current run
//! and is never written back to the record.

use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use slog::{Logger, o};

use crate::config::WalletSettings;
use crate::error::NodeError;
use crate::services::{WalletContracts, WalletCreation};
use crate::types::{Address, Signer};

/// Persisted validator wallet record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainWalletState {
    #[serde(
        rename = "validatorWallet",
        default,
        deserialize_with = "deserialize_wallet",
        skip_serializing_if = "Option::is_none"
    )]
    pub validator_wallet: Option<Address>,
}

fn deserialize_wallet<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Address>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Address::from_hex(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl ChainWalletState {
    /// Read the record. A missing file is an empty record.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(NodeError::ChainStateIo {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|source| NodeError::ChainStateFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace the record on disk.
    pub fn persist(&self, path: &Path) -> Result<(), NodeError> {
        let io_err = |source| NodeError::ChainStateIo {
            path: path.to_path_buf(),
            source,
        };
        let encoded = serde_json::to_vec_pretty(self).map_err(|source| NodeError::ChainStateFormat {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, encoded).map_err(io_err)?;
        std::fs::rename(&staging, path).map_err(io_err)
    }
}

pub struct WalletBootstrapper {
    settings: WalletSettings,
    signer: Signer,
    contracts: Arc<dyn WalletContracts>,
    logger: Logger,
}

impl WalletBootstrapper {
    pub fn new(
        settings: WalletSettings,
        signer: Signer,
        contracts: Arc<dyn WalletContracts>,
        logger: Logger,
    ) -> Self {
        Self {
            settings,
            signer,
            contracts,
            logger: logger.new(o!("component" => "wallet")),
        }
    }

    /// Resolve and validate the wallet the validator transacts through.
    pub async fn resolve(&self) -> Result<Address, NodeError> {
        let (known, _) = self.known_wallet().await?;
        let wallet = known.ok_or(NodeError::WalletMissing)?;
        slog::info!(
            self.logger,
            "Using validator wallet";
            "wallet" => %wallet,
            "pinned" => self.settings.explicit_address.is_some(),
        );
        Ok(wallet)
    }

    /// Resolve the wallet, deploying one when none is known, and return the
    /// error that ends the process.
    ///
    /// That is [`NodeError::WalletCreated`] or [`NodeError::WalletAlreadyExists`]
    /// when the wallet is in place, any other error when it could not be.
    pub async fn create_and_exit(&self) -> NodeError {
        match self.create_if_needed().await {
            Ok(WalletCreation::Created(wallet)) => NodeError::WalletCreated(wallet),
            Ok(WalletCreation::Existing(wallet)) => NodeError::WalletAlreadyExists(wallet),
            Err(e) => e,
        }
    }

    async fn create_if_needed(&self) -> Result<WalletCreation, NodeError> {
        let explicit = self.settings.explicit_address;
        let (known, recorded) = self.known_wallet().await?;

        let creation = self.contracts.create_wallet_if_needed(known).await?;
        match creation {
            WalletCreation::Created(wallet) if explicit.is_some() => slog::error!(
                self.logger,
                "Created a validator wallet although one was pinned by configuration";
                "created" => %wallet,
            ),
            WalletCreation::Created(wallet) => self.record(wallet)?,
            WalletCreation::Existing(wallet) => {
                if explicit.is_none() && recorded != Some(wallet) {
                    self.record(wallet)?;
                }
            }
        }
        Ok(creation)
    }

    /// The wallet this node already knows, owner-checked, and the recorded one.
    ///
    /// A pinned address wins and the record is not read.
    async fn known_wallet(&self) -> Result<(Option<Address>, Option<Address>), NodeError> {
        let recorded = match self.settings.explicit_address {
            Some(_) => None,
            None => ChainWalletState::load(&self.settings.state_file)?.validator_wallet,
        };
        let known = self.settings.explicit_address.or(recorded);
        if let Some(wallet) = known {
            self.validate_owner(wallet).await?;
        }
        Ok((known, recorded))
    }

    async fn validate_owner(&self, wallet: Address) -> Result<(), NodeError> {
        let owner = self.contracts.owner(wallet).await?;
        if owner != self.signer.address {
            return Err(NodeError::WalletOwnerMismatch {
                wallet,
                owner,
                signer: self.signer.address,
            });
        }
        Ok(())
    }

    fn record(&self, wallet: Address) -> Result<(), NodeError> {
        ChainWalletState {
            validator_wallet: Some(wallet),
        }
        .persist(&self.settings.state_file)?;
        slog::info!(
            self.logger,
            "Recorded validator wallet";
            "wallet" => %wallet,
            "path" => %self.settings.state_file.display(),
        );
        Ok(())
    }
}
