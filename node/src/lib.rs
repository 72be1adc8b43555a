//! Rollup node lifecycle supervisor.
//!
//! This crate decides, from configuration, which role a rollup node plays and
//! brings up the subsystems that role needs in dependency order:
//!
//! - **Configuration**: Role resolution and validation before anything starts
//! - **Retry**: Startup steps retried until they succeed or fail fatally
//! - **Watchdog**: Local transaction index compared against an upstream node
//! - **Wallet**: Validator contract-wallet resolution and creation
//! - **Lockout**: Leader election gating the sequencer's submission path
//! - **Shutdown**: First-signal-wins termination across all subsystems
//!
//! The ledger engine, inbox ingestion, batchers, API server and validating
//! driver are collaborators behind the [`services::NodeBackend`] trait.
//!
//! ## Quick Start
//!
//! ```ignore
//! use rollup_node::{NodeConfig, NodeSupervisor};
//!
//! let config = NodeConfig::from_path("node.toml")?;
//! let supervisor = NodeSupervisor::from_config(&config, backend, logger)?;
//!
//! // Cancel the scope to stop the node from elsewhere.
//! let cancel = supervisor.cancellation();
//!
//! match supervisor.run().await {
//!     Ok(origin) => println!("stopped by {origin}"),
//!     Err(e) if e.is_expected_termination() => println!("{e}"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```
//!
//! See the [`supervisor`] module documentation for the startup order.

pub mod cli;
pub mod config;
pub mod error;
pub mod lockout;
pub mod maintenance;
pub mod retry;
pub mod services;
pub mod shutdown;
pub mod submission;
pub mod supervisor;
pub mod types;
pub mod wallet;
pub mod watchdog;

// Re-export main types at crate root
pub use config::{NodeConfig, NodeRole, RoleConfig, ValidatedConfig};
pub use error::{ConfigError, NodeError};
pub use services::NodeBackend;
pub use shutdown::{ShutdownAggregator, Subsystem};
pub use supervisor::{NodeSupervisor, StartupPlan, SupervisorStage};
