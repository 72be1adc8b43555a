//! Process entry helpers shared by the binary and by embedders that supply a
//! concrete [`NodeBackend`].

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use slog::{Drain, Logger, o};

use crate::config::{NodeConfig, RoleConfig};
use crate::error::{ConfigError, NodeError};
use crate::services::NodeBackend;
use crate::shutdown::Subsystem;
use crate::supervisor::{NodeSupervisor, StartupPlan};
use crate::wallet::ChainWalletState;

/// How the process ends.
#[derive(Debug, PartialEq, Eq)]
pub enum NodeExit {
    /// Ran and stopped on a clean signal.
    Completed(Subsystem),
    /// Configuration was unusable. Nothing ran.
    UsageShown,
    /// Deliberate stop with a message for the operator.
    Notice(String),
    /// Ran and failed.
    Failed(String),
}

impl NodeExit {
    pub fn code(&self) -> u8 {
        match self {
            NodeExit::Completed(_) | NodeExit::UsageShown | NodeExit::Notice(_) => 0,
            NodeExit::Failed(_) => 1,
        }
    }
}

impl From<NodeExit> for ExitCode {
    fn from(exit: NodeExit) -> Self {
        ExitCode::from(exit.code())
    }
}

pub fn create_logger(level: &str) -> Logger {
    use slog::Level;
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

pub fn print_sample_usage() {
    println!();
    println!("Sample usage:                  rollup-node check --config <file>");
    println!("          or:  forwarder node: [node] type = \"forwarder\" with [node.forwarder] target = <upstream RPC>");
    println!("          or: aggregator node: [node] type = \"aggregator\" with [node.aggregator] inbox_address = <address>");
    println!("          or:       sequencer: [node] type = \"sequencer\" [node.sequencer.lockout] redis = <url>, self_rpc_url = <url>");
    println!("          or:       validator: [node] type = \"validator\" with [validator] strategy, utils_address, wallet_factory_address");
    println!();
    println!("Every key can be overridden from the environment, e.g. ROLLUP_NODE_NODE__CHAIN_ID=42161");
    println!();
}

fn usage_for(err: &ConfigError) -> NodeExit {
    print_sample_usage();
    println!("{err}");
    NodeExit::UsageShown
}

/// Map a supervisor result to the process outcome.
pub fn exit_for(result: Result<Subsystem, NodeError>, logger: &Logger) -> NodeExit {
    match result {
        Ok(origin) => NodeExit::Completed(origin),
        Err(NodeError::Config(e)) => usage_for(&e),
        Err(e) if e.is_expected_termination() => {
            println!("\nNotice: {e}\n");
            NodeExit::Notice(e.to_string())
        }
        Err(e) => {
            slog::error!(logger, "Error running node"; "error" => %e);
            println!("\nNotice: {e}\n");
            NodeExit::Failed(e.to_string())
        }
    }
}

/// Load configuration, run the node on `backend`, and map the outcome.
///
/// An operator interrupt cancels the supervisor's scope.
pub async fn launch<B: NodeBackend>(config_path: &Path, backend: Arc<B>, logger: Logger) -> NodeExit {
    slog::info!(logger, "Loading configuration"; "path" => %config_path.display());

    let supervisor = match NodeConfig::from_path(config_path)
        .and_then(|config| NodeSupervisor::from_config(&config, backend, logger.clone()))
    {
        Ok(supervisor) => supervisor,
        Err(e) => return usage_for(&e),
    };

    let cancel = supervisor.cancellation();
    let interrupt_logger = logger.clone();
    let interrupt = tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    slog::info!(interrupt_logger, "Interrupt received, shutting down");
                    cancel.cancel();
                }
                Err(e) => {
                    slog::warn!(interrupt_logger, "Failed to listen for interrupts"; "error" => %e);
                    cancel.cancelled().await;
                }
            },
        }
    });

    let result = supervisor.run().await;
    interrupt.abort();
    exit_for(result, &logger)
}

/// Validate configuration and print the startup plan.
pub fn check(config_path: &Path) -> NodeExit {
    match NodeConfig::from_path(config_path).and_then(|config| config.validate()) {
        Ok(config) => {
            print!("{}", StartupPlan::from_config(&config));
            NodeExit::Completed(Subsystem::External)
        }
        Err(e) => usage_for(&e),
    }
}

/// Print the persisted validator wallet record.
pub fn wallet_state(config_path: &Path) -> NodeExit {
    let config = match NodeConfig::from_path(config_path).and_then(|config| config.validate()) {
        Ok(config) => config,
        Err(e) => return usage_for(&e),
    };
    let RoleConfig::Validator(validator) = &config.role else {
        return NodeExit::Notice(format!(
            "wallet state is only kept for validator nodes, this node is a {}",
            config.node_role()
        ));
    };

    let path = &validator.wallet.state_file;
    match ChainWalletState::load(path) {
        Ok(state) => {
            match state.validator_wallet {
                Some(wallet) => println!("{}: validator wallet {wallet}", path.display()),
                None => println!("{}: no validator wallet recorded", path.display()),
            }
            if let Some(pinned) = validator.wallet.explicit_address {
                println!("configuration pins validator wallet {pinned} for this node");
            }
            NodeExit::Completed(Subsystem::External)
        }
        Err(e) => NodeExit::Failed(e.to_string()),
    }
}
