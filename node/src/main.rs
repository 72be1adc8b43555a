//! Rollup node operator tool.
//!
//! # Usage
//!
//! Validate a configuration and print what the node would start:
//! ```bash
//! cargo run --package rollup-node -- check --config node.toml
//! ```
//!
//! Inspect the persisted validator wallet record:
//! ```bash
//! cargo run --package rollup-node -- wallet-state --config node.toml
//! ```
//!
//! Running the node itself requires a concrete collaborator backend, which is
//! linked in by the embedding binary through [`rollup_node::cli::launch`].

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use rollup_node::cli::{self, create_logger};

#[derive(Parser, Debug)]
#[command(name = "rollup-node")]
#[command(about = "Lifecycle supervisor for a rollup node")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate configuration and print the startup plan
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the persisted validator wallet record
    WalletState {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let logger = create_logger(&args.log_level);

    let exit = match args.command {
        Command::Check { config } => {
            slog::info!(logger, "Checking configuration"; "path" => %config.display());
            cli::check(&config)
        }
        Command::WalletState { config } => cli::wallet_state(&config),
    };
    slog::debug!(logger, "Exiting"; "outcome" => ?exit);
    exit.into()
}
