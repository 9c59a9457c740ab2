// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coldflow - cold-email send scheduler.
//!
//! This is the binary entry point for the coldflow daemon and its
//! operator commands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod enqueue;
mod serve;
mod status;

/// Coldflow - cold-email send scheduler with account rotation.
#[derive(Parser, Debug)]
#[command(name = "coldflow", version, about, long_about = None)]
struct Cli {
    /// Path to a specific config file (defaults to the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the send scheduler daemon.
    Serve,
    /// Show per-account capacity and queue depth.
    Status,
    /// Enqueue a send request from a TOML file (producer seam).
    Enqueue {
        /// Request file.
        file: PathBuf,
    },
    /// Pull an account out of rotation.
    Block {
        /// Account id.
        account: String,
        /// Reason recorded with the block.
        #[arg(long, default_value = "manual block")]
        reason: String,
    },
    /// Return an account to rotation.
    Unblock {
        /// Account id.
        account: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => coldflow_config::load_and_validate_path(path),
        None => coldflow_config::load_and_validate(),
    };
    let config = match config {
        Ok(config) => config,
        Err(errors) => {
            coldflow_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status) => status::run_status(config).await,
        Some(Commands::Enqueue { file }) => enqueue::run_enqueue(config, &file).await,
        Some(Commands::Block { account, reason }) => {
            status::run_block(config, &account, &reason).await
        }
        Some(Commands::Unblock { account }) => status::run_unblock(config, &account).await,
        None => {
            println!("coldflow: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("coldflow: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        super::Cli::command().debug_assert();
    }

    #[test]
    fn binary_loads_config_defaults() {
        // Default config (no file) is valid; serve later rejects the empty
        // account list with a clearer message.
        let config = coldflow_config::load_and_validate_str("").expect("defaults valid");
        assert!(config.accounts.is_empty());
    }
}
