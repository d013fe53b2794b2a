//! ClusterLens CLI (lensctl)
//!
//! Command-line inspector for cluster metadata captures.
//!
//! ## Overview
//!
//! `lensctl` replays a capture (raw group-log and transaction-log records,
//! coordination-tree events and an optional admin snapshot) through the
//! metadata caches, then answers questions about the result:
//! - **Consumer groups**: members, committed offsets, commit rates
//! - **Transactions**: commit and abort counters, execution times, history
//! - **Topics**: partition assignment, leadership, configuration
//! - **Metrics**: what the caches counted while replaying
//!
//! ## Quick Start
//!
//! ```bash
//! export CLUSTERLENS_CAPTURE=./cluster.jsonl
//!
//! lensctl groups list --topic orders
//! lensctl groups rates analytics
//! lensctl transactions get payments-writer
//! lensctl topics partitions orders --output json
//! lensctl metrics
//! ```
//!
//! ## Configuration
//!
//! Settings come from a TOML file (`--config`, default
//! `~/.clusterlens/config.toml`) with `[time_series]`, `[transactions]` and
//! `[output]` sections. Command-line flags override the `[output]` section.
//! Logs go to stderr and honor `RUST_LOG`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod capture;
mod commands;
mod config;
mod format;

use commands::{GroupCommands, Lens, TopicCommands, TransactionCommands};
use config::{Config, OutputFormat};
use format::Formatter;

#[derive(Parser)]
#[command(name = "lensctl")]
#[command(about = "ClusterLens metadata inspector", long_about = None)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, env = "CLUSTERLENS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Capture file (JSON lines)
    #[arg(long, env = "CLUSTERLENS_CAPTURE", global = true)]
    capture: Option<PathBuf>,

    /// Output format, overrides the config file
    #[arg(short, long, env = "CLUSTERLENS_OUTPUT", value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consumer group commands
    Groups {
        #[command(subcommand)]
        command: GroupCommands,
    },
    /// Transaction commands
    Transactions {
        #[command(subcommand)]
        command: TransactionCommands,
    },
    /// Topic commands
    Topics {
        #[command(subcommand)]
        command: TopicCommands,
    },
    /// Replay the capture and print the collected metrics
    Metrics,
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    clusterlens_observability::init("info");

    let config = Config::load(cli.config.as_deref())?;
    let out = Formatter::new(
        cli.output.unwrap_or(config.output.format),
        config.output.colored && !cli.no_color,
    );

    if let Commands::Config = cli.command {
        print!(
            "{}",
            toml::to_string_pretty(&config).context("Failed to render config")?
        );
        return Ok(());
    }

    let capture = cli
        .capture
        .context("No capture given; pass --capture or set CLUSTERLENS_CAPTURE")?;
    let lens = Lens::open(&config.lens, &capture)?;

    match cli.command {
        Commands::Groups { command } => {
            commands::groups::handle_group_command(command, &lens, &out)
        }
        Commands::Transactions { command } => {
            commands::transactions::handle_transaction_command(command, &lens, &out)
        }
        Commands::Topics { command } => {
            commands::topics::handle_topic_command(command, &lens, &out)
        }
        Commands::Metrics => {
            print!("{}", clusterlens_observability::gather_text());
            Ok(())
        }
        Commands::Config => Ok(()),
    }
}
