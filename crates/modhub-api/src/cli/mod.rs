//! CLI command definitions and dispatch for the `modhub` binary.
//!
//! Every command builds one hub, wires demo modules to it and reports what
//! the hub did with the traffic.

pub mod config;
pub mod overflow;
pub mod relay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive an in-process module message hub.
#[derive(Parser)]
#[command(name = "modhub", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for hub debug logs, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Directory holding `config.toml` (defaults to $MODHUB_DATA_DIR or ~/.modhub).
    #[arg(long, global = true, env = "MODHUB_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the resolved hub configuration.
    Config,

    /// Send pings round-robin to echo modules and tally the replies.
    Relay {
        /// Comma-separated module ids to register.
        #[arg(long, value_delimiter = ',', default_value = "alpha,beta,gamma")]
        modules: Vec<String>,

        /// Number of pings to send.
        #[arg(long, short = 'n', default_value_t = 30)]
        messages: usize,

        /// Module id whose handler rejects every message.
        #[arg(long)]
        fail: Option<String>,

        /// Override `max_queue_size` for this run.
        #[arg(long)]
        queue_size: Option<usize>,

        /// How long to wait for all traffic to drain.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },

    /// Flood an unregistered module and show what the mailbox kept.
    Overflow {
        /// Number of messages to send before the module registers.
        #[arg(long, short = 'n', default_value_t = 250)]
        messages: usize,

        /// Override `max_queue_size` for this run.
        #[arg(long)]
        queue_size: Option<usize>,
    },
}
