//! modhub host entry point.
//!
//! Binary name: `modhub`
//!
//! Parses CLI arguments, sets up tracing, loads the hub configuration and
//! dispatches to the requested command. Each command constructs exactly one
//! `Hub` and hands it to the modules it drives.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::HostState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,modhub_core=debug",
        _ => "trace",
    };
    modhub_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing: {e}"))?;

    let state = HostState::init(cli.data_dir.clone()).await?;

    let result = match cli.command {
        Commands::Config => cli::config::show_config(&state, cli.json),
        Commands::Relay {
            modules,
            messages,
            fail,
            queue_size,
            timeout_ms,
        } => {
            let options = cli::relay::RelayOptions {
                modules,
                messages,
                fail,
                queue_size,
                timeout_ms,
            };
            cli::relay::relay(&state, options, cli.json).await
        }
        Commands::Overflow {
            messages,
            queue_size,
        } => cli::overflow::overflow(&state, messages, queue_size, cli.json).await,
    };

    modhub_observe::tracing_setup::shutdown_tracing();
    result
}
