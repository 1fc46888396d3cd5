//! Resolved configuration display.

use anyhow::Result;
use console::style;

use crate::state::HostState;

/// Print the data directory and the hub configuration in effect.
pub fn show_config(state: &HostState, json: bool) -> Result<()> {
    let config_path = state.data_dir.join("config.toml");
    let config_file_present = config_path.is_file();

    if json {
        let out = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "config_file": config_path.display().to_string(),
            "config_file_present": config_file_present,
            "hub": &state.config,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} modhub v{}", style("◆").bold(), env!("CARGO_PKG_VERSION"));
    println!();
    println!("  {}", style("── Files ──").dim());
    println!("  Data dir:    {}", style(state.data_dir.display()).dim());
    let marker = if config_file_present {
        style("present").green()
    } else {
        style("absent, using defaults").yellow()
    };
    println!("  Config file: {} ({marker})", style(config_path.display()).dim());
    println!();
    println!("  {}", style("── Hub ──").dim());
    println!(
        "  Max queue size:     {}",
        style(state.config.max_queue_size).bold()
    );
    println!(
        "  Log message bodies: {}",
        state.config.log_message_bodies
    );
    println!();

    Ok(())
}
