//! Hub configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.modhub/` in production)
//! and deserializes it into [`HubConfig`]. Falls back to defaults when the
//! file is missing or malformed, so a bad config never keeps the host from
//! starting a hub.

use std::path::Path;

use modhub_types::config::HubConfig;

/// Smallest mailbox capacity the host will configure.
const MIN_QUEUE_SIZE: usize = 1;

/// Load hub configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`HubConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and
///   returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_hub_config(data_dir: &Path) -> HubConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return HubConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return HubConfig::default();
        }
    };

    match toml::from_str::<HubConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            HubConfig::default()
        }
    }
}

/// Resolve the mailbox capacity.
///
/// Priority:
/// 1. Command-line override
/// 2. `max_queue_size` from `config.toml`
///
/// A floor of one message is enforced regardless of source.
pub fn resolve_queue_size(config: &HubConfig, cli_override: Option<usize>) -> usize {
    cli_override
        .unwrap_or(config.max_queue_size)
        .max(MIN_QUEUE_SIZE)
}
