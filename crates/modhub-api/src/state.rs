//! Host state shared by all commands.
//!
//! `HostState` holds the resolved data directory and the loaded hub
//! configuration. Commands call [`HostState::build_hub`] to get the single
//! hub instance they hand to their modules.

use std::path::PathBuf;
use std::sync::Arc;

use modhub_core::Hub;
use modhub_infra::config::{load_hub_config, resolve_queue_size};
use modhub_infra::filesystem::resolve_data_dir;
use modhub_types::config::HubConfig;

#[derive(Debug, Clone)]
pub struct HostState {
    pub data_dir: PathBuf,
    pub config: HubConfig,
}

impl HostState {
    /// Resolve the data directory (explicit flag wins) and load `config.toml`.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_hub_config(&data_dir).await;
        tracing::debug!(data_dir = %data_dir.display(), ?config, "host state initialised");
        Ok(Self { data_dir, config })
    }

    /// Effective configuration after applying a queue size override.
    pub fn effective_config(&self, queue_size: Option<usize>) -> HubConfig {
        HubConfig {
            max_queue_size: resolve_queue_size(&self.config, queue_size),
            ..self.config.clone()
        }
    }

    /// Construct and activate the hub for this run.
    pub fn build_hub(&self, queue_size: Option<usize>) -> anyhow::Result<Arc<Hub>> {
        let hub = Arc::new(Hub::new(self.effective_config(queue_size))?);
        hub.activate();
        Ok(hub)
    }
}
