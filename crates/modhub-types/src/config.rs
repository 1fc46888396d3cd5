//! Hub configuration types.
//!
//! `HubConfig` represents the `config.toml` read by the host before it
//! constructs the hub. All fields have defaults, so an empty file (or no
//! file at all) yields a working hub.

use serde::{Deserialize, Serialize};

/// Default mailbox capacity per recipient.
pub const MAX_QUEUE_SIZE: usize = 200;

/// Top-level configuration for a hub instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Maximum number of pending messages per recipient mailbox.
    ///
    /// When a push would exceed this, the oldest pending message is evicted.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Include message bodies in debug-level enqueue/delivery events.
    #[serde(default)]
    pub log_message_bodies: bool,
}

fn default_max_queue_size() -> usize {
    MAX_QUEUE_SIZE
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            log_message_bodies: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_config_default_values() {
        let config = HubConfig::default();
        assert_eq!(config.max_queue_size, 200);
        assert!(!config.log_message_bodies);
    }

    #[test]
    fn test_hub_config_deserialize_with_defaults() {
        let config: HubConfig = toml::from_str("").unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn test_hub_config_deserialize_with_values() {
        let toml_str = r#"
max_queue_size = 16
log_message_bodies = true
"#;
        let config: HubConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_queue_size, 16);
        assert!(config.log_message_bodies);
    }

    #[test]
    fn test_hub_config_rejects_negative_queue_size() {
        let result = toml::from_str::<HubConfig>("max_queue_size = -1");
        assert!(result.is_err());
    }
}
