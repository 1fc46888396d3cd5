//! Data directory resolution.

use std::path::PathBuf;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "MODHUB_DATA_DIR";

/// Resolve the modhub data directory.
///
/// Priority: `MODHUB_DATA_DIR`, then `~/.modhub`, then `./.modhub`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    // Use home directory fallback: ~/.modhub
    if let Some(home) = dirs::home_dir() {
        return home.join(".modhub");
    }

    // Last resort: current directory
    PathBuf::from(".modhub")
}
