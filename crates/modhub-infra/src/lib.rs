//! Infrastructure layer for modhub.
//!
//! Host-side adapters that sit outside the hub engine: data directory
//! resolution and `config.toml` loading.

pub mod config;
pub mod filesystem;
