//! Shared domain types for modhub.
//!
//! This crate contains the types shared between the hub engine, the
//! infrastructure adapters and the host binary: the `Message` envelope,
//! `HubConfig`, and the error enums.
//!
//! Zero runtime dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod message;
