//! Observability setup for modhub hosts.

pub mod tracing_setup;
