//! Module id to handler registry.
//!
//! The registry is the source of truth for "is anyone listening" on a module
//! id. It is backed by `DashMap`; lookups hand out a cloned `Arc` so no
//! `DashMap` guard is ever held across an `.await` in the dispatcher.

use std::sync::Arc;

use dashmap::DashMap;

use crate::handler::BoxMessageHandler;

/// Handler handle as stored in, and returned from, the registry.
pub type SharedHandler = Arc<BoxMessageHandler>;

/// Concurrent map from module id to its currently registered handler.
#[derive(Debug, Default)]
pub struct Registry {
    handlers: DashMap<String, SharedHandler>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the handler for `module_id`.
    ///
    /// Returns `true` if a previous handler was replaced. An invocation that
    /// already holds the old handler runs to completion; the next lookup
    /// returns the new one.
    pub fn set(&self, module_id: &str, handler: SharedHandler) -> bool {
        self.handlers
            .insert(module_id.to_string(), handler)
            .is_some()
    }

    /// Remove the handler for `module_id`. Returns `true` if one was present.
    pub fn remove(&self, module_id: &str) -> bool {
        self.handlers.remove(module_id).is_some()
    }

    /// Look up the current handler for `module_id` without blocking.
    pub fn get(&self, module_id: &str) -> Option<SharedHandler> {
        self.handlers.get(module_id).map(|r| Arc::clone(r.value()))
    }

    /// Whether a handler is registered for `module_id`.
    pub fn contains(&self, module_id: &str) -> bool {
        self.handlers.contains_key(module_id)
    }

    /// Snapshot of all currently registered ids, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.handlers.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.handlers.clear();
    }
}
