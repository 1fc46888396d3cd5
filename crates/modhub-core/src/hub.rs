//! The hub: module registration, fire-and-forget delivery, and per-module
//! dispatcher lifecycle.
//!
//! The host constructs one `Hub` (usually behind an `Arc`) and hands it to
//! every module that needs to talk to another. Modules never reference each
//! other directly; they address messages by module id.
//!
//! Every module id the hub has seen maps to an endpoint holding its mailbox
//! and its dispatcher. Endpoints are created through the `DashMap` entry API,
//! so a `register_client` racing a `notify` for an unknown id still yields
//! exactly one mailbox and one dispatcher. Registry changes happen while the
//! id's endpoint entry is held, which keeps register and unregister of the
//! same id serialized. Lock order is always endpoints, then registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use modhub_types::config::HubConfig;
use modhub_types::error::HubError;
use modhub_types::message::Message;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::handler::{BoxMessageHandler, MessageHandler};
use crate::mailbox::Mailbox;
use crate::registry::Registry;

/// Mailbox and dispatcher for one module id.
#[derive(Debug)]
struct Endpoint {
    mailbox: Arc<Mailbox>,
    dispatcher: Dispatcher,
}

/// Point-in-time view of the hub for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Number of module ids with a registered handler.
    pub registered: usize,
    /// Number of running dispatchers (one per known module id).
    pub active_dispatchers: usize,
    /// Pending message count per module id.
    pub queued: BTreeMap<String, usize>,
    /// Messages evicted by drop-oldest backpressure, per module id.
    pub evicted: BTreeMap<String, usize>,
}

/// In-process message hub.
pub struct Hub {
    config: HubConfig,
    registry: Arc<Registry>,
    endpoints: DashMap<String, Endpoint>,
    runtime: Handle,
    shutdown: CancellationToken,
    activated: AtomicBool,
}

impl Hub {
    /// Create a hub whose dispatchers run on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`HubError::NoRuntime`] when called outside a runtime, or
    /// [`HubError::InvalidConfig`] for a zero-sized mailbox.
    pub fn new(config: HubConfig) -> Result<Self, HubError> {
        let runtime = Handle::try_current().map_err(|_| HubError::NoRuntime)?;
        Self::with_runtime(config, runtime)
    }

    /// Create a hub whose dispatchers are spawned on `runtime`.
    ///
    /// Useful when hub operations are invoked from threads that are not
    /// themselves inside the runtime.
    pub fn with_runtime(config: HubConfig, runtime: Handle) -> Result<Self, HubError> {
        if config.max_queue_size == 0 {
            return Err(HubError::InvalidConfig(
                "max_queue_size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            config,
            registry: Arc::new(Registry::new()),
            endpoints: DashMap::new(),
            runtime,
            shutdown: CancellationToken::new(),
            activated: AtomicBool::new(false),
        })
    }

    /// Host enable hook. Logs the hub's current state; safe to call repeatedly.
    pub fn activate(&self) {
        let first = !self.activated.swap(true, Ordering::SeqCst);
        info!(
            first,
            registered = self.registry.len(),
            active_dispatchers = self.endpoints.len(),
            max_queue_size = self.config.max_queue_size,
            "hub activated"
        );
    }

    /// Whether [`activate`](Self::activate) has been called.
    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    /// Register (or replace) the handler for `module_id`.
    ///
    /// Ensures a mailbox and exactly one dispatcher exist for the id. Messages
    /// queued before registration are delivered in order. When replacing a
    /// handler, an invocation already in flight finishes with the old one.
    pub fn register_client<H>(&self, module_id: impl Into<String>, handler: H)
    where
        H: MessageHandler + 'static,
    {
        self.register_boxed(module_id, BoxMessageHandler::new(handler));
    }

    /// Register an already type-erased handler.
    pub fn register_boxed(&self, module_id: impl Into<String>, handler: BoxMessageHandler) {
        let module_id = module_id.into();
        if self.is_shut_down() {
            warn!(module_id = %module_id, "hub is shut down, ignoring registration");
            return;
        }

        // The endpoint entry stays locked while the registry changes, so a
        // concurrent unregister of the same id is ordered before or after us.
        let endpoint = self
            .endpoints
            .entry(module_id.clone())
            .or_insert_with(|| self.open_endpoint(&module_id));
        let replaced = self.registry.set(&module_id, Arc::new(handler));
        endpoint.mailbox.wake();
        drop(endpoint);

        info!(module_id = %module_id, replaced, "client registered");
    }

    /// Unregister `module_id`: drop its handler, stop its dispatcher and
    /// discard any messages still queued for it.
    pub fn unregister_client(&self, module_id: &str) {
        let (had_handler, endpoint) = match self.endpoints.entry(module_id.to_string()) {
            Entry::Occupied(entry) => {
                let had_handler = self.registry.remove(module_id);
                (had_handler, Some(entry.remove()))
            }
            Entry::Vacant(_) => (self.registry.remove(module_id), None),
        };

        let dropped = match endpoint {
            Some(endpoint) => {
                endpoint.dispatcher.cancel();
                endpoint.mailbox.clear()
            }
            None => 0,
        };

        info!(module_id, had_handler, dropped, "client unregistered");
    }

    /// Queue a message from `from` to `to` and return once it is enqueued.
    ///
    /// Never waits for delivery. A full mailbox evicts its oldest message.
    pub async fn notify(
        &self,
        from: impl Into<String>,
        to: &str,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.post(from, to, content_type, body);
    }

    /// Synchronous form of [`notify`](Self::notify), callable from any thread.
    pub fn post(
        &self,
        from: impl Into<String>,
        to: &str,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) {
        if self.is_shut_down() {
            warn!(to, "hub is shut down, dropping message");
            return;
        }

        let message = Message::new(from, content_type, body);
        if self.config.log_message_bodies {
            debug!(
                message_id = %message.id,
                from = %message.from,
                to,
                content_type = %message.content_type,
                body = %message.body,
                "message enqueued"
            );
        } else {
            debug!(
                message_id = %message.id,
                from = %message.from,
                to,
                content_type = %message.content_type,
                "message enqueued"
            );
        }

        self.endpoint(to).push(message);
    }

    /// Ids that currently have a registered handler, sorted.
    pub fn list_registered_ids(&self) -> Vec<String> {
        let mut ids = self.registry.ids();
        ids.sort();
        ids
    }

    /// Whether `module_id` currently has a registered handler.
    pub fn is_registered(&self, module_id: &str) -> bool {
        self.registry.contains(module_id)
    }

    /// Pending message count for `module_id` (zero for unknown ids).
    pub fn queue_len(&self, module_id: &str) -> usize {
        self.endpoints
            .get(module_id)
            .map(|e| e.mailbox.len())
            .unwrap_or(0)
    }

    /// Messages evicted from `module_id`'s current mailbox so far.
    pub fn evicted_count(&self, module_id: &str) -> usize {
        self.endpoints
            .get(module_id)
            .map(|e| e.mailbox.evicted())
            .unwrap_or(0)
    }

    /// Cloned snapshot of the messages still queued for `module_id`, oldest first.
    pub fn pending_messages(&self, module_id: &str) -> Vec<Message> {
        self.endpoints
            .get(module_id)
            .map(|e| e.mailbox.snapshot())
            .unwrap_or_default()
    }

    /// Number of running dispatchers.
    pub fn active_dispatchers(&self) -> usize {
        self.endpoints.len()
    }

    /// Snapshot of registration and queue state.
    pub fn stats(&self) -> HubStats {
        let mut queued = BTreeMap::new();
        let mut evicted = BTreeMap::new();
        for endpoint in self.endpoints.iter() {
            queued.insert(endpoint.key().clone(), endpoint.mailbox.len());
            evicted.insert(endpoint.key().clone(), endpoint.mailbox.evicted());
        }
        HubStats {
            registered: self.registry.len(),
            active_dispatchers: self.endpoints.len(),
            queued,
            evicted,
        }
    }

    /// The configuration this hub was built with.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Stop every dispatcher and drop all registrations and queued messages.
    ///
    /// Intended for host teardown. Later registrations and notifications are
    /// ignored.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let endpoints = self.endpoints.len();
        self.endpoints.clear();
        self.registry.clear();
        info!(endpoints, "hub shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Get or atomically create the endpoint for `module_id`, returning its
    /// mailbox.
    fn endpoint(&self, module_id: &str) -> Arc<Mailbox> {
        if let Some(endpoint) = self.endpoints.get(module_id) {
            return Arc::clone(&endpoint.mailbox);
        }

        let endpoint = self
            .endpoints
            .entry(module_id.to_string())
            .or_insert_with(|| self.open_endpoint(module_id));
        Arc::clone(&endpoint.mailbox)
    }

    fn open_endpoint(&self, module_id: &str) -> Endpoint {
        info!(module_id, "starting message processing");
        let mailbox = Arc::new(Mailbox::new(module_id, self.config.max_queue_size));
        let dispatcher = Dispatcher::spawn(
            &self.runtime,
            module_id,
            Arc::clone(&mailbox),
            Arc::clone(&self.registry),
            self.shutdown.child_token(),
            self.config.log_message_bodies,
        );
        Endpoint {
            mailbox,
            dispatcher,
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("registered", &self.registry.len())
            .field("active_dispatchers", &self.endpoints.len())
            .field("max_queue_size", &self.config.max_queue_size)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
