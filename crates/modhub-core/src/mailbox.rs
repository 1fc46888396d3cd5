//! Bounded FIFO mailbox with drop-oldest backpressure.
//!
//! Each recipient module owns one `Mailbox`. Pushing into a full mailbox
//! evicts the oldest pending message before appending, so memory stays
//! bounded and the remaining entries keep their FIFO order. Eviction is a
//! warning, never an error for the sender.
//!
//! The mailbox also carries the wake-up signal its dispatcher waits on.
//! `tokio::sync::Notify` stores a permit when nobody is waiting, so a push
//! that races the dispatcher's emptiness check is never lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use modhub_types::message::Message;
use tokio::sync::Notify;
use tracing::warn;

/// Bounded, ordered queue of pending messages for one module id.
#[derive(Debug)]
pub struct Mailbox {
    owner: String,
    capacity: usize,
    queue: Mutex<VecDeque<Message>>,
    evicted: AtomicUsize,
    ready: Notify,
}

impl Mailbox {
    /// Create an empty mailbox for `owner`. A capacity of zero is raised to one.
    pub fn new(owner: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            owner: owner.into(),
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            evicted: AtomicUsize::new(0),
            ready: Notify::new(),
        }
    }

    /// Append `message` to the tail, evicting the head first when full.
    ///
    /// Returns the evicted message, if any, and wakes the dispatcher.
    pub fn push(&self, message: Message) -> Option<Message> {
        let (evicted, queue_len) = {
            let mut queue = self.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(message);
            (evicted, queue.len())
        };

        if let Some(dropped) = &evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            warn!(
                module_id = %self.owner,
                capacity = self.capacity,
                queue_len,
                dropped_id = %dropped.id,
                dropped_from = %dropped.from,
                "mailbox full, dropped oldest message"
            );
        }

        self.ready.notify_one();
        evicted
    }

    /// Remove and return the head, or `None` if the mailbox is empty.
    pub fn pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// Current number of pending messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no pending messages.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total messages evicted by drop-oldest backpressure so far.
    pub fn evicted(&self) -> usize {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Maximum number of pending messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Module id this mailbox belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Drop every pending message, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Cloned snapshot of the pending messages, head first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().iter().cloned().collect()
    }

    /// Wake the dispatcher without pushing (e.g. after a handler registers).
    pub fn wake(&self) {
        self.ready.notify_one();
    }

    /// Wait until the mailbox is pushed to or explicitly woken.
    ///
    /// Wake-ups may be spurious; callers re-check their state afterwards.
    pub async fn ready(&self) {
        self.ready.notified().await;
    }

    // Lock poisoning only means another thread panicked mid-push/pop; the
    // deque itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
