//! Message envelope exchanged between modules through the hub.
//!
//! A `Message` carries an opaque `(content_type, body)` pair from one module
//! to another. The hub never inspects either field; it only records who sent
//! the message and when it was enqueued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message waiting in (or taken from) a recipient's mailbox.
///
/// Messages are immutable once enqueued: the hub hands out owned clones of
/// the fields to handlers and never mutates the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// UUIDv7 message ID (time-sortable, used for log correlation).
    pub id: Uuid,
    /// Module id of the sender.
    pub from: String,
    /// Caller-defined content type tag (e.g. "text", "application/json").
    pub content_type: String,
    /// Opaque message body.
    pub body: String,
    /// When the message was accepted by the hub.
    pub enqueued_at: DateTime<Utc>,
}

impl Message {
    /// Build a new message stamped with a fresh id and the current time.
    pub fn new(
        from: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            from: from.into(),
            content_type: content_type.into(),
            body: body.into(),
            enqueued_at: Utc::now(),
        }
    }
}
