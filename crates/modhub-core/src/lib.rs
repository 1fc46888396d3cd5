//! In-process message hub for independently loaded modules.
//!
//! Modules exchange opaque `(content_type, body)` messages by module id
//! without holding references to each other:
//! - `handler` -- `MessageHandler` trait, `BoxMessageHandler`, `handler_fn`
//! - `registry` -- module id to current handler
//! - `mailbox` -- bounded FIFO with drop-oldest backpressure
//! - `dispatcher` -- one task per module id draining its mailbox
//! - `hub` -- `Hub` facade: register, unregister, notify

pub mod dispatcher;
pub mod handler;
pub mod hub;
pub mod mailbox;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use handler::{BoxMessageHandler, MessageHandler, handler_fn};
pub use hub::{Hub, HubStats};
pub use mailbox::Mailbox;
pub use registry::Registry;
