use thiserror::Error;

/// Errors a message handler reports back to its dispatcher.
///
/// A handler error never reaches the sender of the message: the dispatcher
/// logs it, drops the offending message and moves on to the next one.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("unsupported content type '{content_type}'")]
    Rejected { content_type: String },

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Convenience constructor for the common `Failed` case.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Errors surfaced at the hub boundary.
///
/// These are host misuse errors; message delivery outcomes are never
/// reported through this type.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("no async runtime available to run dispatchers")]
    NoRuntime,

    #[error("invalid hub configuration: {0}")]
    InvalidConfig(String),
}
