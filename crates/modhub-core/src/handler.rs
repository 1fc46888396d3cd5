//! Message handler trait and its type-erased wrapper.
//!
//! Follows the same blanket-impl pattern used for other async traits that
//! must be stored behind dynamic dispatch:
//! 1. `MessageHandler` uses native async fn in traits (RPITIT)
//! 2. An object-safe `MessageHandlerDyn` with boxed futures is blanket-impl'd
//!    for every `T: MessageHandler`
//! 3. `BoxMessageHandler` wraps `Box<dyn MessageHandlerDyn>` and delegates
//!
//! Closures can be registered through [`handler_fn`].

use std::future::Future;
use std::pin::Pin;

use modhub_types::error::HandlerError;

/// Boxed handler future returned by [`MessageHandlerDyn::handle_boxed`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// Trait implemented by modules that want to receive messages.
///
/// The dispatcher for a module awaits each invocation before popping the
/// next message, so an implementation is never called concurrently for the
/// same module id.
pub trait MessageHandler: Send + Sync {
    /// Handle one message sent by `from`.
    ///
    /// Returning an error drops the message; it is not retried.
    fn handle(
        &self,
        from: &str,
        content_type: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// Object-safe version of [`MessageHandler`] with boxed futures.
pub trait MessageHandlerDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        from: &'a str,
        content_type: &'a str,
        body: &'a str,
    ) -> HandlerFuture<'a>;
}

impl<T: MessageHandler> MessageHandlerDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        from: &'a str,
        content_type: &'a str,
        body: &'a str,
    ) -> HandlerFuture<'a> {
        Box::pin(self.handle(from, content_type, body))
    }
}

/// Type-erased message handler as stored in the registry.
pub struct BoxMessageHandler {
    inner: Box<dyn MessageHandlerDyn>,
}

impl BoxMessageHandler {
    /// Wrap a concrete handler.
    pub fn new<T: MessageHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    /// Invoke the wrapped handler.
    pub async fn handle(
        &self,
        from: &str,
        content_type: &str,
        body: &str,
    ) -> Result<(), HandlerError> {
        self.inner.handle_boxed(from, content_type, body).await
    }
}

impl std::fmt::Debug for BoxMessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxMessageHandler").finish_non_exhaustive()
    }
}

/// Handler backed by a closure returning a future.
///
/// Built with [`handler_fn`]. The closure receives owned copies of
/// `(from, content_type, body)` so the returned future can be `'static`.
pub struct FnHandler<F> {
    f: F,
}

/// Adapt a closure into a [`MessageHandler`].
///
/// ```no_run
/// use modhub_core::handler::handler_fn;
///
/// let handler = handler_fn(|from, content_type, body| async move {
///     println!("{from} sent {content_type}: {body}");
///     Ok::<_, modhub_types::error::HandlerError>(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(String, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { f }
}

impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(String, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn handle(
        &self,
        from: &str,
        content_type: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        (self.f)(from.to_owned(), content_type.to_owned(), body.to_owned())
    }
}
