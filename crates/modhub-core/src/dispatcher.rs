//! Per-module dispatcher task.
//!
//! One dispatcher runs for every module id that has a registered handler or
//! pending messages. It pairs the head of the module's mailbox with the
//! handler currently in the registry, one message at a time:
//!
//! - **Idle (no handler):** messages stay queued; the task sleeps until the
//!   mailbox is pushed to or a registration wakes it, then re-checks.
//! - **Active:** pop one message, invoke the handler, await completion, repeat.
//!   An empty mailbox puts the task back to sleep.
//! - **Cancelled:** terminal. Observed at every suspension point, including
//!   mid-invocation; nothing further is delivered.
//!
//! Handler errors and panics are logged and the offending message dropped;
//! the loop keeps going.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use modhub_types::error::HandlerError;
use modhub_types::message::Message;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::handler::BoxMessageHandler;
use crate::mailbox::Mailbox;
use crate::registry::Registry;

/// Handle to a running dispatcher task.
///
/// Dropping the handle cancels the task, so discarding a dispatcher from the
/// hub's maps is enough to stop it.
#[derive(Debug)]
pub struct Dispatcher {
    module_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn a dispatcher for `module_id` on `runtime`.
    ///
    /// `cancel` is usually a child of the hub's shutdown token so that a hub
    /// teardown stops every dispatcher at once.
    pub fn spawn(
        runtime: &Handle,
        module_id: impl Into<String>,
        mailbox: Arc<Mailbox>,
        registry: Arc<Registry>,
        cancel: CancellationToken,
        log_bodies: bool,
    ) -> Self {
        let module_id = module_id.into();
        let span = info_span!("dispatcher", module_id = %module_id);
        let worker = Worker {
            module_id: module_id.clone(),
            mailbox,
            registry,
            cancel: cancel.clone(),
            log_bodies,
        };
        let task = runtime.spawn(worker.run().instrument(span));

        Self {
            module_id,
            cancel,
            task,
        }
    }

    /// Module id this dispatcher serves.
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Request cooperative cancellation. The task exits at its next
    /// suspension point without delivering further messages.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the underlying task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the spawned task.
struct Worker {
    module_id: String,
    mailbox: Arc<Mailbox>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    log_bodies: bool,
}

impl Worker {
    async fn run(self) {
        info!("message processing started");

        while !self.cancel.is_cancelled() {
            let Some(handler) = self.registry.get(&self.module_id) else {
                debug!(queue_len = self.mailbox.len(), "no handler registered, holding messages");
                if !self.wait().await {
                    break;
                }
                continue;
            };

            let Some(message) = self.mailbox.pop() else {
                if !self.wait().await {
                    break;
                }
                continue;
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(message_id = %message.id, "cancelled during delivery");
                    break;
                }
                outcome = deliver(&handler, &message) => self.report(&message, outcome),
            }
        }

        info!("message processing stopped");
    }

    /// Sleep until woken or cancelled. Returns `false` on cancellation.
    async fn wait(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.mailbox.ready() => true,
        }
    }

    fn report(&self, message: &Message, outcome: Result<(), HandlerError>) {
        match outcome {
            Ok(()) if self.log_bodies => debug!(
                message_id = %message.id,
                from = %message.from,
                body = %message.body,
                "message processed"
            ),
            Ok(()) => debug!(message_id = %message.id, from = %message.from, "message processed"),
            Err(err) => error!(
                message_id = %message.id,
                from = %message.from,
                content_type = %message.content_type,
                error = %err,
                "error processing message, dropping it"
            ),
        }
    }
}

/// Invoke `handler` with `message`, turning a panic into a `HandlerError`.
async fn deliver(handler: &BoxMessageHandler, message: &Message) -> Result<(), HandlerError> {
    let invocation = handler.handle(&message.from, &message.content_type, &message.body);
    match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::test_support::CapturedEvents;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tracing::Level;

    type Delivered = mpsc::UnboundedReceiver<(String, String, String)>;

    fn recording_handler() -> (Arc<BoxMessageHandler>, Delivered) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = handler_fn(move |from, content_type, body| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((from, content_type, body));
                Ok::<_, HandlerError>(())
            }
        });
        (Arc::new(BoxMessageHandler::new(handler)), rx)
    }

    fn setup(module_id: &str) -> (Arc<Mailbox>, Arc<Registry>, Dispatcher) {
        let mailbox = Arc::new(Mailbox::new(module_id, 16));
        let registry = Arc::new(Registry::new());
        let dispatcher = Dispatcher::spawn(
            &Handle::current(),
            module_id,
            Arc::clone(&mailbox),
            Arc::clone(&registry),
            CancellationToken::new(),
            false,
        );
        (mailbox, registry, dispatcher)
    }

    async fn recv(rx: &mut Delivered) -> (String, String, String) {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("handler channel closed")
    }

    async fn wait_finished(dispatcher: &Dispatcher) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !dispatcher.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatcher did not stop");
    }

    #[tokio::test]
    async fn delivers_in_enqueue_order() {
        let (mailbox, registry, _dispatcher) = setup("a");
        let (handler, mut rx) = recording_handler();
        registry.set("a", handler);
        mailbox.wake();

        for i in 0..5 {
            mailbox.push(Message::new("b", "text", format!("m{i}")));
        }

        for i in 0..5 {
            let (from, content_type, body) = recv(&mut rx).await;
            assert_eq!(from, "b");
            assert_eq!(content_type, "text");
            assert_eq!(body, format!("m{i}"));
        }
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn holds_messages_until_handler_appears() {
        let (mailbox, registry, _dispatcher) = setup("a");
        mailbox.push(Message::new("b", "text", "m1"));
        mailbox.push(Message::new("b", "text", "m2"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mailbox.len(), 2);

        let (handler, mut rx) = recording_handler();
        registry.set("a", handler);
        mailbox.wake();

        assert_eq!(recv(&mut rx).await.2, "m1");
        assert_eq!(recv(&mut rx).await.2, "m2");
    }

    #[tokio::test]
    async fn failing_handler_drops_message_and_continues() {
        let (mailbox, registry, _dispatcher) = setup("a");
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        registry.set(
            "a",
            Arc::new(BoxMessageHandler::new(handler_fn(move |_, _, body| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HandlerError::failed(format!("cannot handle {body}")))
                }
            }))),
        );

        mailbox.push(Message::new("b", "text", "m1"));
        mailbox.push(Message::new("b", "text", "m2"));

        tokio::time::timeout(Duration::from_secs(2), async {
            while attempts.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both messages should be attempted");
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn handler_failure_is_reported_once_at_error() {
        let (captured, _guard) = CapturedEvents::install();
        let (mailbox, registry, _dispatcher) = setup("a");
        registry.set(
            "a",
            Arc::new(BoxMessageHandler::new(handler_fn(|_, _, _| async {
                Err::<(), _>(HandlerError::failed("nope"))
            }))),
        );

        mailbox.push(Message::new("b", "text", "m1"));

        tokio::time::timeout(Duration::from_secs(2), async {
            while captured.count(Level::ERROR) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler failure should be logged");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(captured.count(Level::ERROR), 1);
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let (mailbox, registry, dispatcher) = setup("a");
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.set(
            "a",
            Arc::new(BoxMessageHandler::new(handler_fn(move |_, _, body| {
                let tx = tx.clone();
                async move {
                    if body == "boom" {
                        panic!("handler exploded");
                    }
                    let _ = tx.send(body);
                    Ok::<_, HandlerError>(())
                }
            }))),
        );

        mailbox.push(Message::new("b", "text", "boom"));
        mailbox.push(Message::new("b", "text", "after"));

        let body = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, "after");
        assert!(!dispatcher.is_finished());
    }

    #[tokio::test]
    async fn one_invocation_at_a_time() {
        let (mailbox, registry, _dispatcher) = setup("a");
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        {
            let (in_flight, max_seen, done) =
                (Arc::clone(&in_flight), Arc::clone(&max_seen), Arc::clone(&done));
            registry.set(
                "a",
                Arc::new(BoxMessageHandler::new(handler_fn(move |_, _, _| {
                    let (in_flight, max_seen, done) =
                        (Arc::clone(&in_flight), Arc::clone(&max_seen), Arc::clone(&done));
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        done.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, HandlerError>(())
                    }
                }))),
            );
        }

        for i in 0..10 {
            mailbox.push(Message::new("b", "text", i.to_string()));
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while done.load(Ordering::SeqCst) < 10 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replaced_handler_takes_over_for_next_message() {
        let (mailbox, registry, _dispatcher) = setup("a");
        let log = Arc::new(Mutex::new(Vec::new()));
        let tagged = |tag: &'static str| {
            let log = Arc::clone(&log);
            Arc::new(BoxMessageHandler::new(handler_fn(move |_, _, body| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(format!("{tag}:{body}"));
                    Ok::<_, HandlerError>(())
                }
            })))
        };

        registry.set("a", tagged("old"));
        mailbox.push(Message::new("b", "text", "1"));
        tokio::time::timeout(Duration::from_secs(2), async {
            while log.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        registry.set("a", tagged("new"));
        mailbox.push(Message::new("b", "text", "2"));
        tokio::time::timeout(Duration::from_secs(2), async {
            while log.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["old:1".to_string(), "new:2".to_string()]);
    }

    #[tokio::test]
    async fn cancel_stops_idle_dispatcher() {
        let (mailbox, _registry, dispatcher) = setup("a");
        mailbox.push(Message::new("b", "text", "pending"));

        dispatcher.cancel();
        assert!(dispatcher.is_cancelled());
        wait_finished(&dispatcher).await;
        assert_eq!(mailbox.len(), 1);
    }

    #[tokio::test]
    async fn cancel_interrupts_in_flight_delivery() {
        let (captured, _guard) = CapturedEvents::install();
        let (mailbox, registry, dispatcher) = setup("a");
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let completed = Arc::new(AtomicUsize::new(0));
        let finished = Arc::clone(&completed);
        registry.set(
            "a",
            Arc::new(BoxMessageHandler::new(handler_fn(move |_, _, _| {
                let started_tx = started_tx.clone();
                let finished = Arc::clone(&finished);
                async move {
                    let _ = started_tx.send(());
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(())
                }
            }))),
        );

        mailbox.push(Message::new("b", "text", "slow"));
        mailbox.push(Message::new("b", "text", "never"));
        tokio::time::timeout(Duration::from_secs(2), started_rx.recv())
            .await
            .unwrap()
            .unwrap();

        dispatcher.cancel();
        wait_finished(&dispatcher).await;

        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(mailbox.len(), 1);
        assert_eq!(captured.count(Level::ERROR), 0);
    }

    #[tokio::test]
    async fn dropping_handle_cancels_task() {
        let mailbox = Arc::new(Mailbox::new("a", 4));
        let token = CancellationToken::new();
        let dispatcher = Dispatcher::spawn(
            &Handle::current(),
            "a",
            Arc::clone(&mailbox),
            Arc::new(Registry::new()),
            token.clone(),
            false,
        );
        assert_eq!(dispatcher.module_id(), "a");

        drop(dispatcher);
        assert!(token.is_cancelled());
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
