//! Event capture for asserting log levels in unit tests.

use std::sync::{Arc, Mutex};

use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Records the level of every event emitted while its guard is alive on the
/// current thread. Tasks spawned on a current-thread runtime are included.
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedEvents {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl CapturedEvents {
    pub(crate) fn install() -> (Self, DefaultGuard) {
        let captured = Self::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (captured, guard)
    }

    pub(crate) fn count(&self, level: Level) -> usize {
        self.levels
            .lock()
            .unwrap()
            .iter()
            .filter(|l| **l == level)
            .count()
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.levels.lock().unwrap().push(*event.metadata().level());
    }
}
