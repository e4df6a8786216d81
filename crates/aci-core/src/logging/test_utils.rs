//! In-memory log capture for tests.
//!
//! [`capture_logs`] installs a subscriber for the current thread and records
//! every event with its level, message and structured fields. Session tests
//! run on a current-thread Tokio runtime and spawn their loops with the
//! current dispatcher, so events from every task of the session under test
//! land in the same capture.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Module path the event came from.
    pub target: String,
    /// Rendered message.
    pub message: String,
    /// Structured fields, rendered as text.
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Rendered value of a structured field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn matches(&self, level: Level, text: &str) -> bool {
        self.level == level && self.message.contains(text)
    }
}

/// Handle to the events recorded by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    fn lock(&self) -> MutexGuard<'_, Vec<CapturedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.lock().clone()
    }

    /// First event at `level` whose message contains `text`.
    pub fn find(&self, level: Level, text: &str) -> Option<CapturedEvent> {
        self.lock().iter().find(|e| e.matches(level, text)).cloned()
    }

    /// Whether an event at `level` mentions `text`.
    pub fn has_event(&self, level: Level, text: &str) -> bool {
        self.lock().iter().any(|e| e.matches(level, text))
    }

    /// Number of events at `level` whose message contains `text`.
    pub fn count_matching(&self, level: Level, text: &str) -> usize {
        self.lock().iter().filter(|e| e.matches(level, text)).count()
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        self.logs.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl EventVisitor {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            let _ = self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.put(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }
}

/// Record events on the current thread until the returned guard is dropped.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(CaptureLayer { logs: logs.clone() })
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
