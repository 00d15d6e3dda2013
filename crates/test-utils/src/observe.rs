//! Counting tracing layer for asserting on log output.
//!
//! The agent's error contract is observable only through logging: a failed
//! client run produces exactly one error event. [`ObservationCounter`]
//! records the events emitted by the `nodeagent` crate so tests can count
//! them.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Shared, cloneable record of the events seen by the layer.
#[derive(Debug, Clone, Default)]
pub struct ObservationCounter {
    events: Arc<Mutex<Vec<Observation>>>,
}

impl ObservationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observation> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.level == level)
            .count()
    }

    pub fn errors(&self) -> usize {
        self.count(Level::ERROR)
    }

    /// Messages of events at `level`, in emission order.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.level == level)
            .map(|o| o.message.clone())
            .collect()
    }

    /// True if some event at `level` has a message containing `needle`.
    pub fn saw(&self, level: Level, needle: &str) -> bool {
        self.messages(level).iter().any(|m| m.contains(needle))
    }
}

impl<S: Subscriber> Layer<S> for ObservationCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !meta.target().starts_with("nodeagent") {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.events.lock().unwrap().push(Observation {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: visitor.message,
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// Install a counting subscriber for the current thread.
///
/// Keep the guard alive for the duration of the test. Use a current-thread
/// runtime (the `#[tokio::test]` default) so every event lands on this
/// thread.
pub fn counting_subscriber() -> (ObservationCounter, DefaultGuard) {
    let counter = ObservationCounter::new();
    let subscriber = Registry::default().with(counter.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (counter, guard)
}
