// Common test utilities: recording sinks and polling helpers.

use parking_lot::Mutex;
use std::time::Duration;

use crate::events::{Attributes, EventLevel, EventLogger};
use crate::metrics::MetricsRecorder;

/// Captures every event instead of logging it.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(String, EventLevel, Attributes)>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events of the given type.
    pub fn count(&self, event_type: &str) -> usize {
        self.events.lock().iter().filter(|(t, _, _)| t == event_type).count()
    }

    /// Attributes of every event of the given type, in emission order.
    pub fn attributes_of(&self, event_type: &str) -> Vec<Attributes> {
        self.events
            .lock()
            .iter()
            .filter(|(t, _, _)| t == event_type)
            .map(|(_, _, a)| a.clone())
            .collect()
    }

    pub fn level_of(&self, event_type: &str) -> Option<EventLevel> {
        self.events
            .lock()
            .iter()
            .find(|(t, _, _)| t == event_type)
            .map(|(_, l, _)| *l)
    }
}

impl EventLogger for RecordingEvents {
    fn log_event(&self, event_type: &str, _message: &str, level: EventLevel, attributes: &Attributes) {
        self.events
            .lock()
            .push((event_type.to_string(), level, attributes.clone()));
    }
}

/// Captures execution records instead of publishing them.
#[derive(Default)]
pub struct RecordingMetrics {
    executions: Mutex<Vec<(String, bool, Duration)>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// (successes, failures) recorded under `label`.
    pub fn outcomes(&self, label: &str) -> (usize, usize) {
        let guard = self.executions.lock();
        let ok = guard.iter().filter(|(l, s, _)| l == label && *s).count();
        let failed = guard.iter().filter(|(l, s, _)| l == label && !*s).count();
        (ok, failed)
    }
}

impl MetricsRecorder for RecordingMetrics {
    fn record_job_execution(&self, label: &str, success: bool, duration: Duration) {
        self.executions
            .lock()
            .push((label.to_string(), success, duration));
    }
}

/// Polls `cond` every few milliseconds until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
