//! Structured event logging.
//!
//! Scheduler and cache report lifecycle events (enqueue, completion,
//! failure, retry exhaustion, cache degradation) through [`EventLogger`]
//! so the sink can be swapped without touching the core.

use std::collections::BTreeMap;

pub const COMPONENT: &str = "events";

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Event attributes, rendered in key order.
pub type Attributes = BTreeMap<String, String>;

/// Builds attributes from `(key, value)` pairs.
pub fn attrs<const N: usize>(pairs: [(&str, String); N]) -> Attributes {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Sink for structured events.
pub trait EventLogger: Send + Sync {
    fn log_event(&self, event_type: &str, message: &str, level: EventLevel, attributes: &Attributes);
}

/// Emits events as `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLogger;

impl TracingEventLogger {
    pub fn new() -> Self {
        Self
    }
}

impl EventLogger for TracingEventLogger {
    fn log_event(&self, event_type: &str, message: &str, level: EventLevel, attributes: &Attributes) {
        let attributes = serde_json::to_string(attributes).unwrap_or_default();
        match level {
            EventLevel::Debug => tracing::debug!(
                component = COMPONENT,
                event = event_type,
                attributes = %attributes,
                "{}", message
            ),
            EventLevel::Info => tracing::info!(
                component = COMPONENT,
                event = event_type,
                attributes = %attributes,
                "{}", message
            ),
            EventLevel::Warn => tracing::warn!(
                component = COMPONENT,
                event = event_type,
                attributes = %attributes,
                "{}", message
            ),
            EventLevel::Error => tracing::error!(
                component = COMPONENT,
                event = event_type,
                attributes = %attributes,
                "{}", message
            ),
        }
    }
}
