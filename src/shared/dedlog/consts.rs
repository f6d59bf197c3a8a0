//! Dedup logger constants.

pub const COMPONENT: &str = "dedlog";

/// Bounded channel capacity; entries beyond it are dropped on the hot path.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Aggregation window.
pub const FLUSH_EVERY: std::time::Duration = std::time::Duration::from_secs(5);
