// Package scheduler provides counters for job outcomes.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::metrics::meter;

/// Cumulative outcome counters read by `statistics()`.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub timed_out: AtomicU64,
    pub retried: AtomicU64,
    pub rejected: AtomicU64,
    completed_micros: AtomicU64,
    // Unix millis of the last completion, 0 when none.
    last_completed_ms: AtomicI64,
    // Values already pushed to the metrics facade.
    published: Mutex<[u64; 6]>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_completed(&self, duration: Duration, at: DateTime<Utc>) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.completed_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.last_completed_ms.store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Average duration of completed jobs in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        let n = self.completed.load(Ordering::Relaxed);
        if n == 0 {
            return 0.0;
        }
        self.completed_micros.load(Ordering::Relaxed) as f64 / n as f64 / 1000.0
    }

    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        match self.last_completed_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    /// Pushes the growth since the previous call to the metrics facade.
    pub fn publish_deltas(&self) {
        let now = [
            Self::get(&self.completed),
            Self::get(&self.failed),
            Self::get(&self.cancelled),
            Self::get(&self.timed_out),
            Self::get(&self.retried),
            Self::get(&self.rejected),
        ];
        let mut published = self.published.lock();
        let d: Vec<u64> = now
            .iter()
            .zip(published.iter())
            .map(|(n, p)| n.saturating_sub(*p))
            .collect();
        *published = now;
        drop(published);

        meter::add_job_outcome_counters(d[0], d[1], d[2], d[3], d[4]);
        meter::add_rejected_jobs(d[5]);
    }
}
