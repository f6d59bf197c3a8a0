// Package cache provides counters and snapshots for the tiered cache.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters is a set of monotonic counters updated on the hot path.
#[derive(Debug, Default)]
pub struct Counters {
    pub distributed_hits: AtomicU64,
    pub distributed_misses: AtomicU64,
    pub distributed_errors: AtomicU64,
    pub local_hits: AtomicU64,
    pub local_misses: AtomicU64,
    pub promotions: AtomicU64,
    pub gets: AtomicU64,
    pub get_nanos: AtomicU64,
    pub sets: AtomicU64,
    pub set_nanos: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_get(&self, elapsed: Duration) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.get_nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_set(&self, elapsed: Duration) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.set_nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub distributed_backend: &'static str,
    pub local_entries: usize,
    pub local_bytes: i64,
    pub local_capacity_bytes: i64,
    pub local_evictions: u64,
    pub local_expirations: u64,
    pub local_hits: u64,
    pub local_misses: u64,
    pub local_hit_rate: f64,
    pub distributed_hits: u64,
    pub distributed_misses: u64,
    pub distributed_errors: u64,
    pub distributed_hit_rate: f64,
    pub overall_hit_rate: f64,
    pub promotions: u64,
    pub avg_get_latency_ms: f64,
    pub avg_set_latency_ms: f64,
    pub is_degraded: bool,
}

/// Local tier figures folded into a snapshot.
pub(crate) struct LocalFigures {
    pub entries: usize,
    pub bytes: i64,
    pub capacity_bytes: i64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub(crate) fn snapshot(
        c: &Counters,
        local: LocalFigures,
        distributed_backend: &'static str,
        is_degraded: bool,
    ) -> Self {
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);

        let local_hits = load(&c.local_hits);
        let local_misses = load(&c.local_misses);
        let distributed_hits = load(&c.distributed_hits);
        let distributed_misses = load(&c.distributed_misses);
        let gets = load(&c.gets);
        let sets = load(&c.sets);

        Self {
            distributed_backend,
            local_entries: local.entries,
            local_bytes: local.bytes,
            local_capacity_bytes: local.capacity_bytes,
            local_evictions: local.evictions,
            local_expirations: local.expirations,
            local_hits,
            local_misses,
            local_hit_rate: ratio(local_hits, local_hits + local_misses),
            distributed_hits,
            distributed_misses,
            distributed_errors: load(&c.distributed_errors),
            distributed_hit_rate: ratio(distributed_hits, distributed_hits + distributed_misses),
            overall_hit_rate: ratio(distributed_hits + local_hits, gets),
            promotions: load(&c.promotions),
            avg_get_latency_ms: avg_ms(load(&c.get_nanos), gets),
            avg_set_latency_ms: avg_ms(load(&c.set_nanos), sets),
            is_degraded,
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn avg_ms(nanos: u64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        nanos as f64 / n as f64 / 1_000_000.0
    }
}
