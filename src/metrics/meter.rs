// Metric names and thin publishing helpers over the metrics facade.

use std::time::Duration;

// Metric name constants
pub const JOB_EXECUTIONS: &str = "job_executions_total";
pub const JOB_DURATION: &str = "job_execution_duration_seconds";
pub const JOBS_ACTIVE: &str = "jobs_active";
pub const JOBS_QUEUED: &str = "jobs_queued";
pub const JOBS_COMPLETED: &str = "jobs_completed_total";
pub const JOBS_FAILED: &str = "jobs_failed_total";
pub const JOBS_CANCELLED: &str = "jobs_cancelled_total";
pub const JOBS_TIMED_OUT: &str = "jobs_timed_out_total";
pub const JOBS_RETRIED: &str = "jobs_retried_total";
pub const JOBS_REJECTED: &str = "jobs_rejected_total";

pub const CACHE_HITS: &str = "cache_hits";
pub const CACHE_MISSES: &str = "cache_misses";
pub const CACHE_PROMOTIONS: &str = "cache_promotions_total";
pub const CACHE_TRANSPORT_ERRORS: &str = "cache_transport_errors_total";
pub const CACHE_LOCAL_MEMORY_USAGE: &str = "cache_local_memory_usage";
pub const CACHE_LOCAL_LENGTH: &str = "cache_local_length";
pub const CACHE_LOCAL_EVICTIONS: &str = "cache_local_evicted_total_items";
pub const CACHE_IS_DEGRADED: &str = "cache_is_degraded";

/// Records one labelled execution (job or cache operation).
pub fn record_execution(label: &str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(JOB_EXECUTIONS, "label" => label.to_string(), "outcome" => outcome).increment(1);
    metrics::histogram!(JOB_DURATION, "label" => label.to_string()).record(duration.as_secs_f64());
}

/// Sets the number of jobs currently processing.
pub fn set_active_jobs(value: usize) {
    metrics::gauge!(JOBS_ACTIVE).set(value as f64);
}

/// Sets queue depth for one priority tier.
pub fn set_queued_jobs(priority: &'static str, value: usize) {
    metrics::gauge!(JOBS_QUEUED, "priority" => priority).set(value as f64);
}

/// Adds terminal job outcome counters accumulated since the previous flush.
pub fn add_job_outcome_counters(completed: u64, failed: u64, cancelled: u64, timed_out: u64, retried: u64) {
    metrics::counter!(JOBS_COMPLETED).increment(completed);
    metrics::counter!(JOBS_FAILED).increment(failed);
    metrics::counter!(JOBS_CANCELLED).increment(cancelled);
    metrics::counter!(JOBS_TIMED_OUT).increment(timed_out);
    metrics::counter!(JOBS_RETRIED).increment(retried);
}

/// Adds rejected enqueue attempts.
pub fn add_rejected_jobs(value: u64) {
    metrics::counter!(JOBS_REJECTED).increment(value);
}

/// Adds cache hits for a tier.
pub fn add_cache_hit(tier: &'static str) {
    metrics::counter!(CACHE_HITS, "tier" => tier).increment(1);
}

/// Adds a cache miss (both tiers missed).
pub fn add_cache_miss() {
    metrics::counter!(CACHE_MISSES).increment(1);
}

/// Adds a promotion from the local into the distributed tier.
pub fn add_cache_promotion() {
    metrics::counter!(CACHE_PROMOTIONS).increment(1);
}

/// Adds a distributed tier transport error.
pub fn add_cache_transport_error(op: &'static str) {
    metrics::counter!(CACHE_TRANSPORT_ERRORS, "op" => op).increment(1);
}

/// Sets local tier memory and length gauges.
pub fn set_local_cache_usage(bytes: usize, entries: usize) {
    metrics::gauge!(CACHE_LOCAL_MEMORY_USAGE).set(bytes as f64);
    metrics::gauge!(CACHE_LOCAL_LENGTH).set(entries as f64);
}

/// Adds local tier evictions.
pub fn add_local_evictions(items: u64) {
    metrics::counter!(CACHE_LOCAL_EVICTIONS).increment(items);
}

/// Sets the degraded status of the distributed tier.
pub fn set_is_cache_degraded(is_degraded: bool) {
    let value = if is_degraded { 1.0 } else { 0.0 };
    metrics::gauge!(CACHE_IS_DEGRADED).set(value);
}
