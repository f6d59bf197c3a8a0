//! Prometheus metrics functionality.
//
//! Metrics organization:
//! - Job and cache metrics: metrics::meter (jobs_active, cache_hits, etc.)
//! - Execution outcomes: metrics::recorder::MetricsRecorder
//! - Process metrics: metrics-process (process_resident_memory_bytes, process_cpu_*, etc.)

pub mod meter;
pub mod recorder;

// Re-export commonly used items
pub use recorder::{collect_process_metrics, init_exporter, MetricsRecorder, PrometheusRecorder};
