// Metrics recorder seam and the Prometheus exporter bootstrap.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use metrics_process::Collector;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;

use super::meter;

static PROC_COLLECTOR: OnceCell<Collector> = OnceCell::new();

/// Sink for execution outcomes of jobs and cache operations.
pub trait MetricsRecorder: Send + Sync {
    /// Records one execution under `label`.
    fn record_job_execution(&self, label: &str, success: bool, duration: Duration);
}

/// Publishes executions through the global `metrics` recorder.
///
/// When no exporter is installed the facade drops the values, so this is
/// also the recorder used by tests that do not care about metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusRecorder;

impl PrometheusRecorder {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn record_job_execution(&self, label: &str, success: bool, duration: Duration) {
        meter::record_execution(label, success, duration);
    }
}

/// Installs the Prometheus exporter with its own HTTP listener and
/// registers the process collector.
///
/// Must run inside the tokio runtime: the exporter spawns its listener on it.
pub fn init_exporter(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid metrics listen address {:?}", listen))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus recorder")?;

    let collector = Collector::default();
    collector.describe();
    let _ = PROC_COLLECTOR.set(collector);

    Ok(())
}

/// Refreshes process metrics (RSS, CPU, open fds).
pub fn collect_process_metrics() {
    if let Some(c) = PROC_COLLECTOR.get() {
        c.collect();
    }
}
