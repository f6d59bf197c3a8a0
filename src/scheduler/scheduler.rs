// Package scheduler exposes the job scheduler service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cache::TieredCache;
use crate::config;
use crate::events::{attrs, EventLevel, EventLogger};
use crate::metrics::MetricsRecorder;

use super::counters::Counters;
use super::error::{EnqueueError, SchedulerError};
use super::job::{JobId, JobInfo, JobPriority, JobRequest};
use super::state::{Core, ServiceStatus, COMPONENT};
use super::{maintenance, worker};

/// How long aborted tasks get to unwind after the shutdown deadline.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Point-in-time scheduler figures.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub status: ServiceStatus,
    pub active_jobs: usize,
    pub max_concurrent_jobs: usize,
    pub queued_high: usize,
    pub queued_normal: usize,
    pub queued_low: usize,
    pub queued_total: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub retried: u64,
    pub rejected: u64,
    pub average_duration_ms: f64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// What `stop` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// All in-flight jobs finished before the deadline.
    pub graceful: bool,
    /// In-flight jobs aborted at the deadline.
    pub abandoned: usize,
    /// Queued jobs cancelled without ever starting.
    pub drained: usize,
    pub elapsed: Duration,
}

/// JobScheduler runs submitted jobs on three priority tiers under a global
/// concurrency ceiling, with per-job timeouts and retries.
///
/// Clones share the same scheduler.
#[derive(Clone)]
pub struct JobScheduler {
    core: Arc<Core>,
}

impl JobScheduler {
    pub fn new(
        cfg: config::Scheduler,
        metrics: Arc<dyn MetricsRecorder>,
        events: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            core: Arc::new(Core::new(cfg, metrics, events)),
        }
    }

    /// Lets the metrics collection job publish cache gauges too.
    pub fn attach_cache(&self, cache: TieredCache) {
        let _ = self.core.cache.set(cache);
    }

    /// Queues a job and returns its id without waiting for it to run.
    pub fn enqueue(&self, req: JobRequest) -> Result<JobId, EnqueueError> {
        self.core.enqueue(req)
    }

    /// Snapshot of a job, while it is retained in the history.
    pub fn job(&self, id: JobId) -> Option<JobInfo> {
        self.core.history.get(&id)
    }

    pub fn statistics(&self) -> SchedulerStats {
        let c = &self.core.counters;
        let q = &self.core.queues;
        SchedulerStats {
            status: self.core.status(),
            active_jobs: self.core.active(),
            max_concurrent_jobs: self.core.cfg.max_concurrent_jobs,
            queued_high: q.len(JobPriority::High),
            queued_normal: q.len(JobPriority::Normal),
            queued_low: q.len(JobPriority::Low),
            queued_total: q.total(),
            completed: Counters::get(&c.completed),
            failed: Counters::get(&c.failed),
            cancelled: Counters::get(&c.cancelled),
            timed_out: Counters::get(&c.timed_out),
            retried: Counters::get(&c.retried),
            rejected: Counters::get(&c.rejected),
            average_duration_ms: c.average_duration_ms(),
            last_completed_at: c.last_completed_at(),
        }
    }

    /// Starts the tier loops and the maintenance task. Calling it again
    /// while running is a no-op.
    pub fn start(&self) -> Result<(), SchedulerError> {
        match self.core.transition(ServiceStatus::Idle, ServiceStatus::Running) {
            Ok(()) => {}
            Err(ServiceStatus::Running) => return Ok(()),
            Err(_) => return Err(SchedulerError::AlreadyStopped),
        }

        for priority in JobPriority::ALL {
            self.core
                .tracker
                .spawn(worker::run_tier(self.core.clone(), priority));
        }
        self.core.tracker.spawn(maintenance::run(self.core.clone()));

        let cfg = &self.core.cfg;
        info!(
            component = COMPONENT,
            event = "scheduler_started",
            max_concurrent_jobs = cfg.max_concurrent_jobs,
            max_queued_jobs = cfg.max_queued_jobs,
            job_timeout_secs = cfg.job_timeout.as_secs(),
            "job scheduler started"
        );
        Ok(())
    }

    /// Stops the scheduler.
    ///
    /// In-flight jobs get `shutdown_timeout` to finish; whatever is still
    /// running afterwards is aborted. Queued jobs and jobs waiting for a
    /// retry are cancelled. A second call returns an empty report.
    pub async fn stop(&self) -> ShutdownReport {
        let started = Instant::now();
        let previous = self.core.status();
        if matches!(previous, ServiceStatus::Stopping | ServiceStatus::Stopped) {
            return ShutdownReport::default();
        }
        self.core.set_status(ServiceStatus::Stopping);
        self.core.shutdown.cancel();
        // Waits out every enqueue that saw the token uncancelled; later ones are refused.
        drop(self.core.admission.write());

        info!(
            component = COMPONENT,
            event = "scheduler_stopping",
            active = self.core.active(),
            queued = self.core.queues.total(),
            "stopping job scheduler"
        );

        let graceful = self.wait_idle(self.core.cfg.shutdown_timeout).await;
        let mut abandoned = 0;
        if !graceful {
            abandoned = self.core.in_flight.len();
            warn!(
                component = COMPONENT,
                event = "shutdown_timeout",
                abandoned,
                timeout_secs = self.core.cfg.shutdown_timeout.as_secs_f64(),
                "in-flight jobs did not finish in time, aborting"
            );
            let handles: Vec<_> = self.core.in_flight.iter().map(|h| h.value().clone()).collect();
            for handle in handles {
                handle.abort();
            }
        }

        self.core.tracker.close();
        if tokio::time::timeout(ABORT_GRACE, self.core.tracker.wait()).await.is_err() {
            warn!(component = COMPONENT, "scheduler tasks still running after abort");
        }

        let drained = self.core.queues.drain();
        let drained_count = drained.len();
        for job in drained {
            self.core.cancel(job, "shutdown before start");
        }

        self.core.set_status(ServiceStatus::Stopped);
        let report = ShutdownReport {
            graceful,
            abandoned,
            drained: drained_count,
            elapsed: started.elapsed(),
        };

        self.core.events.log_event(
            "scheduler_stopped",
            "job scheduler stopped",
            if graceful { EventLevel::Info } else { EventLevel::Warn },
            &attrs([
                ("graceful", report.graceful.to_string()),
                ("abandoned", report.abandoned.to_string()),
                ("drained", report.drained.to_string()),
                ("elapsed_ms", report.elapsed.as_millis().to_string()),
            ]),
        );
        report
    }

    // Waits until no job holds a slot, or `timeout` elapses.
    async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.core.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.core.active() == 0 {
                return true;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                _ = tokio::time::sleep_until(deadline) => return self.core.active() == 0,
            }
        }
    }

    /// Enqueues a metrics collection job immediately.
    pub fn collect_metrics_now(&self) {
        maintenance::enqueue_metrics_job(&self.core);
    }

    /// Runs history cleanup immediately. Returns the number of purged jobs.
    pub fn cleanup_history_now(&self) -> usize {
        maintenance::cleanup(&self.core)
    }
}
