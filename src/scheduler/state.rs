// Package scheduler holds the state shared by the tier loops.

use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::cache::TieredCache;
use crate::config;
use crate::events::{attrs, EventLevel, EventLogger};
use crate::metrics::{self, meter, MetricsRecorder};

use super::counters::Counters;
use super::error::{EnqueueError, JobError};
use super::history::History;
use super::job::{Job, JobId, JobPriority, JobRequest, JobStatus};
use super::queue::PriorityQueues;
use super::retry::RetryPolicy;

pub(crate) const COMPONENT: &str = "scheduler";

/// Lifecycle of the scheduler service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ServiceStatus {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ServiceStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ServiceStatus::Idle,
            1 => ServiceStatus::Running,
            2 => ServiceStatus::Stopping,
            _ => ServiceStatus::Stopped,
        }
    }
}

pub(crate) struct Core {
    pub cfg: config::Scheduler,
    pub queues: PriorityQueues,
    pub retry: RetryPolicy,
    pub active: AtomicUsize,
    pub counters: Counters,
    pub history: History,
    pub in_flight: DashMap<JobId, AbortHandle>,
    pub notify: Notify,
    pub shutdown: CancellationToken,
    /// Held shared by `enqueue` across its stop check and push; `stop` takes it
    /// exclusively once the token is cancelled so no push can trail the drain.
    pub admission: RwLock<()>,
    pub tracker: TaskTracker,
    pub metrics: Arc<dyn MetricsRecorder>,
    pub events: Arc<dyn EventLogger>,
    pub cache: OnceCell<TieredCache>,
    state: AtomicU8,
}

impl Core {
    pub fn new(
        cfg: config::Scheduler,
        metrics: Arc<dyn MetricsRecorder>,
        events: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            queues: PriorityQueues::new(cfg.max_queued_jobs),
            retry: RetryPolicy::new(&cfg),
            active: AtomicUsize::new(0),
            counters: Counters::new(),
            history: History::new(),
            in_flight: DashMap::new(),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            admission: RwLock::new(()),
            tracker: TaskTracker::new(),
            metrics,
            events,
            cache: OnceCell::new(),
            state: AtomicU8::new(ServiceStatus::Idle as u8),
            cfg,
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: ServiceStatus) {
        self.state.store(status as u8, Ordering::Release);
    }

    /// Moves `from` -> `to`; returns the status actually observed on failure.
    pub fn transition(&self, from: ServiceStatus, to: ServiceStatus) -> Result<(), ServiceStatus> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ServiceStatus::from_u8)
    }

    pub fn enqueue(&self, req: JobRequest) -> Result<JobId, EnqueueError> {
        let _admission = self.admission.read();
        if self.shutdown.is_cancelled() {
            return Err(EnqueueError::Stopped);
        }

        let max_retries = self.retry.max_retries_for(&req.job_type);
        let job = Job::new(req, max_retries);
        let id = job.id();
        let priority = job.priority();
        let job_type = job.info.job_type.clone();

        // Recorded first so a fast dispatch can never be overwritten by the queued snapshot.
        self.history.record(&job.info);
        if let Err((_, err)) = self.queues.push(job) {
            self.history.remove(&id);
            Counters::inc(&self.counters.rejected);
            warn!(
                component = COMPONENT,
                event = "job_rejected",
                job_type = %job_type,
                error = %err,
                "job rejected"
            );
            return Err(err);
        }

        self.notify.notify_waiters();
        self.events.log_event(
            "job_enqueued",
            "job enqueued",
            EventLevel::Debug,
            &attrs([
                ("job_id", id.to_string()),
                ("job_type", job_type),
                ("priority", priority.as_str().to_string()),
            ]),
        );
        Ok(id)
    }

    /// Reserves one concurrency slot if the ceiling allows it.
    pub fn try_acquire_slot(&self) -> bool {
        let max = self.cfg.max_concurrent_jobs;
        let mut cur = self.active.load(Ordering::Acquire);
        loop {
            if cur >= max {
                return false;
            }
            match self
                .active
                .compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Gives back a slot that was reserved but not used.
    pub fn release_unused_slot(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn complete(&self, mut job: Job, elapsed: Duration) {
        let now = Utc::now();
        job.info.status = JobStatus::Completed;
        job.info.completed_at = Some(now);
        self.counters.on_completed(elapsed, now);
        self.history.record(&job.info);

        self.events.log_event(
            "job_completed",
            "job completed",
            EventLevel::Info,
            &attrs([
                ("job_id", job.id().to_string()),
                ("job_type", job.info.job_type.clone()),
                ("duration_ms", elapsed.as_millis().to_string()),
                ("attempts", job.info.attempts.to_string()),
            ]),
        );
    }

    /// Records a terminal `Cancelled` outcome.
    pub fn cancel(&self, mut job: Job, reason: &str) {
        job.info.status = JobStatus::Cancelled;
        job.info.completed_at = Some(Utc::now());
        job.info.last_error = Some(JobError::Cancelled.to_string());
        Counters::inc(&self.counters.cancelled);
        self.history.record(&job.info);

        self.events.log_event(
            "job_cancelled",
            "job cancelled",
            EventLevel::Warn,
            &attrs([
                ("job_id", job.id().to_string()),
                ("job_type", job.info.job_type.clone()),
                ("reason", reason.to_string()),
            ]),
        );
    }

    /// Marks a job whose task vanished (aborted) as cancelled.
    pub fn cancel_by_id(&self, id: &JobId) {
        let mut cancelled = false;
        self.history.update(id, |info| {
            if !info.status.is_terminal() {
                info.status = JobStatus::Cancelled;
                info.completed_at = Some(Utc::now());
                info.last_error = Some(JobError::Cancelled.to_string());
                cancelled = true;
            }
        });
        if cancelled {
            Counters::inc(&self.counters.cancelled);
        }
    }

    /// Records a failed attempt; returns the job if it has retry budget left.
    pub fn fail(&self, mut job: Job, err: JobError) -> Option<Job> {
        job.info.last_error = Some(err.to_string());

        if job.info.retry_count < job.info.max_retries {
            job.info.retry_count += 1;
            job.info.last_retry_at = Some(Utc::now());
            job.info.status = JobStatus::Retrying;
            Counters::inc(&self.counters.retried);
            self.history.record(&job.info);

            self.events.log_event(
                "job_retry_scheduled",
                "job attempt failed, retrying",
                EventLevel::Warn,
                &attrs([
                    ("job_id", job.id().to_string()),
                    ("job_type", job.info.job_type.clone()),
                    ("error", err.to_string()),
                    ("retry_count", job.info.retry_count.to_string()),
                    ("max_retries", job.info.max_retries.to_string()),
                ]),
            );
            return Some(job);
        }

        let timed_out = matches!(err, JobError::Timeout(_));
        job.info.status = if timed_out { JobStatus::TimedOut } else { JobStatus::Failed };
        job.info.completed_at = Some(Utc::now());
        if timed_out {
            Counters::inc(&self.counters.timed_out);
        } else {
            Counters::inc(&self.counters.failed);
        }
        self.history.record(&job.info);

        self.events.log_event(
            if timed_out { "job_timed_out" } else { "job_failed" },
            "job failed permanently",
            EventLevel::Error,
            &attrs([
                ("job_id", job.id().to_string()),
                ("job_type", job.info.job_type.clone()),
                ("error", err.to_string()),
                ("retry_count", job.info.retry_count.to_string()),
            ]),
        );
        None
    }

    /// Publishes gauges and counters to the metrics facade.
    pub fn publish_metrics(&self) {
        meter::set_active_jobs(self.active());
        for p in JobPriority::ALL {
            meter::set_queued_jobs(p.as_str(), self.queues.len(p));
        }
        self.counters.publish_deltas();
        if let Some(cache) = self.cache.get() {
            cache.publish_gauges();
        }
        metrics::collect_process_metrics();

        debug!(
            component = COMPONENT,
            event = "metrics_published",
            active = self.active(),
            queued = self.queues.total(),
            history = self.history.len(),
            "scheduler metrics published"
        );
    }
}
