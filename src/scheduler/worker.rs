// Package scheduler runs the per-priority worker loops and job attempts.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics::meter;

use super::error::JobError;
use super::job::{Job, JobId, JobPriority, JobStatus};
use super::state::{Core, COMPONENT};
use super::work::JobContext;

/// Worker loop of one priority tier.
///
/// A slot is reserved before anything is dequeued, so a job only leaves
/// its queue when it can start right away. A tier yields to any higher
/// tier that still has queued jobs.
pub(crate) async fn run_tier(core: Arc<Core>, priority: JobPriority) {
    info!(component = COMPONENT, priority = priority.as_str(), "worker loop started");

    loop {
        let notified = core.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if core.shutdown.is_cancelled() {
            break;
        }

        if !core.queues.has_higher_than(priority) && core.try_acquire_slot() {
            match core.queues.pop(priority) {
                Some(job) => {
                    dispatch(&core, job);
                    continue;
                }
                None => core.release_unused_slot(),
            }
        }

        tokio::select! {
            _ = core.shutdown.cancelled() => break,
            _ = &mut notified => {}
            _ = tokio::time::sleep(core.cfg.poll_interval) => {}
        }
    }

    info!(component = COMPONENT, priority = priority.as_str(), "worker loop stopped");
}

/// Starts an attempt on its own task. The caller already holds a slot.
fn dispatch(core: &Arc<Core>, mut job: Job) {
    job.info.status = JobStatus::Processing;
    job.info.started_at = Some(chrono::Utc::now());
    job.info.completed_at = None;
    job.info.attempts += 1;
    core.history.record(&job.info);
    meter::set_active_jobs(core.active());

    let id = job.id();
    let guard = SlotGuard::new(core.clone(), id);
    let handle = core.tracker.spawn(execute(core.clone(), job, guard));
    core.in_flight.insert(id, handle.abort_handle());
    if handle.is_finished() {
        core.in_flight.remove(&id);
    }
}

async fn execute(core: Arc<Core>, job: Job, mut guard: SlotGuard) {
    let token = core.shutdown.child_token();
    let ctx = JobContext::new(&job.info, token.clone());
    let work = job.work.clone();

    debug!(
        component = COMPONENT,
        job_id = %job.id(),
        job_type = %job.info.job_type,
        attempt = job.info.attempts,
        "job started"
    );

    let started = Instant::now();
    let fut = AssertUnwindSafe(work.execute(ctx)).catch_unwind();
    tokio::pin!(fut);
    let deadline = tokio::time::sleep(core.cfg.job_timeout);
    tokio::pin!(deadline);

    // Cancellation is cooperative: after the deadline fires the work is
    // still awaited until it returns.
    let mut timed_out = false;
    let outcome = loop {
        tokio::select! {
            res = &mut fut => break res,
            _ = &mut deadline, if !timed_out => {
                timed_out = true;
                token.cancel();
                warn!(
                    component = COMPONENT,
                    event = "job_deadline",
                    job_id = %job.id(),
                    job_type = %job.info.job_type,
                    timeout_secs = core.cfg.job_timeout.as_secs_f64(),
                    "job deadline reached, cancellation requested"
                );
            }
        }
    };
    let elapsed = started.elapsed();

    let result = match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(JobError::Execution(format!("{:#}", e))),
        Err(panic) => Err(JobError::Panicked(panic_message(panic.as_ref()))),
    };
    core.metrics
        .record_job_execution(&job.info.job_type, result.is_ok(), elapsed);

    match result {
        Ok(()) => {
            core.complete(job, elapsed);
            guard.settle();
        }
        Err(_) if core.shutdown.is_cancelled() => {
            core.cancel(job, "shutdown");
            guard.settle();
        }
        Err(err) => {
            let err = if timed_out { JobError::Timeout(core.cfg.job_timeout) } else { err };
            match core.fail(job, err) {
                Some(job) => {
                    guard.settle();
                    // Free the slot before the backoff starts.
                    drop(guard);
                    schedule_retry(&core, job);
                }
                None => guard.settle(),
            }
        }
    }
}

/// Re-queues a job at the tail of its tier once its backoff elapses.
fn schedule_retry(core: &Arc<Core>, job: Job) {
    let delay = core.retry.backoff_delay(job.info.retry_count);
    debug!(
        component = COMPONENT,
        job_id = %job.id(),
        delay_ms = delay.as_millis() as u64,
        "retry scheduled"
    );

    let core = core.clone();
    core.tracker.clone().spawn(async move {
        tokio::select! {
            _ = core.shutdown.cancelled() => {
                core.cancel(job, "shutdown during retry backoff");
            }
            _ = tokio::time::sleep(delay) => {
                if core.shutdown.is_cancelled() {
                    core.cancel(job, "shutdown during retry backoff");
                } else {
                    core.queues.push_retry(job);
                    core.notify.notify_waiters();
                }
            }
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Holds one concurrency slot for an attempt.
///
/// Dropping it releases the slot and wakes the loops. If the attempt never
/// recorded an outcome (its task was aborted) the job is marked cancelled.
struct SlotGuard {
    core: Arc<Core>,
    id: JobId,
    settled: bool,
}

impl SlotGuard {
    fn new(core: Arc<Core>, id: JobId) -> Self {
        Self {
            core,
            id,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.core.cancel_by_id(&self.id);
        }
        self.core.in_flight.remove(&self.id);
        let left = self.core.active.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        meter::set_active_jobs(left);
        self.core.notify.notify_waiters();
    }
}
