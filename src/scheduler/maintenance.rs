// Package scheduler runs periodic metrics collection and history cleanup.

use std::sync::{Arc, Weak};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::job::{JobPriority, JobRequest};
use super::state::{Core, COMPONENT};
use super::work::work_fn;

pub const METRICS_JOB_TYPE: &str = "metrics_collection";

pub(crate) async fn run(core: Arc<Core>) {
    let metrics_every = core.cfg.metrics_interval;
    let cleanup_every = core.cfg.cleanup_interval;

    let mut metrics_tick = interval_at(Instant::now() + metrics_every, metrics_every);
    metrics_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cleanup_tick = interval_at(Instant::now() + cleanup_every, cleanup_every);
    cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = core.shutdown.cancelled() => break,
            _ = metrics_tick.tick() => enqueue_metrics_job(&core),
            _ = cleanup_tick.tick() => {
                cleanup(&core);
            }
        }
    }

    info!(component = COMPONENT, "maintenance loop stopped");
}

/// Self-enqueues the low priority job that publishes gauges.
pub(crate) fn enqueue_metrics_job(core: &Arc<Core>) {
    // Weak: the job sits in the core's own queue.
    let weak: Weak<Core> = Arc::downgrade(core);
    let work = work_fn(move |_ctx| {
        let weak = weak.clone();
        async move {
            if let Some(core) = weak.upgrade() {
                core.publish_metrics();
            }
            Ok(())
        }
    });

    let req = JobRequest::new(METRICS_JOB_TYPE, "publish scheduler and cache metrics", work)
        .priority(JobPriority::Low);
    if let Err(e) = core.enqueue(req) {
        warn!(component = COMPONENT, event = "metrics_job_rejected", error = %e, "metrics collection skipped");
    }
}

/// Purges old terminal jobs from the history.
pub(crate) fn cleanup(core: &Core) -> usize {
    let purged = core.history.purge_older_than(core.cfg.history_retention);
    core.in_flight.retain(|_, h| !h.is_finished());
    if purged > 0 {
        info!(
            component = COMPONENT,
            event = "history_cleanup",
            purged,
            retained = core.history.len(),
            "job history cleaned up"
        );
    }
    purged
}
