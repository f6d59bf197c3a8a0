// Scheduler fixtures and job builders.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, ConfigTrait};
use crate::scheduler::{work_fn, JobId, JobInfo, JobScheduler, JobWork};

use super::common::{wait_for, RecordingEvents, RecordingMetrics};

pub struct SchedulerFixture {
    pub scheduler: JobScheduler,
    pub events: Arc<RecordingEvents>,
    pub metrics: Arc<RecordingMetrics>,
}

/// Builds a scheduler from the test config, adjusted by `tune`. Not started.
pub fn new_scheduler_with(tune: impl FnOnce(&mut config::Scheduler)) -> SchedulerFixture {
    let mut cfg = config::new_test_config().scheduler().clone();
    tune(&mut cfg);

    let events = Arc::new(RecordingEvents::new());
    let metrics = Arc::new(RecordingMetrics::new());
    let scheduler = JobScheduler::new(cfg, metrics.clone(), events.clone());
    SchedulerFixture {
        scheduler,
        events,
        metrics,
    }
}

pub fn new_scheduler() -> SchedulerFixture {
    new_scheduler_with(|_| {})
}

/// Waits until the job reaches a terminal state and returns its snapshot.
pub async fn wait_terminal(s: &JobScheduler, id: JobId, timeout: Duration) -> Option<JobInfo> {
    let done = wait_for(timeout, || s.job(id).map_or(false, |j| j.status.is_terminal())).await;
    if done {
        s.job(id)
    } else {
        None
    }
}

/// Work that appends `name` to `log` and sleeps for `hold`.
pub fn logging_job(log: Arc<Mutex<Vec<String>>>, name: &str, hold: Duration) -> Arc<dyn JobWork> {
    let name = name.to_string();
    work_fn(move |_ctx| {
        let log = log.clone();
        let name = name.clone();
        async move {
            log.lock().push(name);
            tokio::time::sleep(hold).await;
            Ok(())
        }
    })
}

/// Work that counts attempts and fails the first `failures` of them.
pub fn failing_job(attempts: Arc<AtomicU32>, failures: u32) -> Arc<dyn JobWork> {
    work_fn(move |_ctx| {
        let attempts = attempts.clone();
        async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                anyhow::bail!("printer 10.1.2.3 unreachable (attempt {n})");
            }
            Ok(())
        }
    })
}

/// Work that waits for cancellation and then reports it as an error.
pub fn cooperative_job(hold: Duration) -> Arc<dyn JobWork> {
    work_fn(move |ctx| async move {
        tokio::select! {
            _ = ctx.cancelled() => anyhow::bail!("interrupted"),
            _ = tokio::time::sleep(hold) => Ok(()),
        }
    })
}

/// Work that ignores cancellation entirely.
pub fn stubborn_job(hold: Duration) -> Arc<dyn JobWork> {
    work_fn(move |_ctx| async move {
        tokio::time::sleep(hold).await;
        Ok(())
    })
}
