use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::scheduler::{
    work_fn, EnqueueError, JobPriority, JobRequest, JobStatus, JobWork, METRICS_JOB_TYPE,
};
use crate::support::jobs::*;
use crate::support::wait_for;

const WAIT: Duration = Duration::from_secs(5);

// Tracks how many copies run at once and the highest value seen.
fn gauge_job(running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Arc<dyn JobWork> {
    work_fn(move |_ctx| {
        let running = running.clone();
        let peak = peak.clone();
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_ceiling_is_never_exceeded() {
    let fx = new_scheduler_with(|s| s.max_concurrent_jobs = 3);
    let s = &fx.scheduler;
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for i in 0..12 {
        let p = JobPriority::ALL[i % 3];
        s.enqueue(
            JobRequest::new("printer_status_sync", format!("printer {i}"), gauge_job(running.clone(), peak.clone()))
                .priority(p),
        )
        .unwrap();
    }
    s.start().unwrap();

    assert!(wait_for(WAIT, || s.statistics().completed == 12).await);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    assert!(peak >= 2, "jobs never overlapped");
    assert!(s.statistics().active_jobs <= 3);
    s.stop().await;
}

#[tokio::test]
async fn test_queue_full_rejects_without_side_effects() {
    let fx = new_scheduler_with(|s| s.max_queued_jobs = 3);
    let s = &fx.scheduler;

    for i in 0..3 {
        s.enqueue(JobRequest::new("alert_dispatch", format!("alert {i}"), stubborn_job(Duration::ZERO)))
            .unwrap();
    }
    let res = s.enqueue(
        JobRequest::new("alert_dispatch", "one too many", stubborn_job(Duration::ZERO)).priority(JobPriority::High),
    );
    assert_eq!(res, Err(EnqueueError::QueueFull { capacity: 3 }));

    let stats = s.statistics();
    assert_eq!(stats.queued_total, 3);
    assert_eq!(stats.queued_high, 0);
    assert_eq!(stats.rejected, 1);

    let report = s.stop().await;
    assert_eq!(report.drained, 3);
}

#[tokio::test]
async fn test_params_and_timestamps_are_recorded() {
    let fx = new_scheduler();
    let s = &fx.scheduler;
    s.start().unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(None));
    let seen_in_job = seen.clone();
    let work = work_fn(move |ctx| {
        let seen = seen_in_job.clone();
        async move {
            *seen.lock() = ctx.param("printer_id").cloned();
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }
    });
    let id = s
        .enqueue(JobRequest::new("supply_level_report", "report", work).param("printer_id", 42))
        .unwrap();

    let job = wait_terminal(s, id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(*seen.lock(), Some(serde_json::json!(42)));
    assert_eq!(job.parameters["printer_id"], serde_json::json!(42));
    assert!(job.started_at.is_some());
    assert!(job.duration().unwrap() >= Duration::from_millis(15));

    let stats = s.statistics();
    assert!(stats.average_duration_ms >= 15.0);
    assert!(stats.last_completed_at.is_some());
    s.stop().await;
}

#[tokio::test]
async fn test_history_cleanup_purges_only_finished_jobs() {
    let fx = new_scheduler_with(|s| s.history_retention = Duration::ZERO);
    let s = &fx.scheduler;
    s.start().unwrap();

    let done = s
        .enqueue(JobRequest::new("maintenance_cleanup", "done", stubborn_job(Duration::ZERO)))
        .unwrap();
    assert!(wait_terminal(s, done, WAIT).await.is_some());
    let busy = s
        .enqueue(JobRequest::new("maintenance_cleanup", "busy", cooperative_job(Duration::from_secs(10))))
        .unwrap();
    assert!(wait_for(WAIT, || s.job(busy).map_or(false, |j| j.status == JobStatus::Processing)).await);

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(s.cleanup_history_now(), 1);
    assert!(s.job(done).is_none());
    assert!(s.job(busy).is_some());
    s.stop().await;
}

#[tokio::test]
async fn test_metrics_collection_runs_as_a_low_priority_job() {
    let fx = new_scheduler();
    let s = &fx.scheduler;
    s.start().unwrap();

    s.collect_metrics_now();
    assert!(wait_for(WAIT, || fx.metrics.outcomes(METRICS_JOB_TYPE) == (1, 0)).await);
    assert!(wait_for(WAIT, || s.statistics().completed == 1).await);
    s.stop().await;
}
