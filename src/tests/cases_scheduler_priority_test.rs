use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::scheduler::{JobPriority, JobRequest, JobStatus};
use crate::support::jobs::*;
use crate::support::wait_for;

const HOLD: Duration = Duration::from_millis(20);

#[tokio::test]
async fn test_high_jobs_run_before_normal_with_single_slot() {
    let fx = new_scheduler_with(|s| s.max_concurrent_jobs = 1);
    let s = &fx.scheduler;
    let log = Arc::new(Mutex::new(Vec::new()));

    // Interleaved submission; tiers decide the order, not arrival.
    for (name, p) in [
        ("N1", JobPriority::Normal),
        ("H1", JobPriority::High),
        ("N2", JobPriority::Normal),
        ("H2", JobPriority::High),
        ("H3", JobPriority::High),
    ] {
        s.enqueue(JobRequest::new("supply_level_report", name, logging_job(log.clone(), name, HOLD)).priority(p))
            .unwrap();
    }
    s.start().unwrap();

    assert!(wait_for(Duration::from_secs(5), || s.statistics().completed == 5).await);
    assert_eq!(*log.lock(), vec!["H1", "H2", "H3", "N1", "N2"]);
    s.stop().await;
}

#[tokio::test]
async fn test_low_job_waits_while_high_job_is_queued() {
    let fx = new_scheduler_with(|s| s.max_concurrent_jobs = 1);
    let s = &fx.scheduler;
    let log = Arc::new(Mutex::new(Vec::new()));
    s.start().unwrap();

    let blocker = s
        .enqueue(JobRequest::new("printer_status_sync", "blocker", logging_job(log.clone(), "blocker", Duration::from_millis(100))))
        .unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        s.job(blocker).map_or(false, |j| j.status == JobStatus::Processing)
    })
    .await);

    s.enqueue(JobRequest::new("maintenance_cleanup", "low", logging_job(log.clone(), "low", HOLD)).priority(JobPriority::Low))
        .unwrap();
    s.enqueue(JobRequest::new("alert_dispatch", "high", logging_job(log.clone(), "high", HOLD)).priority(JobPriority::High))
        .unwrap();

    assert!(wait_for(Duration::from_secs(5), || s.statistics().completed == 3).await);
    assert_eq!(*log.lock(), vec!["blocker", "high", "low"]);
    s.stop().await;
}

#[tokio::test]
async fn test_fifo_within_one_tier() {
    let fx = new_scheduler_with(|s| s.max_concurrent_jobs = 1);
    let s = &fx.scheduler;
    let log = Arc::new(Mutex::new(Vec::new()));

    let names: Vec<String> = (0..6).map(|i| format!("job-{i}")).collect();
    for name in &names {
        s.enqueue(JobRequest::new("cache_warmup", name.as_str(), logging_job(log.clone(), name, Duration::ZERO)))
            .unwrap();
    }
    s.start().unwrap();

    assert!(wait_for(Duration::from_secs(5), || s.statistics().completed == 6).await);
    assert_eq!(*log.lock(), names);
    s.stop().await;
}
