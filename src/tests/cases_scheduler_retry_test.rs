use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::scheduler::{work_fn, JobRequest, JobStatus};
use crate::support::jobs::*;
use crate::support::wait_for;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_failing_job_runs_at_most_max_retries_plus_one_times() {
    let fx = new_scheduler_with(|s| {
        s.max_retries.insert("printer_status_sync".to_string(), 2);
    });
    let s = &fx.scheduler;
    s.start().unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let id = s
        .enqueue(JobRequest::new("printer_status_sync", "sync printer 7", failing_job(attempts.clone(), u32::MAX)))
        .unwrap();

    let job = wait_terminal(s, id, WAIT).await.expect("job should fail permanently");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(job.attempts, 3);
    assert_eq!(job.retry_count, 2);
    assert!(job.last_retry_at.is_some());
    assert!(job.last_error.as_deref().unwrap_or_default().contains("unreachable"));

    let stats = s.statistics();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.completed, 0);

    assert_eq!(fx.events.count("job_retry_scheduled"), 2);
    assert_eq!(fx.events.count("job_failed"), 1);
    let failed = &fx.events.attributes_of("job_failed")[0];
    assert_eq!(failed["job_type"], "printer_status_sync");
    assert_eq!(failed["retry_count"], "2");
    assert_eq!(fx.metrics.outcomes("printer_status_sync"), (0, 3));
    s.stop().await;
}

#[tokio::test]
async fn test_job_succeeds_after_transient_failures() {
    let fx = new_scheduler();
    let s = &fx.scheduler;
    s.start().unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    // alert_dispatch allows five retries.
    let id = s
        .enqueue(JobRequest::new("alert_dispatch", "toner low", failing_job(attempts.clone(), 2)))
        .unwrap();

    let job = wait_terminal(s, id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.attempts, 3);
    assert!(job.duration().is_some());
    assert_eq!(fx.metrics.outcomes("alert_dispatch"), (1, 2));
    assert_eq!(s.statistics().failed, 0);
    s.stop().await;
}

#[tokio::test]
async fn test_unknown_job_type_uses_default_budget() {
    let fx = new_scheduler();
    let s = &fx.scheduler;
    s.start().unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let id = s
        .enqueue(JobRequest::new("firmware_audit", "audit", failing_job(attempts.clone(), u32::MAX)))
        .unwrap();

    let job = wait_terminal(s, id, WAIT).await.unwrap();
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    s.stop().await;
}

#[tokio::test]
async fn test_timeout_is_retried_then_terminal() {
    let fx = new_scheduler_with(|s| {
        s.job_timeout = Duration::from_millis(50);
        s.max_retries.insert("report_render".to_string(), 1);
    });
    let s = &fx.scheduler;
    s.start().unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let work = work_fn(move |ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ctx.cancelled().await;
            anyhow::bail!("render aborted")
        }
    });
    let id = s.enqueue(JobRequest::new("report_render", "monthly", work)).unwrap();

    let job = wait_terminal(s, id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::TimedOut);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(job.last_error.as_deref().unwrap_or_default().contains("timeout"));

    let stats = s.statistics();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.retried, 1);
    assert_eq!(fx.events.count("job_timed_out"), 1);
    s.stop().await;
}

#[tokio::test]
async fn test_panicking_job_is_a_failure() {
    let fx = new_scheduler_with(|s| {
        s.max_retries.insert("bad_parser".to_string(), 0);
    });
    let s = &fx.scheduler;
    s.start().unwrap();

    let work = work_fn(|_ctx| async move {
        if true {
            panic!("malformed SNMP payload");
        }
        Ok(())
    });
    let id = s.enqueue(JobRequest::new("bad_parser", "parse", work)).unwrap();

    let job = wait_terminal(s, id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.as_deref().unwrap_or_default().contains("malformed SNMP payload"));
    assert!(wait_for(WAIT, || s.statistics().active_jobs == 0).await);
    s.stop().await;
}
