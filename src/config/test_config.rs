use super::{Cache, Config, FleetBox, Local, Logs, Runtime, Scheduler};
use std::time::Duration;

/// Creates a new test configuration.
///
/// Intervals are shrunk to milliseconds so scheduler scenarios finish quickly;
/// maintenance ticks are pushed far out so they never interfere.
pub fn new_test_config() -> Config {
    Config {
        fleet: FleetBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            runtime: Some(Runtime { num_cpus: 2 }),
            metrics: None,
            scheduler: Scheduler {
                max_concurrent_jobs: 5,
                max_queued_jobs: 1_000,
                poll_interval: Duration::from_millis(10),
                job_timeout: Duration::from_secs(5),
                retry_base_delay: Duration::from_millis(5),
                max_retry_delay: Duration::from_millis(100),
                shutdown_timeout: Duration::from_secs(2),
                metrics_interval: Duration::from_secs(3600),
                cleanup_interval: Duration::from_secs(3600),
                history_retention: Duration::from_secs(3600),
                ..Scheduler::default()
            },
            cache: Cache {
                distributed_timeout: Duration::from_millis(200),
                local: Local {
                    capacity_bytes: 1 << 20,
                },
                ..Cache::default()
            },
        },
    }
}
