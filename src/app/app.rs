// Fleet core application: tiered cache plus job scheduler.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{DistributedCache, MemoryBackend, TieredCache};
use crate::config::{self, Config, ConfigTrait, DistributedKind};
use crate::events::{EventLogger, TracingEventLogger};
use crate::metrics::{MetricsRecorder, PrometheusRecorder};
use crate::scheduler::{JobScheduler, ShutdownReport};

/// How often the cache janitor purges expired local entries.
const JANITOR_EVERY: Duration = Duration::from_secs(30);

/// Encapsulates the application state.
pub struct App {
    cfg: Config,
    shutdown_token: CancellationToken,
    cache: TieredCache,
    scheduler: JobScheduler,
}

impl App {
    /// Creates the application with the production metrics and event sinks.
    pub async fn new(shutdown_token: CancellationToken, cfg: Config) -> Result<Self> {
        let metrics: Arc<dyn MetricsRecorder> = Arc::new(PrometheusRecorder::new());
        let events: Arc<dyn EventLogger> = Arc::new(TracingEventLogger::new());
        let distributed = connect_distributed(cfg.cache()).await?;
        Ok(Self::with_parts(shutdown_token, cfg, distributed, metrics, events))
    }

    /// Creates the application from explicit collaborators.
    pub fn with_parts(
        shutdown_token: CancellationToken,
        cfg: Config,
        distributed: Arc<dyn DistributedCache>,
        metrics: Arc<dyn MetricsRecorder>,
        events: Arc<dyn EventLogger>,
    ) -> Self {
        let cache = TieredCache::new(cfg.cache(), distributed, metrics.clone(), events.clone());
        let scheduler = JobScheduler::new(cfg.scheduler().clone(), metrics, events);
        scheduler.attach_cache(cache.clone());

        Self {
            cfg,
            shutdown_token,
            cache,
            scheduler,
        }
    }

    /// Starts the scheduler loops and the cache janitor.
    pub fn serve(&self) -> Result<()> {
        self.scheduler.start().context("start job scheduler")?;
        self.cache
            .spawn_janitor(self.shutdown_token.child_token(), JANITOR_EVERY);

        info!(
            component = "app",
            event = "started",
            env = %self.cfg.fleet.env,
            distributed_backend = self.cache.statistics().distributed_backend,
            "application lifecycle"
        );
        Ok(())
    }

    /// Stops the scheduler; the janitor follows the shutdown token.
    pub async fn close(&self) -> ShutdownReport {
        let report = self.scheduler.stop().await;
        if report.graceful {
            info!(
                component = "app",
                event = "closed",
                drained = report.drained,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "application closed"
            );
        } else {
            warn!(
                component = "app",
                event = "closed",
                abandoned = report.abandoned,
                drained = report.drained,
                "application closed with abandoned jobs"
            );
        }
        report
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }
}

/// Builds the configured distributed tier.
async fn connect_distributed(cfg: &config::Cache) -> Result<Arc<dyn DistributedCache>> {
    match cfg.distributed.backend {
        DistributedKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        DistributedKind::Redis => connect_redis(cfg).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(cfg: &config::Cache) -> Result<Arc<dyn DistributedCache>> {
    let url = cfg
        .distributed
        .url
        .as_deref()
        .context("cache.distributed.url is required for the redis backend")?;
    let backend = tokio::time::timeout(
        cfg.distributed_timeout.max(Duration::from_secs(5)),
        crate::cache::RedisBackend::connect(url),
    )
    .await
    .context("connect to redis: timed out")?
    .context("connect to redis")?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_cfg: &config::Cache) -> Result<Arc<dyn DistributedCache>> {
    anyhow::bail!("redis backend configured but fleetcore was built without the `redis` feature")
}
