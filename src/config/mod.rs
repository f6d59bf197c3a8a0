// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const TEST: &str = "test";

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 5;
pub const DEFAULT_MAX_QUEUED_JOBS: usize = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_LOCAL_CAPACITY_BYTES: usize = 64 << 20;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Fleet {
    #[serde(rename = "fleet")]
    pub fleet: FleetBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FleetBox {
    #[serde(default = "default_env")]
    pub env: String,
    pub logs: Option<Logs>,
    pub runtime: Option<Runtime>,
    pub metrics: Option<Metrics>,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub cache: Cache,
}

fn default_env() -> String {
    DEV.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Runtime {
    pub num_cpus: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metrics {
    pub enabled: bool,
    /// Prometheus exporter listen address, e.g. `0.0.0.0:9090`.
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Scheduler {
    pub max_concurrent_jobs: usize,
    pub max_queued_jobs: usize,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub job_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_retry_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub metrics_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub history_retention: Duration,
    pub default_max_retries: u32,
    /// Retry budget per job type; unknown types use `default_max_retries`.
    pub max_retries: HashMap<String, u32>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            max_queued_jobs: DEFAULT_MAX_QUEUED_JOBS,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(30 * 60),
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(10 * 60),
            shutdown_timeout: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            history_retention: Duration::from_secs(24 * 60 * 60),
            default_max_retries: DEFAULT_MAX_RETRIES,
            max_retries: default_retry_budgets(),
        }
    }
}

/// Built-in retry budgets for the job types the fleet backend enqueues.
pub fn default_retry_budgets() -> HashMap<String, u32> {
    [
        ("metrics_collection", 1),
        ("printer_status_sync", 5),
        ("supply_level_report", 2),
        ("alert_dispatch", 5),
        ("cache_warmup", 2),
        ("maintenance_cleanup", 3),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TtlRule {
    pub prefix: String,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributedKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Distributed {
    pub backend: DistributedKind,
    pub url: Option<String>,
}

impl Default for Distributed {
    fn default() -> Self {
        Self {
            backend: DistributedKind::Memory,
            url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Local {
    pub capacity_bytes: usize,
}

impl Default for Local {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_LOCAL_CAPACITY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Cache {
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    pub ttl_rules: Vec<TtlRule>,
    pub bulk_concurrency: usize,
    pub clear_scan_limit: usize,
    #[serde(with = "humantime_serde")]
    pub distributed_timeout: Duration,
    pub local: Local,
    pub distributed: Distributed,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            ttl_rules: default_ttl_rules(),
            bulk_concurrency: 16,
            clear_scan_limit: 10_000,
            distributed_timeout: Duration::from_millis(500),
            local: Local::default(),
            distributed: Distributed::default(),
        }
    }
}

/// Key-prefix TTLs for the fleet data families.
pub fn default_ttl_rules() -> Vec<TtlRule> {
    const MIN: u64 = 60;
    [
        ("catalog:", 60 * MIN),
        ("printer:model:", 120 * MIN),
        ("printer:config:", 30 * MIN),
        ("printer:status:", MIN),
        ("metrics:", 5 * MIN),
        ("report:", 30 * MIN),
        ("session:", 20 * MIN),
        ("user:", 15 * MIN),
        ("alert:", 30),
        ("critical:", 10),
    ]
    .into_iter()
    .map(|(prefix, secs)| TtlRule {
        prefix: prefix.to_string(),
        ttl: Duration::from_secs(secs),
    })
    .collect()
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn runtime(&self) -> &Runtime;
    fn metrics(&self) -> Option<&Metrics>;
    fn scheduler(&self) -> &Scheduler;
    fn cache(&self) -> &Cache;
}

// Config type alias for convenience
pub type Config = Fleet;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.fleet.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.fleet.env == PROD
    }

    fn is_test(&self) -> bool {
        self.fleet.env == TEST
    }

    fn runtime(&self) -> &Runtime {
        static AUTO: Runtime = Runtime { num_cpus: 0 };
        self.fleet.runtime.as_ref().unwrap_or(&AUTO)
    }

    fn metrics(&self) -> Option<&Metrics> {
        self.fleet.metrics.as_ref()
    }

    fn scheduler(&self) -> &Scheduler {
        &self.fleet.scheduler
    }

    fn cache(&self) -> &Cache {
        &self.fleet.cache
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::from_yaml(&data).with_context(|| format!("load config from {:?}", abs_path))
    }

    /// Parses and validates configuration from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Fleet = serde_yaml::from_str(data).context("unmarshal yaml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let scheduler = self.scheduler();
        if scheduler.max_concurrent_jobs == 0 {
            anyhow::bail!("scheduler.max_concurrent_jobs must be greater than zero");
        }
        if scheduler.max_queued_jobs == 0 {
            anyhow::bail!("scheduler.max_queued_jobs must be greater than zero");
        }
        if scheduler.poll_interval.is_zero() {
            anyhow::bail!("scheduler.poll_interval must be greater than zero");
        }
        if scheduler.job_timeout.is_zero() {
            anyhow::bail!("scheduler.job_timeout must be greater than zero");
        }

        let cache = self.cache();
        if cache.default_ttl.is_zero() {
            anyhow::bail!("cache.default_ttl must be greater than zero");
        }
        for rule in &cache.ttl_rules {
            if rule.prefix.is_empty() {
                anyhow::bail!("cache.ttl_rules contains an empty prefix");
            }
            if rule.ttl.is_zero() {
                anyhow::bail!("cache.ttl_rules[{}] has a zero ttl", rule.prefix);
            }
        }
        if cache.bulk_concurrency == 0 {
            anyhow::bail!("cache.bulk_concurrency must be greater than zero");
        }
        if cache.distributed.backend == DistributedKind::Redis && cache.distributed.url.is_none() {
            anyhow::bail!("cache.distributed.url is required for the redis backend");
        }
        Ok(())
    }
}

mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bundled_config() {
        let cfg = Config::from_yaml(include_str!("../../cfg/fleetcore.cfg.yaml")).unwrap();
        assert_eq!(cfg.scheduler().max_concurrent_jobs, 5);
        assert_eq!(cfg.scheduler().job_timeout, Duration::from_secs(30 * 60));
        assert_eq!(cfg.cache().default_ttl, Duration::from_secs(15 * 60));
        assert!(cfg.cache().ttl_rules.iter().any(|r| r.prefix == "catalog:"));
        assert_eq!(cfg.cache().distributed.backend, DistributedKind::Memory);
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let cfg = Config::from_yaml("fleet:\n  env: prod\n").unwrap();
        assert!(cfg.is_prod());
        assert_eq!(cfg.runtime().num_cpus, 0);
        assert_eq!(cfg.scheduler().max_concurrent_jobs, DEFAULT_MAX_CONCURRENT_JOBS);
        assert_eq!(cfg.scheduler().max_retries.get("alert_dispatch"), Some(&5));
        assert_eq!(cfg.cache().local.capacity_bytes, DEFAULT_LOCAL_CAPACITY_BYTES);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = Config::from_yaml("fleet:\n  scheduler:\n    max_concurrent_jobs: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_concurrent_jobs"));
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let yaml = "fleet:\n  cache:\n    distributed:\n      backend: redis\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_humantime_durations() {
        let yaml = "fleet:\n  scheduler:\n    poll_interval: 250ms\n    job_timeout: 2m\n";
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.scheduler().poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.scheduler().job_timeout, Duration::from_secs(120));
    }
}
