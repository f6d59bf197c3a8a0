// Package cache implements the two-tier cache facade.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config;
use crate::dedlog;
use crate::events::{attrs, EventLevel, EventLogger};
use crate::metrics::meter;
use crate::metrics::MetricsRecorder;

use super::backend::DistributedCache;
use super::error::{validate_key, CacheError};
use super::local::LocalCache;
use super::pattern::KeyPattern;
use super::stats::{CacheStats, Counters, LocalFigures};
use super::ttl::{EntryOptions, TtlTable};

const COMPONENT: &str = "cache";

/// TieredCache fronts a shared distributed tier with a bounded local tier.
///
/// Reads go to the distributed tier first and fall back to the local one;
/// writes go to both. The distributed tier may be unreachable at any time:
/// its errors are logged, counted and otherwise ignored, so callers only
/// ever see key, pattern or serialization errors.
///
/// Cloning is cheap and every clone shares the same tiers.
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

struct Inner {
    local: LocalCache,
    distributed: Arc<dyn DistributedCache>,
    ttl: TtlTable,
    distributed_timeout: Duration,
    bulk_concurrency: usize,
    clear_scan_limit: usize,
    counters: Counters,
    degraded: AtomicBool,
    published_evictions: AtomicU64,
    metrics: Arc<dyn MetricsRecorder>,
    events: Arc<dyn EventLogger>,
}

impl TieredCache {
    pub fn new(
        cfg: &config::Cache,
        distributed: Arc<dyn DistributedCache>,
        metrics: Arc<dyn MetricsRecorder>,
        events: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                local: LocalCache::new(cfg.local.capacity_bytes),
                distributed,
                ttl: TtlTable::new(&cfg.ttl_rules, cfg.default_ttl),
                distributed_timeout: cfg.distributed_timeout,
                bulk_concurrency: cfg.bulk_concurrency.max(1),
                clear_scan_limit: cfg.clear_scan_limit,
                counters: Counters::new(),
                degraded: AtomicBool::new(false),
                published_evictions: AtomicU64::new(0),
                metrics,
                events,
            }),
        }
    }

    /// Gets a value. Returns `Ok(None)` when neither tier holds a decodable one.
    ///
    /// The recorder sees the operation as failed when the distributed leg did,
    /// even if the local tier answered.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        validate_key(key)?;
        let started = Instant::now();
        let (value, distributed_ok) = self.inner.lookup(key).await;
        let elapsed = started.elapsed();
        self.inner.counters.record_get(elapsed);
        self.inner.metrics.record_job_execution("cache_get", distributed_ok, elapsed);
        Ok(value)
    }

    /// Stores a value in both tiers under the TTL resolved for `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        validate_key(key)?;
        let started = Instant::now();
        let raw = Bytes::from(serde_json::to_vec(value)?);
        let opts = self.inner.ttl.options(key);

        // Transport errors are already logged and counted.
        let distributed_ok = self
            .inner
            .call("set", self.inner.distributed.set(key, raw.clone(), opts))
            .await
            .is_ok();

        let size = raw.len();
        if !self.inner.local.set(key, raw, size, opts) {
            debug!(component = COMPONENT, key, size, "value exceeds local capacity, stored remotely only");
        }

        let elapsed = started.elapsed();
        self.inner.counters.record_set(elapsed);
        self.inner.metrics.record_job_execution("cache_set", distributed_ok, elapsed);
        Ok(())
    }

    /// Removes `key` from both tiers. Returns whether any tier held it.
    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;
        let started = Instant::now();
        let (removed, distributed_ok) = self.inner.remove_both(key).await;
        self.inner
            .metrics
            .record_job_execution("cache_remove", distributed_ok, started.elapsed());
        Ok(removed)
    }

    /// Gets many keys concurrently. A key that fails is reported as `None`.
    pub async fn get_multiple<T, K>(&self, keys: impl IntoIterator<Item = K>) -> HashMap<String, Option<T>>
    where
        T: DeserializeOwned + Send,
        K: Into<String>,
    {
        stream::iter(keys.into_iter().map(Into::into))
            .map(|key: String| async move {
                let value = self.get::<T>(&key).await.ok().flatten();
                (key, value)
            })
            .buffer_unordered(self.inner.bulk_concurrency)
            .collect()
            .await
    }

    /// Sets many entries concurrently and reports the outcome per key.
    pub async fn set_multiple<T, K>(
        &self,
        entries: impl IntoIterator<Item = (K, T)>,
    ) -> HashMap<String, Result<(), CacheError>>
    where
        T: Serialize + Send + Sync,
        K: Into<String>,
    {
        stream::iter(entries.into_iter().map(|(k, v)| (k.into(), v)))
            .map(|(key, value): (String, T)| async move {
                let res = self.set(&key, &value).await;
                (key, res)
            })
            .buffer_unordered(self.inner.bulk_concurrency)
            .collect()
            .await
    }

    /// Removes every key matching the glob `pattern` from both tiers.
    /// Returns the number of distinct keys removed.
    pub async fn clear_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let pattern = KeyPattern::new(pattern)?;
        let started = Instant::now();
        let limit = self.inner.clear_scan_limit;

        let mut keys: HashSet<String> = self.inner.local.keys_matching(&pattern, limit).into_iter().collect();
        let scanned = self
            .inner
            .call("scan", self.inner.distributed.scan(&pattern, limit))
            .await;
        let mut distributed_ok = scanned.is_ok();
        if let Ok(remote) = scanned {
            keys.extend(remote);
        }

        let outcomes: Vec<(bool, bool)> = stream::iter(keys)
            .map(|key| async move { self.inner.remove_both(&key).await })
            .buffer_unordered(self.inner.bulk_concurrency)
            .collect()
            .await;
        let removed = outcomes.iter().filter(|(removed, _)| *removed).count();
        distributed_ok &= outcomes.iter().all(|(_, ok)| *ok);
        self.inner
            .metrics
            .record_job_execution("cache_clear", distributed_ok, started.elapsed());

        info!(
            component = COMPONENT,
            event = "cache_cleared",
            pattern = pattern.as_glob(),
            removed,
            "keys cleared by pattern"
        );
        Ok(removed)
    }

    /// Resolves the TTL that a write of `key` would get.
    pub fn resolve_ttl(&self, key: &str) -> Duration {
        self.inner.ttl.resolve(key)
    }

    /// Snapshot of counters and tier figures.
    pub fn statistics(&self) -> CacheStats {
        let local = &self.inner.local;
        CacheStats::snapshot(
            &self.inner.counters,
            LocalFigures {
                entries: local.len(),
                bytes: local.mem(),
                capacity_bytes: local.capacity(),
                evictions: local.evictions(),
                expirations: local.expirations(),
            },
            self.inner.distributed.name(),
            self.is_degraded(),
        )
    }

    /// Whether the last distributed call failed.
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Relaxed)
    }

    /// The local tier.
    pub fn local(&self) -> &LocalCache {
        &self.inner.local
    }

    /// Publishes cache gauges and the eviction counter delta.
    pub fn publish_gauges(&self) {
        let local = &self.inner.local;
        meter::set_local_cache_usage(local.mem().max(0) as usize, local.len());
        meter::set_is_cache_degraded(self.is_degraded());

        let evictions = local.evictions();
        let published = self.inner.published_evictions.swap(evictions, Ordering::Relaxed);
        if evictions > published {
            meter::add_local_evictions(evictions - published);
        }
    }

    /// Periodically purges expired local entries and publishes gauges until `shutdown`.
    pub fn spawn_janitor(&self, shutdown: CancellationToken, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!(component = COMPONENT, event = "janitor_stopped", "cache janitor stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let purged = cache.inner.local.purge_expired();
                        if purged > 0 {
                            debug!(component = COMPONENT, purged, "expired local entries purged");
                        }
                        cache.publish_gauges();
                    }
                }
            }
        })
    }
}

impl Inner {
    /// Returns the value and whether the distributed call succeeded.
    async fn lookup<T: DeserializeOwned>(self: &Arc<Self>, key: &str) -> (Option<T>, bool) {
        let distributed_ok = match self.call("get", self.distributed.get(key)).await {
            Ok(Some(raw)) => match serde_json::from_slice::<T>(&raw) {
                Ok(value) => {
                    self.counters.distributed_hits.fetch_add(1, Ordering::Relaxed);
                    meter::add_cache_hit("distributed");
                    return (Some(value), true);
                }
                Err(e) => {
                    dedlog::warn(Some(&e), Some(key), "undecodable value in distributed cache");
                    self.counters.distributed_misses.fetch_add(1, Ordering::Relaxed);
                    true
                }
            },
            Ok(None) => {
                self.counters.distributed_misses.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        };

        let Some((raw, remaining)) = self.local.get_with_remaining(key) else {
            self.counters.local_misses.fetch_add(1, Ordering::Relaxed);
            meter::add_cache_miss();
            return (None, distributed_ok);
        };
        let value = match serde_json::from_slice::<T>(&raw) {
            Ok(value) => {
                self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                meter::add_cache_hit("local");
                if distributed_ok {
                    self.promote(key, raw, remaining);
                }
                Some(value)
            }
            Err(e) => {
                dedlog::warn(Some(&e), Some(key), "undecodable value in local cache");
                self.local.remove(key);
                self.counters.local_misses.fetch_add(1, Ordering::Relaxed);
                meter::add_cache_miss();
                None
            }
        };
        (value, distributed_ok)
    }

    // Fire-and-forget copy of a local-only hit into the distributed tier.
    // The copy keeps the entry's remaining absolute lifetime.
    fn promote(self: &Arc<Self>, key: &str, raw: Bytes, remaining: Duration) {
        if remaining.is_zero() {
            return;
        }
        let resolved = self.ttl.options(key);
        let opts = EntryOptions {
            absolute: remaining,
            sliding: resolved.sliding.min(remaining),
        };
        let inner = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            if inner
                .call("promote", inner.distributed.set(&key, raw, opts))
                .await
                .is_ok()
            {
                inner.counters.promotions.fetch_add(1, Ordering::Relaxed);
                meter::add_cache_promotion();
                debug!(component = COMPONENT, key = %key, "local hit promoted to distributed tier");
            }
        });
    }

    /// Returns whether any tier held `key` and whether the distributed call succeeded.
    async fn remove_both(&self, key: &str) -> (bool, bool) {
        let remote = self.call("remove", self.distributed.remove(key)).await;
        let local = self.local.remove(key);
        let distributed_ok = remote.is_ok();
        (remote.unwrap_or(false) || local, distributed_ok)
    }

    /// Runs one distributed call under the timeout and tracks tier health.
    async fn call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        let res = match tokio::time::timeout(self.distributed_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(CacheError::Transport(format!(
                "{} timed out after {:?}",
                op, self.distributed_timeout
            ))),
        };
        match &res {
            Ok(_) => self.mark_healthy(),
            Err(e) => self.mark_failed(op, e),
        }
        res
    }

    fn mark_failed(&self, op: &'static str, e: &CacheError) {
        self.counters.distributed_errors.fetch_add(1, Ordering::Relaxed);
        meter::add_cache_transport_error(op);
        dedlog::warn(Some(e), Some(op), "distributed cache call failed");

        if !self.degraded.swap(true, Ordering::AcqRel) {
            meter::set_is_cache_degraded(true);
            self.events.log_event(
                "cache_degraded",
                "distributed cache unavailable, serving from local tier",
                EventLevel::Warn,
                &attrs([
                    ("backend", self.distributed.name().to_string()),
                    ("operation", op.to_string()),
                    ("error", e.to_string()),
                ]),
            );
        }
    }

    fn mark_healthy(&self) {
        if self.degraded.load(Ordering::Relaxed) && self.degraded.swap(false, Ordering::AcqRel) {
            meter::set_is_cache_degraded(false);
            self.events.log_event(
                "cache_recovered",
                "distributed cache reachable again",
                EventLevel::Info,
                &attrs([("backend", self.distributed.name().to_string())]),
            );
        }
    }
}
