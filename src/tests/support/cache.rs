// Cache fixtures: a distributed tier that can be taken down on demand.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheError, DistributedCache, EntryOptions, KeyPattern, MemoryBackend, TieredCache};
use crate::config::{self, ConfigTrait};

use super::common::{RecordingEvents, RecordingMetrics};

/// Memory backend with an outage switch and a hang switch.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    down: AtomicBool,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call fails with a transport error while down.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Every call blocks far longer than any test timeout while hanging.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    async fn check(&self) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::Transport("connection refused 10.0.0.7:6379".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DistributedCache for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.check().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, opts: EntryOptions) -> Result<(), CacheError> {
        self.check().await?;
        self.inner.set(key, value, opts).await
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        self.check().await?;
        self.inner.remove(key).await
    }

    async fn scan(&self, pattern: &KeyPattern, limit: usize) -> Result<Vec<String>, CacheError> {
        self.check().await?;
        self.inner.scan(pattern, limit).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// A tiered cache under test with handles on its collaborators.
pub struct CacheFixture {
    pub cache: TieredCache,
    pub backend: Arc<FlakyBackend>,
    pub events: Arc<RecordingEvents>,
    pub metrics: Arc<RecordingMetrics>,
}

/// Builds a tiered cache from the test config, adjusted by `tune`.
pub fn new_cache_with(tune: impl FnOnce(&mut config::Cache)) -> CacheFixture {
    let mut cfg = config::new_test_config().cache().clone();
    tune(&mut cfg);

    let backend = FlakyBackend::new();
    let events = Arc::new(RecordingEvents::new());
    let metrics = Arc::new(RecordingMetrics::new());
    let cache = TieredCache::new(&cfg, backend.clone(), metrics.clone(), events.clone());
    CacheFixture {
        cache,
        backend,
        events,
        metrics,
    }
}

pub fn new_cache() -> CacheFixture {
    new_cache_with(|_| {})
}
