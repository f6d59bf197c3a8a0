// Package cache provides an in-process distributed tier stand-in.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::time::Instant;

use super::backend::DistributedCache;
use super::error::CacheError;
use super::pattern::KeyPattern;
use super::ttl::{EntryOptions, Expiry};

struct Stored {
    value: Bytes,
    expiry: Expiry,
}

/// Distributed tier kept in process memory.
///
/// Used when no Redis is configured and throughout the tests. It honours
/// the same absolute + sliding expiration as a real server would.
#[derive(Default)]
pub struct MemoryBackend {
    items: DashMap<String, Stored>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks for a live key without renewing it.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.items.get(key).map_or(false, |s| !s.expiry.is_expired(now))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.items.iter().filter(|s| !s.value().expiry.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DistributedCache for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        if let Some(mut stored) = self.items.get_mut(key) {
            if !stored.expiry.is_expired(now) {
                stored.expiry.touch(now);
                return Ok(Some(stored.value.clone()));
            }
        }
        self.items.remove_if(key, |_, s| s.expiry.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, opts: EntryOptions) -> Result<(), CacheError> {
        let stored = Stored {
            value,
            expiry: Expiry::new(Instant::now(), opts),
        };
        self.items.insert(key.to_string(), stored);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .items
            .remove(key)
            .map_or(false, |(_, s)| !s.expiry.is_expired(now)))
    }

    async fn scan(&self, pattern: &KeyPattern, limit: usize) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .items
            .iter()
            .filter(|s| !s.value().expiry.is_expired(now) && pattern.matches(s.key()))
            .take(limit)
            .map(|s| s.key().clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
