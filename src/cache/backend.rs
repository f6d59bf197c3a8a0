// Package cache exposes the interface of the shared distributed tier.

use async_trait::async_trait;
use bytes::Bytes;

use super::error::CacheError;
use super::pattern::KeyPattern;
use super::ttl::EntryOptions;

/// DistributedCache is the shared tier reachable by every node.
///
/// Implementations report connectivity problems as `CacheError::Transport`;
/// the tiered cache absorbs them. A successful `get` renews the sliding
/// window of the entry it returns.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Gets the raw value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Stores `value` under `key` with the given expiration.
    async fn set(&self, key: &str, value: Bytes, opts: EntryOptions) -> Result<(), CacheError>;

    /// Removes `key`. Returns whether the key existed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Lists up to `limit` keys matching `pattern`.
    async fn scan(&self, pattern: &KeyPattern, limit: usize) -> Result<Vec<String>, CacheError>;

    /// Backend name used in logs.
    fn name(&self) -> &'static str;
}
