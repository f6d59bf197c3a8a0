// Package cache provides the Redis-backed distributed tier.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use redis::aio::MultiplexedConnection;
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::backend::DistributedCache;
use super::error::CacheError;
use super::pattern::KeyPattern;
use super::ttl::EntryOptions;
use tracing::debug;

// deadline_ms (u64 BE) + sliding_ms (u64 BE) + payload
const HEADER_LEN: usize = 16;
const SCAN_COUNT: usize = 500;

/// Distributed tier backed by Redis.
///
/// Redis expires keys on a single TTL, so sliding expiration is emulated:
/// the key is written with `PX sliding` and the absolute deadline is stored
/// in a small header in front of the value. Every hit renews the key with
/// `PEXPIRE min(sliding, deadline - now)`.
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl RedisBackend {
    /// Opens a multiplexed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(transport)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(transport)?;
        Ok(Self { conn })
    }
}

fn transport(e: redis::RedisError) -> CacheError {
    CacheError::Transport(e.to_string())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn encode(value: &[u8], opts: EntryOptions) -> Bytes {
    let sliding = if opts.sliding.is_zero() { opts.absolute } else { opts.sliding };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + value.len());
    buf.put_u64(now_ms() + opts.absolute.as_millis() as u64);
    buf.put_u64(sliding.as_millis() as u64);
    buf.put_slice(value);
    buf.freeze()
}

/// Splits a stored value into (deadline_ms, sliding_ms, payload).
fn decode(raw: Vec<u8>) -> Option<(u64, u64, Bytes)> {
    if raw.len() < HEADER_LEN {
        return None;
    }
    let mut raw = Bytes::from(raw);
    let deadline = raw.get_u64();
    let sliding = raw.get_u64();
    Some((deadline, sliding, raw))
}

/// PEXPIRE argument for a hit at `now`: the sliding window clipped to the
/// absolute deadline. `None` once the deadline has passed.
fn renew_ms(deadline: u64, sliding: u64, now: u64) -> Option<u64> {
    if now >= deadline {
        return None;
    }
    Some(sliding.min(deadline - now).max(1))
}

/// Collects SCAN replies for one pattern.
///
/// SCAN may return a key more than once and may walk many empty pages
/// before a match, so the walk stops after `limit / SCAN_COUNT + 1` round
/// trips even when fewer than `limit` keys matched.
struct ScanWalk<'a> {
    pattern: &'a KeyPattern,
    limit: usize,
    rounds_left: usize,
    seen: HashSet<String>,
    keys: Vec<String>,
}

impl<'a> ScanWalk<'a> {
    fn new(pattern: &'a KeyPattern, limit: usize) -> Self {
        Self {
            pattern,
            limit,
            rounds_left: limit / SCAN_COUNT + 1,
            seen: HashSet::new(),
            keys: Vec::new(),
        }
    }

    /// Folds one reply in; returns the cursor to continue from.
    fn absorb(&mut self, next: u64, batch: Vec<String>) -> Option<u64> {
        self.rounds_left = self.rounds_left.saturating_sub(1);
        for key in batch {
            if self.keys.len() >= self.limit {
                break;
            }
            if self.pattern.matches(&key) && self.seen.insert(key.clone()) {
                self.keys.push(key);
            }
        }
        if next == 0 || self.keys.len() >= self.limit || self.rounds_left == 0 {
            return None;
        }
        Some(next)
    }

    fn exhausted(&self) -> bool {
        self.rounds_left == 0 && self.keys.len() < self.limit
    }
}

/// Escapes Redis glob metacharacters other than `*` and `?`.
fn redis_glob(pattern: &KeyPattern) -> String {
    let mut out = String::with_capacity(pattern.as_glob().len());
    for c in pattern.as_glob().chars() {
        if matches!(c, '[' | ']' | '\\' | '^') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl DistributedCache for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;

        let Some((deadline, sliding, payload)) = raw.and_then(decode) else {
            return Ok(None);
        };
        let Some(renew) = renew_ms(deadline, sliding, now_ms()) else {
            return Ok(None);
        };
        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(renew)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(transport)?;
        Ok(Some(payload))
    }

    async fn set(&self, key: &str, value: Bytes, opts: EntryOptions) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let sliding = if opts.sliding.is_zero() { opts.absolute } else { opts.sliding };
        let px = sliding.min(opts.absolute).max(Duration::from_millis(1));
        redis::cmd("SET")
            .arg(key)
            .arg(&encode(&value, opts)[..])
            .arg("PX")
            .arg(px.as_millis() as u64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(transport)
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(removed > 0)
    }

    async fn scan(&self, pattern: &KeyPattern, limit: usize) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let glob = redis_glob(pattern);
        let mut walk = ScanWalk::new(pattern, limit);
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&glob)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(transport)?;
            match walk.absorb(next, batch) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        if walk.exhausted() {
            debug!(
                component = "cache",
                pattern = pattern.as_glob(),
                matched = walk.keys.len(),
                "scan round budget spent, returning partial match"
            );
        }
        Ok(walk.keys)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
