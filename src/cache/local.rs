// Package cache provides the bounded in-process tier.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::pattern::KeyPattern;
use super::ttl::{EntryOptions, Expiry};

/// Entries inspected per eviction round.
const KEYS_SAMPLE: usize = 16;

struct LocalEntry {
    value: Bytes,
    size: i64,
    expiry: Expiry,
    last_access: Instant,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expiry.is_expired(now)
    }
}

/// In-process cache bounded by the summed size hints of its entries.
///
/// When a write pushes usage over capacity, expired entries are purged
/// first, then the least recently accessed entry of a rotating sample is
/// evicted until usage fits again.
pub struct LocalCache {
    entries: DashMap<String, LocalEntry>,
    capacity_bytes: i64,
    mem: AtomicI64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    cursor: AtomicUsize,
}

impl LocalCache {
    /// Creates a local tier holding at most `capacity_bytes`.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity_bytes: capacity_bytes as i64,
            mem: AtomicI64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Gets a live value and slides its expiry.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.get_with_remaining(key).map(|(value, _)| value)
    }

    /// Gets a live value together with the time left before its absolute deadline.
    pub fn get_with_remaining(&self, key: &str) -> Option<(Bytes, Duration)> {
        let now = Instant::now();
        {
            let mut entry = self.entries.get_mut(key)?;
            if !entry.is_expired(now) {
                entry.expiry.touch(now);
                entry.last_access = now;
                return Some((entry.value.clone(), entry.expiry.remaining_absolute(now)));
            }
        }
        self.remove_expired(key, now);
        None
    }

    /// Stores a value with `size_hint` bytes charged against capacity.
    /// Returns false when the value can never fit.
    pub fn set(&self, key: &str, value: Bytes, size_hint: usize, opts: EntryOptions) -> bool {
        let size = (size_hint + key.len()) as i64;
        if size > self.capacity_bytes {
            self.remove(key);
            return false;
        }

        let now = Instant::now();
        let entry = LocalEntry {
            value,
            size,
            expiry: Expiry::new(now, opts),
            last_access: now,
        };
        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            self.mem.fetch_sub(old.size, Ordering::Relaxed);
        }
        self.mem.fetch_add(size, Ordering::Relaxed);

        if self.mem() > self.capacity_bytes {
            self.evict_until_within_limit();
        }
        true
    }

    /// Removes a key. Returns whether a live entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, old)) => {
                self.mem.fetch_sub(old.size, Ordering::Relaxed);
                !old.is_expired(Instant::now())
            }
            None => false,
        }
    }

    fn remove_expired(&self, key: &str, now: Instant) {
        if let Some((_, old)) = self.entries.remove_if(key, |_, e| e.is_expired(now)) {
            self.mem.fetch_sub(old.size, Ordering::Relaxed);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0usize;
        self.entries.retain(|_, e| {
            if e.is_expired(now) {
                self.mem.fetch_sub(e.size, Ordering::Relaxed);
                purged += 1;
                false
            } else {
                true
            }
        });
        self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Evicts entries until usage is within capacity.
    /// Returns (freed_bytes, items).
    pub fn evict_until_within_limit(&self) -> (i64, i64) {
        let mut freed = 0i64;
        let mut items = 0i64;

        if self.mem() > self.capacity_bytes {
            self.purge_expired();
        }

        while self.mem() > self.capacity_bytes {
            let Some(victim) = self.pick_victim() else {
                break;
            };
            if let Some((_, old)) = self.entries.remove(&victim) {
                self.mem.fetch_sub(old.size, Ordering::Relaxed);
                freed += old.size;
                items += 1;
            }
        }

        if items > 0 {
            self.evictions.fetch_add(items as u64, Ordering::Relaxed);
        }
        (freed, items)
    }

    // Least recently accessed key among a sample that starts at a rotating offset.
    fn pick_victim(&self) -> Option<String> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        let offset = self.cursor.fetch_add(KEYS_SAMPLE, Ordering::Relaxed) % len;
        let sample = self
            .entries
            .iter()
            .skip(offset)
            .chain(self.entries.iter().take(offset))
            .take(KEYS_SAMPLE);

        let mut victim: Option<(String, Instant)> = None;
        for entry in sample {
            let older = victim
                .as_ref()
                .map_or(true, |(_, at)| entry.value().last_access < *at);
            if older {
                victim = Some((entry.key().clone(), entry.value().last_access));
            }
        }
        victim.map(|(key, _)| key)
    }

    /// Live keys matching `pattern`, at most `limit`.
    pub fn keys_matching(&self, pattern: &KeyPattern, limit: usize) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && pattern.matches(e.key()))
            .take(limit)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Checks for a live entry without touching it.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.get(key).map_or(false, |e| !e.is_expired(now))
    }

    /// Gets the number of stored entries (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets the charged size of all entries in bytes.
    pub fn mem(&self) -> i64 {
        self.mem.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> i64 {
        self.capacity_bytes
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }
}
