// Package cache resolves per-key lifetimes from the prefix table.

use std::time::{Duration, Instant};

use crate::config::TtlRule;

/// Divisor applied to a TTL to get its sliding window.
pub const SLIDING_FRACTION: u32 = 4;

/// Expiration options attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOptions {
    /// Hard upper bound on the entry lifetime, measured from the write.
    pub absolute: Duration,
    /// Inactivity window; every read inside it pushes expiry forward.
    pub sliding: Duration,
}

impl EntryOptions {
    /// Options for a resolved TTL: absolute = ttl, sliding = ttl / 4.
    ///
    /// `ttl` is the maximum lifetime, not the expected one. An entry that is
    /// never read expires after `ttl / 4`; each read inside the window pushes
    /// expiry forward again, up to `ttl` after the write.
    pub fn from_ttl(ttl: Duration) -> Self {
        Self {
            absolute: ttl,
            sliding: ttl / SLIDING_FRACTION,
        }
    }
}

/// Absolute + sliding expiry state of one stored entry.
#[derive(Debug, Clone, Copy)]
pub struct Expiry {
    deadline: Instant,
    expires_at: Instant,
    sliding: Duration,
}

impl Expiry {
    pub fn new(now: Instant, opts: EntryOptions) -> Self {
        let deadline = now + opts.absolute;
        let sliding = if opts.sliding.is_zero() { opts.absolute } else { opts.sliding };
        Self {
            deadline,
            expires_at: (now + sliding).min(deadline),
            sliding,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Extends expiry by the sliding window, never past the absolute deadline.
    pub fn touch(&mut self, now: Instant) {
        self.expires_at = (now + self.sliding).min(self.deadline);
    }

    /// Time left before expiry.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Time left before the absolute deadline.
    pub fn remaining_absolute(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

/// Immutable prefix → TTL table with a default fallback.
#[derive(Debug, Clone)]
pub struct TtlTable {
    // Longest prefix first, so the first match is the most specific one.
    rules: Vec<(String, Duration)>,
    default_ttl: Duration,
}

impl TtlTable {
    /// Builds the table. A repeated prefix keeps its last definition.
    pub fn new(rules: &[TtlRule], default_ttl: Duration) -> Self {
        let mut sorted: Vec<(String, Duration)> = Vec::with_capacity(rules.len());
        for rule in rules {
            if let Some(existing) = sorted.iter_mut().find(|(p, _)| *p == rule.prefix) {
                existing.1 = rule.ttl;
            } else {
                sorted.push((rule.prefix.clone(), rule.ttl));
            }
        }
        sorted.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            rules: sorted,
            default_ttl,
        }
    }

    /// Resolves the TTL for a key: longest matching prefix, else the default.
    pub fn resolve(&self, key: &str) -> Duration {
        self.rules
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix.as_str()))
            .map(|(_, ttl)| *ttl)
            .unwrap_or(self.default_ttl)
    }

    /// Resolves full expiration options for a key.
    pub fn options(&self, key: &str) -> EntryOptions {
        EntryOptions::from_ttl(self.resolve(key))
    }
}
