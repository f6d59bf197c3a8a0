// Package scheduler computes retry budgets and backoff delays.

use std::collections::HashMap;
use std::time::Duration;

use crate::config;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    default_max_retries: u32,
    per_type: HashMap<String, u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(cfg: &config::Scheduler) -> Self {
        Self {
            default_max_retries: cfg.default_max_retries,
            per_type: cfg.max_retries.clone(),
            base_delay: cfg.retry_base_delay,
            max_delay: cfg.max_retry_delay,
        }
    }

    /// Retry budget of a job type; unknown types get the default.
    pub fn max_retries_for(&self, job_type: &str) -> u32 {
        self.per_type
            .get(job_type)
            .copied()
            .unwrap_or(self.default_max_retries)
    }

    /// Delay before retry number `retry_count` (1-based): base * 2^retry_count, capped.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        2u32.checked_pow(retry_count)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}
