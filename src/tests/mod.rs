//! Scenario tests for the job scheduler and the tiered cache.
//!
//! Unit tests live next to the code; these drive the public API end to end
//! with recording sinks and an in-memory distributed tier that can fail.

mod cases_cache_bulk_test;
mod cases_scheduler_priority_test;
mod cases_scheduler_retry_test;
mod cases_scheduler_stats_test;

pub mod support;
