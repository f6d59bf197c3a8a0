//! Deduplicated logging functionality to prevent log spam.
//!
//! Hot paths (cache transport failures, undecodable values) report through
//! [`warn`]; identical messages within one flush window are collapsed into a
//! single record carrying a `count`.

pub mod consts;
pub mod sanitizer;
pub mod log_entry;

pub use log_entry::{start_dedup_logger, warn};
