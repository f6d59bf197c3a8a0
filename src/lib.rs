#[path = "shared/dedlog/mod.rs"]
pub mod dedlog;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod cache;
pub mod config;
pub mod events;
pub mod metrics;
pub mod scheduler;
pub mod shutdown;
