// Shared test support code for scenario tests.

pub mod cache;
pub mod common;
pub mod jobs;

pub use common::*;
