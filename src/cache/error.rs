// Package cache error taxonomy.

use thiserror::Error;

/// Errors produced by the tiered cache and its backends.
///
/// Only `InvalidKey`, `InvalidPattern` and `Serialization` ever reach a cache
/// caller; `Transport` is absorbed by the tiered cache and turned into a
/// local-only operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("distributed tier unavailable: {0}")]
    Transport(String),

    #[error("cache value serialization failed: {0}")]
    Serialization(String),

    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    #[error("invalid cache pattern {0:?}")]
    InvalidPattern(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// Validates a cache key: non-empty, bounded, no whitespace or control chars.
pub fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(CacheError::InvalidKey(key.chars().take(64).collect()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("printer:status:42").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("tab\there").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }
}
