// Tiered cache: local in-process tier in front of a shared distributed tier.

pub mod backend;
pub mod error;
pub mod local;
pub mod memory;
pub mod pattern;
#[cfg(feature = "redis")]
pub mod redis;
pub mod stats;
pub mod tiered;
pub mod ttl;

pub use backend::DistributedCache;
pub use error::{validate_key, CacheError, MAX_KEY_LEN};
pub use local::LocalCache;
pub use memory::MemoryBackend;
pub use pattern::KeyPattern;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
pub use stats::CacheStats;
pub use tiered::TieredCache;
pub use ttl::{EntryOptions, TtlTable};
