//! Key-value cache port used by the revocation store and the login counter.
//!
//! The core never talks to a concrete cache. Production deployments plug in
//! the Redis adapter from `gatehouse-infra`; tests and single-process dev
//! setups use [`InMemoryCache`](crate::memory_cache::InMemoryCache).
//!
//! Every mutating call must be atomic at the cache layer. Callers never
//! read-modify-write.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Shortest TTL any record is stored with. Zero or negative TTLs are clamped
/// to this so that nothing is stored without an expiry.
pub const MIN_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Connection refused, dropped, or otherwise unreachable.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within the configured deadline.
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// The cache answered, but with an error or an unexpected value.
    #[error("cache command failed: {0}")]
    Command(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// `SET key value EX ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// `SET key value NX EX ttl`. Returns `true` when the key was created.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// `GET key`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// `INCR key` followed by `EXPIRE key ttl`, as one atomic unit.
    /// Returns the incremented value.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<u64>;

    /// `DECR key` without going below zero: a key that reaches zero is
    /// deleted and a missing key stays missing. The TTL is left untouched.
    /// Returns the remaining value.
    async fn decr(&self, key: &str) -> CacheResult<u64>;

    /// `EXPIRE key ttl`. Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// `DEL key`. Returns `true` when a key was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;
}

/// Clamp a TTL to [`MIN_TTL`], rounding sub-second remainders up so a
/// revocation never lapses before the token it covers.
pub fn effective_ttl(ttl: Duration) -> Duration {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    Duration::from_secs(secs).max(MIN_TTL)
}

/// Seconds representation used by cache commands.
pub fn ttl_secs(ttl: Duration) -> u64 {
    effective_ttl(ttl).as_secs()
}
