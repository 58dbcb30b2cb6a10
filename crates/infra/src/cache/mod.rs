//! Cache backends for the revocation store and the login counter.
//!
//! The `KeyValueCache` port lives in `gatehouse-auth`. This module provides
//! infrastructure-backed implementations (e.g. Redis).

#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
