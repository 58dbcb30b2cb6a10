//! Infrastructure layer: cache backends for the auth core.

pub mod cache;

#[cfg(feature = "redis")]
pub use cache::RedisCache;
