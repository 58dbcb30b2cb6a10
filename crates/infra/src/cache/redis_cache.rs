//! Redis-backed `KeyValueCache`.
//!
//! - **Shared state**: every API instance sees the same revocations and counters
//! - **Atomic mutations**: `SET NX EX` for revocation, `MULTI`/`INCR`/`EXPIRE` for counters
//! - **Bounded calls**: each command runs under an operation timeout
//! - **Reconnects**: `ConnectionManager` re-establishes dropped connections

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, RedisResult};
use tracing::instrument;

use gatehouse_auth::cache::ttl_secs;
use gatehouse_auth::{CacheError, CacheResult, KeyValueCache};

// DECR that never goes below zero and never creates the key.
const DECR_FLOOR_ZERO: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
local v = redis.call('DECR', KEYS[1])
if v <= 0 then redis.call('DEL', KEYS[1]) return 0 end
return v
";

/// Default per-command deadline.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    timeout: Duration,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `timeout` - deadline for the initial connection and for every command
    pub async fn connect(redis_url: impl AsRef<str>, timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(map_redis_error)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(timeout))?
            .map_err(map_redis_error)?;

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "connected to redis");
        Ok(Self { conn, timeout })
    }

    /// `PING` round trip under the operation timeout.
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if pong != "PONG" {
            return Err(CacheError::Command(format!("unexpected PING reply: {pong}")));
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(CacheError::Timeout(self.timeout)),
        }
    }
}

fn map_redis_error(e: RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        CacheError::Unavailable(e.to_string())
    } else {
        CacheError::Command(e.to_string())
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    #[instrument(skip(self, value), err)]
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    #[instrument(skip(self, value), err)]
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        // Nil reply means the key already existed.
        let reply: Option<String> = self
            .bounded(async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl_secs(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(async move { redis::cmd("GET").arg(key).query_async(&mut conn).await })
            .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded(async move { redis::cmd("EXISTS").arg(key).query_async(&mut conn).await })
            .await
    }

    #[instrument(skip(self), err)]
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = self
            .bounded(async move {
                redis::pipe()
                    .atomic()
                    .cmd("INCR")
                    .arg(key)
                    .cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl_secs(ttl))
                    .ignore()
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(count)
    }

    #[instrument(skip(self), err)]
    async fn decr(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::Script::new(DECR_FLOOR_ZERO)
                .key(key)
                .invoke_async(&mut conn)
                .await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs(ttl))
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .bounded(async move { redis::cmd("DEL").arg(key).query_async(&mut conn).await })
            .await?;
        Ok(removed > 0)
    }
}
