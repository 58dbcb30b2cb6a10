//! Failed-login throttling per origin address.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheError, KeyValueCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures at which an address is locked out.
    pub threshold: u64,
    /// Window that every new failure re-arms.
    pub window: Duration,
    /// Clear the counter after a successful login.
    pub reset_on_success: bool,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::from_secs(2 * 60 * 60),
            reset_on_success: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockoutError {
    #[error("too many failed login attempts")]
    TooManyAttempts { failures: u64, retry_after: Duration },

    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] CacheError),
}

/// Counts failed logins per origin address in the shared cache.
#[derive(Clone)]
pub struct LoginAttemptCounter {
    cache: Arc<dyn KeyValueCache>,
    prefix: String,
    policy: LockoutPolicy,
}

impl fmt::Debug for LoginAttemptCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginAttemptCounter")
            .field("prefix", &self.prefix)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl LoginAttemptCounter {
    pub fn new(cache: Arc<dyn KeyValueCache>, prefix: impl Into<String>, policy: LockoutPolicy) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    fn key(&self, address: &str) -> String {
        format!("{}login-failures:{address}", self.prefix)
    }

    /// Atomically bump the counter and re-arm its window. Returns the new count.
    pub async fn record_failure(&self, address: &str) -> Result<u64, CacheError> {
        let count = self
            .cache
            .incr_with_ttl(&self.key(address), self.policy.window)
            .await?;
        if count >= self.policy.threshold {
            tracing::warn!(address, failures = count, "login failure threshold reached");
        } else {
            tracing::debug!(address, failures = count, "login failure recorded");
        }
        Ok(count)
    }

    /// Current count, `0` when the address has no record.
    pub async fn failure_count(&self, address: &str) -> Result<u64, CacheError> {
        match self.cache.get(&self.key(address)).await? {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| {
                CacheError::Command(format!("login failure counter for {address} is not an integer"))
            }),
        }
    }

    pub async fn reset(&self, address: &str) -> Result<(), CacheError> {
        if self.cache.delete(&self.key(address)).await? {
            tracing::debug!(address, "login failure counter reset");
        }
        Ok(())
    }

    /// Atomically claim one attempt for `address` before credentials are
    /// checked.
    ///
    /// The claim counts as a failure until it is released or reset, so
    /// concurrent attempts cannot all slip past the threshold: only the
    /// first `threshold` claims in a window succeed. A rejected claim is
    /// handed back, but its increment has already re-armed the window.
    /// Returns the claimed count.
    pub async fn reserve_attempt(&self, address: &str) -> Result<u64, LockoutError> {
        let key = self.key(address);
        let count = self.cache.incr_with_ttl(&key, self.policy.window).await?;
        if count <= self.policy.threshold {
            return Ok(count);
        }

        tracing::info!(address, attempts = count, "attempt rejected: address locked out");
        if let Err(err) = self.cache.decr(&key).await {
            tracing::warn!(address, error = %err, "failed to release rejected attempt");
        }
        Err(LockoutError::TooManyAttempts {
            failures: count - 1,
            retry_after: self.policy.window,
        })
    }

    /// Give back a claim from [`reserve_attempt`](Self::reserve_attempt)
    /// that did not end in a failed login.
    pub async fn release_attempt(&self, address: &str) -> Result<(), CacheError> {
        self.cache.decr(&self.key(address)).await?;
        Ok(())
    }

    /// Reject when the address has reached the threshold.
    pub async fn ensure_not_locked(&self, address: &str) -> Result<(), LockoutError> {
        let failures = self.failure_count(address).await?;
        if failures >= self.policy.threshold {
            return Err(LockoutError::TooManyAttempts {
                failures,
                retry_after: self.policy.window,
            });
        }
        Ok(())
    }
}
