//! Server-side token revocation.
//!
//! A revoked token id is stored in the cache until the token would have
//! expired anyway, so the store never grows beyond the set of live tokens.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheError, KeyValueCache, effective_ttl};

/// What `is_revoked` answers when the cache cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationFailurePolicy {
    /// Surface the cache error; the request is denied.
    #[default]
    FailClosed,
    /// Log and treat the token as not revoked.
    FailOpen,
}

impl fmt::Display for RevocationFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FailClosed => "fail-closed",
            Self::FailOpen => "fail-open",
        })
    }
}

impl FromStr for RevocationFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            "fail-open" | "open" => Ok(Self::FailOpen),
            other => Err(format!(
                "unknown revocation policy '{other}' (expected fail-closed or fail-open)"
            )),
        }
    }
}

#[derive(Clone)]
pub struct RevocationStore {
    cache: Arc<dyn KeyValueCache>,
    prefix: String,
    policy: RevocationFailurePolicy,
}

impl fmt::Debug for RevocationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevocationStore")
            .field("prefix", &self.prefix)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RevocationStore {
    pub fn new(cache: Arc<dyn KeyValueCache>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            policy: RevocationFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RevocationFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RevocationFailurePolicy {
        self.policy
    }

    fn key(&self, token_id: &str) -> String {
        format!("{}revoked:{token_id}", self.prefix)
    }

    /// Record `token_id` as revoked for `ttl` (clamped to the minimum TTL).
    ///
    /// Returns `true` when this call created the record, `false` when the
    /// token was already revoked.
    #[tracing::instrument(level = "debug", skip(self), fields(ttl_secs = effective_ttl(ttl).as_secs()))]
    pub async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<bool, CacheError> {
        let created = self.cache.set_nx_ex(&self.key(token_id), "1", ttl).await?;
        if created {
            tracing::info!(jti = token_id, "token revoked");
        }
        Ok(created)
    }

    /// Existence check, subject to the configured failure policy.
    pub async fn is_revoked(&self, token_id: &str) -> Result<bool, CacheError> {
        match self.cache.exists(&self.key(token_id)).await {
            Ok(revoked) => Ok(revoked),
            Err(err) => match self.policy {
                RevocationFailurePolicy::FailClosed => {
                    tracing::error!(jti = token_id, error = %err, "revocation lookup failed; denying");
                    Err(err)
                }
                RevocationFailurePolicy::FailOpen => {
                    tracing::warn!(jti = token_id, error = %err, "revocation lookup failed; treating token as live");
                    Ok(false)
                }
            },
        }
    }
}
