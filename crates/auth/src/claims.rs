use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bitmask::{PermissionBitmask, PermissionId};
use crate::error::AuthError;
use crate::{Role, SubjectId};

/// Identity claims carried inside every token.
///
/// Field names are the wire names, so any JWT library can read them.
/// Timestamps are whole seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Principal id; absent on labeled tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SubjectId>,

    /// Principal email, or the label of a labeled token.
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Grouped permission bits.
    #[serde(default)]
    pub per: PermissionBitmask,

    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,

    /// Unique token id, used as the revocation key.
    pub jti: String,
}

impl IdentityClaims {
    /// Claims for a principal, valid from `now` until `expires_at`.
    pub fn for_subject(
        subject: SubjectId,
        email: impl Into<String>,
        role: Role,
        permissions: &PermissionBitmask,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(subject),
            role: Some(role),
            per: permissions.clone(),
            ..Self::labeled(email, now, expires_at)
        }
    }

    /// Claims for a non-principal caller.
    pub fn labeled(label: impl Into<String>, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            email: label.into(),
            role: None,
            per: PermissionBitmask::new(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::now_v7().to_string(),
        }
    }

    pub fn has_permission(&self, id: PermissionId) -> bool {
        self.per.has_permission(id)
    }

    /// Exact, case-sensitive role comparison.
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_ref().is_some_and(|r| r.matches(role))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Lifetime left at `now`; zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        let secs = self.exp.saturating_sub(now.timestamp());
        std::time::Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

/// Deterministically validate the claims' time window.
///
/// `now >= exp` is expired; `now < nbf` is not yet valid. Both surface as
/// [`AuthError::Expired`]. There is no leeway.
pub fn validate_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), AuthError> {
    let now = now.timestamp();
    if now >= claims.exp {
        return Err(AuthError::Expired);
    }
    if now < claims.nbf {
        return Err(AuthError::Expired);
    }
    Ok(())
}
