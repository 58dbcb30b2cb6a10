//! Token issuance, validation and revocation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation};

use crate::bitmask::{PermissionBitmask, PermissionId};
use crate::carrier::{RequestCarrier, bearer_token};
use crate::claims::{IdentityClaims, validate_claims};
use crate::error::{AuthError, AuthResult};
use crate::keys::SigningKeys;
use crate::revocation::RevocationStore;
use crate::{Role, SubjectId};

/// Issues and checks signed identity tokens.
///
/// Cheap to clone; keys and the revocation store are shared.
#[derive(Debug, Clone)]
pub struct TokenService {
    keys: Arc<SigningKeys>,
    revocations: RevocationStore,
}

impl TokenService {
    pub fn new(keys: Arc<SigningKeys>, revocations: RevocationStore) -> Self {
        Self { keys, revocations }
    }

    pub fn revocations(&self) -> &RevocationStore {
        &self.revocations
    }

    /// Issue a token for a principal.
    #[tracing::instrument(level = "debug", skip(self, subject, email, permission_ids), fields(subject = %subject))]
    pub fn issue<I>(
        &self,
        subject: SubjectId,
        email: &str,
        role: Role,
        permission_ids: I,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<String>
    where
        I: IntoIterator<Item = PermissionId>,
    {
        let now = Utc::now();
        ensure_future(expires_at, now)?;
        let permissions = PermissionBitmask::encode(permission_ids);
        let claims = IdentityClaims::for_subject(subject, email, role, &permissions, now, expires_at);
        self.sign(&claims)
    }

    /// Issue a token for a non-principal caller identified only by `label`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn issue_labeled(&self, label: &str, expires_at: DateTime<Utc>) -> AuthResult<String> {
        let now = Utc::now();
        ensure_future(expires_at, now)?;
        self.sign(&IdentityClaims::labeled(label, now, expires_at))
    }

    fn sign(&self, claims: &IdentityClaims) -> AuthResult<String> {
        let key = self
            .keys
            .encoding()
            .ok_or_else(|| AuthError::Signing("no private key loaded".to_string()))?;
        let header = Header::new(self.keys.algorithm().as_jwt());
        let token = jsonwebtoken::encode(&header, claims, key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        tracing::debug!(jti = %claims.jti, exp = claims.exp, "token issued");
        Ok(token)
    }

    pub async fn validate(&self, token: &str) -> AuthResult<IdentityClaims> {
        self.validate_at(token, Utc::now()).await
    }

    /// Full validation against an explicit clock.
    ///
    /// Order: structure and signature, time window, then revocation.
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<IdentityClaims> {
        let claims = self.verify_signature(token)?;
        validate_claims(&claims, now)?;
        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    pub async fn is_token_valid(&self, token: &str) -> bool {
        self.validate(token).await.is_ok()
    }

    pub async fn invalidate(&self, token: &str) -> AuthResult<()> {
        self.invalidate_at(token, Utc::now()).await
    }

    /// Revoke `token` for the rest of its lifetime.
    ///
    /// The signature must verify; the time window is not checked. A second
    /// call for the same token fails with [`AuthError::Revoked`].
    pub async fn invalidate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<()> {
        let claims = self.verify_signature(token)?;
        let created = self
            .revocations
            .revoke(&claims.jti, claims.remaining(now))
            .await?;
        if !created {
            return Err(AuthError::Revoked);
        }
        Ok(())
    }

    /// Validate the bearer token carried by `carrier`.
    pub async fn extract_from_request<C>(&self, carrier: &C) -> AuthResult<IdentityClaims>
    where
        C: RequestCarrier + ?Sized,
    {
        let token = bearer_token(carrier).ok_or(AuthError::MissingToken)?;
        self.validate(token).await
    }

    fn verify_signature(&self, token: &str) -> AuthResult<IdentityClaims> {
        let mut validation = Validation::new(self.keys.algorithm().as_jwt());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        jsonwebtoken::decode::<IdentityClaims>(token, self.keys.decoding(), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::Signature,
                _ => AuthError::MalformedToken(e.to_string()),
            })
    }
}

fn ensure_future(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> AuthResult<()> {
    if expires_at.timestamp() <= now.timestamp() {
        return Err(AuthError::InvalidExpiry);
    }
    Ok(())
}
