//! Error model for token issuance and validation.

use thiserror::Error;

use crate::cache::CacheError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Failure while issuing, validating or revoking a token.
///
/// Variants are fine-grained for logs and tests. Anything facing an untrusted
/// caller collapses them (see [`crate::guard`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Not a well-formed signed token, or its claims do not decode.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Structurally valid, but the signature does not verify.
    #[error("token signature verification failed")]
    Signature,

    /// Past `exp`, or before `nbf`.
    #[error("token has expired or is not yet valid")]
    Expired,

    /// The token id is present in the revocation store.
    #[error("token has been revoked")]
    Revoked,

    /// No bearer token on the request.
    #[error("missing bearer token")]
    MissingToken,

    /// No private key is loaded, or the signer failed.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Requested expiry is not in the future.
    #[error("token expiry must be in the future")]
    InvalidExpiry,

    /// The revocation cache could not answer.
    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] CacheError),
}

impl AuthError {
    /// Stable short code for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "malformed_token",
            Self::Signature => "signature",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::MissingToken => "missing_token",
            Self::Signing(_) => "signing",
            Self::InvalidExpiry => "invalid_expiry",
            Self::Infrastructure(_) => "infrastructure",
        }
    }
}
