//! Request-level authorization checks.
//!
//! Every failure on the authentication path collapses into one generic
//! "unauthorized" answer; the precise [`AuthError`] kind is only logged.
//! A valid token lacking the required role or permission is "forbidden".

use crate::bitmask::PermissionId;
use crate::carrier::{DenialBody, RequestCarrier};
use crate::claims::IdentityClaims;
use crate::error::AuthError;
use crate::token::TokenService;

const UNAUTHORIZED: DenialBody = DenialBody {
    error: "unauthorized",
    message: "authentication required",
};

const FORBIDDEN: DenialBody = DenialBody {
    error: "forbidden",
    message: "insufficient privileges",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthorized,
    Forbidden,
}

impl Denial {
    pub fn status(self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
        }
    }

    pub fn body(self) -> DenialBody {
        match self {
            Self::Unauthorized => UNAUTHORIZED,
            Self::Forbidden => FORBIDDEN,
        }
    }

    fn write<C: RequestCarrier + ?Sized>(self, carrier: &mut C) -> Self {
        carrier.deny(self.status(), self.body());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    tokens: TokenService,
}

impl AuthorizationGuard {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn require_authenticated<C>(&self, carrier: &mut C) -> Result<IdentityClaims, Denial>
    where
        C: RequestCarrier + ?Sized,
    {
        match self.tokens.extract_from_request(&*carrier).await {
            Ok(claims) => Ok(claims),
            Err(err) => {
                log_rejection(&err);
                Err(Denial::Unauthorized.write(carrier))
            }
        }
    }

    pub async fn require_role<C>(&self, carrier: &mut C, role: &str) -> Result<IdentityClaims, Denial>
    where
        C: RequestCarrier + ?Sized,
    {
        let claims = self.require_authenticated(carrier).await?;
        if !claims.has_role(role) {
            tracing::info!(jti = %claims.jti, required_role = role, "role check failed");
            return Err(Denial::Forbidden.write(carrier));
        }
        Ok(claims)
    }

    pub async fn require_permission<C>(
        &self,
        carrier: &mut C,
        permission: PermissionId,
    ) -> Result<IdentityClaims, Denial>
    where
        C: RequestCarrier + ?Sized,
    {
        let claims = self.require_authenticated(carrier).await?;
        if !claims.has_permission(permission) {
            tracing::info!(jti = %claims.jti, permission, "permission check failed");
            return Err(Denial::Forbidden.write(carrier));
        }
        Ok(claims)
    }
}

fn log_rejection(err: &AuthError) {
    match err {
        AuthError::Infrastructure(cause) => {
            tracing::warn!(kind = err.kind(), %cause, "authentication failed");
        }
        _ => tracing::debug!(kind = err.kind(), "authentication failed"),
    }
}
