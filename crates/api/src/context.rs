use std::collections::BTreeSet;

use gatehouse_auth::{IdentityClaims, PermissionId, Role, SubjectId};

/// Authenticated identity for a request, inserted by the auth middleware.
///
/// Immutable; handlers read it through `Extension<PrincipalContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    claims: IdentityClaims,
}

impl PrincipalContext {
    pub fn new(claims: IdentityClaims) -> Self {
        Self { claims }
    }

    pub fn subject(&self) -> Option<SubjectId> {
        self.claims.id
    }

    pub fn email(&self) -> &str {
        &self.claims.email
    }

    pub fn role(&self) -> Option<&Role> {
        self.claims.role.as_ref()
    }

    pub fn permissions(&self) -> BTreeSet<PermissionId> {
        self.claims.per.decode()
    }

    pub fn token_id(&self) -> &str {
        &self.claims.jti
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }
}
