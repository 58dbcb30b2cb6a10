use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use gatehouse_auth::{
    AuthorizationGuard, CatalogError, IdentityClaims, PermissionCatalog, PermissionId, Role,
};

use crate::carrier::HttpCarrier;
use crate::context::PrincipalContext;

/// Requirement checked by [`authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Role(Role),
    Permission(PermissionId),
}

impl Requirement {
    /// Permission requirement looked up by name.
    pub fn permission(catalog: &PermissionCatalog, name: &str) -> Result<Self, CatalogError> {
        catalog
            .id_of(name)
            .map(Self::Permission)
            .ok_or_else(|| CatalogError::Unknown(name.to_string()))
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub guard: Arc<AuthorizationGuard>,
    pub requirement: Requirement,
}

impl AuthState {
    pub fn new(guard: Arc<AuthorizationGuard>, requirement: Requirement) -> Self {
        Self { guard, requirement }
    }
}

/// Run the guard for `state.requirement`; on success the claims are
/// available to handlers as `Extension<PrincipalContext>`.
pub async fn authorize(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let outcome: Result<IdentityClaims, Response> = {
        let mut carrier = HttpCarrier::new(req.headers());
        let checked = match &state.requirement {
            Requirement::Authenticated => state.guard.require_authenticated(&mut carrier).await,
            Requirement::Role(role) => state.guard.require_role(&mut carrier, role.as_str()).await,
            Requirement::Permission(id) => state.guard.require_permission(&mut carrier, *id).await,
        };
        checked.map_err(|_| carrier.into_response())
    };

    match outcome {
        Ok(claims) => {
            req.extensions_mut().insert(PrincipalContext::new(claims));
            next.run(req).await
        }
        Err(denied) => denied,
    }
}
