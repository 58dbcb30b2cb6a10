use axum::{
    routing::{get, post},
    Router,
};

use crate::app::AppState;

pub mod admin;
pub mod auth;
pub mod system;

/// Endpoints reachable without a token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
}

/// Endpoints that only need a valid token.
pub fn authenticated_router() -> Router<AppState> {
    Router::new().route("/auth/me", get(auth::me))
}

/// Endpoints gated on the `view-permission` permission.
pub fn permission_router() -> Router<AppState> {
    Router::new().route("/auth/permissions", get(auth::permissions))
}

/// Endpoints gated on the admin role.
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/admin/tokens", post(admin::issue_labeled_token))
}
