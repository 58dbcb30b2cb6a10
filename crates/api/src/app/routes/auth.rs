use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{TimeDelta, Utc};

use gatehouse_auth::bearer_token;

use crate::app::dto::{LoginRequest, MeResponse, MessageResponse, PermissionResponse, TokenResponse};
use crate::app::errors::{self, json_error};
use crate::app::AppState;
use crate::carrier::HttpCarrier;
use crate::context::PrincipalContext;

/// Address a login attempt is attributed to.
///
/// The first `X-Forwarded-For` entry is used only when the deployment sits
/// behind a trusted proxy; otherwise the TCP peer address.
pub fn origin_address(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    peer.ip().to_string()
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Response {
    let origin = origin_address(&headers, peer, state.settings.trust_forwarded_for);

    // The attempt is claimed before verification so that concurrent logins
    // from one address cannot all pass the threshold check.
    let attempt = match state.lockout.reserve_attempt(&origin).await {
        Ok(attempt) => attempt,
        Err(err) => return errors::lockout_error_to_response(err),
    };

    let principal = match state.credentials.verify(&body.email, &body.password).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return failed_login(&state, &origin, attempt),
        Err(err) => {
            tracing::error!(error = %err, "credential verification failed");
            release_attempt(&state, &origin).await;
            return errors::unavailable();
        }
    };

    if state.lockout.policy().reset_on_success {
        if let Err(err) = state.lockout.reset(&origin).await {
            tracing::warn!(origin = %origin, error = %err, "failed to reset login failure counter");
        }
    } else {
        release_attempt(&state, &origin).await;
    }

    let Some(expires_at) = TimeDelta::from_std(state.settings.token_ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
    else {
        tracing::error!("token ttl out of range");
        return errors::internal();
    };

    match state.tokens.issue(
        principal.id,
        &principal.email,
        principal.role,
        principal.permissions.iter().copied(),
        expires_at,
    ) {
        Ok(token) => {
            tracing::info!(subject = %principal.id, origin = %origin, "login succeeded");
            (StatusCode::OK, Json(TokenResponse::bearer(token, expires_at))).into_response()
        }
        Err(err) => errors::auth_error_to_response(err),
    }
}

/// The claimed attempt stays on the counter as the recorded failure.
fn failed_login(state: &AppState, origin: &str, failures: u64) -> Response {
    let policy = state.lockout.policy();
    if failures >= policy.threshold {
        tracing::warn!(origin, failures, "login failure threshold reached");
        return errors::lockout_error_to_response(gatehouse_auth::LockoutError::TooManyAttempts {
            failures,
            retry_after: policy.window,
        });
    }
    tracing::debug!(origin, failures, "login failure recorded");
    json_error(
        StatusCode::UNAUTHORIZED,
        "invalid_credentials",
        "invalid email or password",
    )
}

async fn release_attempt(state: &AppState, origin: &str) {
    if let Err(err) = state.lockout.release_attempt(origin).await {
        tracing::warn!(origin, error = %err, "failed to release login attempt");
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let carrier = HttpCarrier::new(&headers);
    let Some(token) = bearer_token(&carrier) else {
        return errors::unauthorized();
    };

    match state.tokens.invalidate(token).await {
        Ok(()) => (StatusCode::OK, Json(MessageResponse { message: "logged out" })).into_response(),
        Err(err) => errors::auth_error_to_response(err),
    }
}

pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let permissions = principal
        .permissions()
        .into_iter()
        .map(|id| PermissionResponse {
            id,
            name: state
                .catalog
                .name_of(id)
                .map(ToString::to_string)
                .unwrap_or_default(),
        })
        .collect();

    Json(MeResponse {
        id: principal.subject().map(u64::from),
        email: principal.email().to_string(),
        role: principal.role().map(ToString::to_string),
        permissions,
        expires_at: principal.claims().expires_at(),
    })
}

pub async fn permissions(State(state): State<AppState>) -> impl IntoResponse {
    let catalog: Vec<PermissionResponse> = state
        .catalog
        .iter()
        .map(|(id, name)| PermissionResponse {
            id,
            name: name.to_string(),
        })
        .collect();
    Json(catalog)
}
