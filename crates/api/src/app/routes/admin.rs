use std::time::Duration;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{TimeDelta, Utc};

use crate::app::dto::{IssueLabeledTokenRequest, TokenResponse};
use crate::app::errors::{self, json_error};
use crate::app::AppState;
use crate::context::PrincipalContext;

/// Upper bound for labeled token lifetimes.
const MAX_LABELED_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Issue a token for a non-principal caller (service account, CI job).
pub async fn issue_labeled_token(
    State(state): State<AppState>,
    Extension(admin): Extension<PrincipalContext>,
    Json(body): Json<IssueLabeledTokenRequest>,
) -> Response {
    let label = body.label.trim();
    if label.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "label must not be empty");
    }

    let ttl = body
        .ttl_secs
        .map(Duration::from_secs)
        .unwrap_or(state.settings.token_ttl);
    if ttl.is_zero() || ttl > MAX_LABELED_TTL {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "ttl_secs must be between 1 and 2592000",
        );
    }

    let Some(expires_at) = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
    else {
        return errors::internal();
    };

    match state.tokens.issue_labeled(label, expires_at) {
        Ok(token) => {
            tracing::info!(issued_by = %admin.email(), label, "labeled token issued");
            (StatusCode::CREATED, Json(TokenResponse::bearer(token, expires_at))).into_response()
        }
        Err(err) => errors::auth_error_to_response(err),
    }
}
