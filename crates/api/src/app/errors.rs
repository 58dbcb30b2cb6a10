use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use gatehouse_auth::{AuthError, LockoutError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn unauthorized() -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", "authentication required")
}

pub fn unavailable() -> axum::response::Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "unavailable",
        "authentication backend unavailable",
    )
}

pub fn internal() -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}

/// Outward mapping for token errors outside the guard (logout, issuing).
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::Revoked => json_error(StatusCode::BAD_REQUEST, "already_logged_out", "already logged out"),
        AuthError::Infrastructure(cause) => {
            tracing::error!(%cause, "auth cache failure");
            unavailable()
        }
        AuthError::InvalidExpiry => json_error(
            StatusCode::BAD_REQUEST,
            "invalid_expiry",
            "token expiry must be in the future",
        ),
        AuthError::Signing(reason) => {
            tracing::error!(%reason, "token signing failed");
            internal()
        }
        other => {
            tracing::info!(kind = other.kind(), "token rejected");
            unauthorized()
        }
    }
}

pub fn lockout_error_to_response(err: LockoutError) -> axum::response::Response {
    match err {
        LockoutError::TooManyAttempts { retry_after, .. } => {
            let mut res = json_error(
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_attempts",
                "too many failed login attempts; try again later",
            );
            res.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from(retry_after.as_secs()),
            );
            res
        }
        LockoutError::Infrastructure(cause) => {
            tracing::error!(%cause, "login counter unavailable");
            unavailable()
        }
    }
}
