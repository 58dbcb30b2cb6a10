use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_auth::PermissionId;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueLabeledTokenRequest {
    pub label: String,
    pub ttl_secs: Option<u64>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_length: usize,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl TokenResponse {
    pub fn bearer(token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            token_length: token.len(),
            token,
            token_type: "Bearer",
            expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub id: PermissionId,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Option<u64>,
    pub email: String,
    pub role: Option<String>,
    pub permissions: Vec<PermissionResponse>,
    pub expires_at: Option<DateTime<Utc>>,
}
