//! Credential verification for the login endpoint.
//!
//! User storage is external; the API only needs "does this email/password
//! pair belong to a principal, and who is it". [`StaticCredentials`] is a
//! file-backed implementation with argon2 password hashes.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use gatehouse_auth::{CatalogError, PermissionCatalog, PermissionId, Role, SubjectId};

/// Principal resolved from valid credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPrincipal {
    pub id: SubjectId,
    pub email: String,
    pub role: Role,
    pub permissions: BTreeSet<PermissionId>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    /// The backing store could not answer.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(None)` for an unknown email or a wrong password; the two are not
    /// distinguished.
    async fn verify(&self, email: &str, password: &str) -> Result<Option<VerifiedPrincipal>, CredentialError>;
}

#[derive(Debug, Error)]
pub enum UsersFileError {
    #[error("failed to read users file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse users file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("user '{email}': {source}")]
    Permission {
        email: String,
        #[source]
        source: CatalogError,
    },

    #[error("user '{0}': password_hash is not a valid PHC string")]
    BadHash(String),

    #[error("duplicate user '{0}'")]
    Duplicate(String),

    #[error("failed to hash password: {0}")]
    Hash(String),
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: u64,
    email: String,
    role: String,
    #[serde(default)]
    permissions: Vec<String>,
    password_hash: String,
}

#[derive(Debug)]
struct StoredUser {
    principal: VerifiedPrincipal,
    password_hash: String,
}

/// In-memory user table loaded from JSON.
///
/// ```json
/// [{ "id": 1, "email": "ada@example.com", "role": "admin",
///    "permissions": ["view-user"], "password_hash": "$argon2id$..." }]
/// ```
#[derive(Debug)]
pub struct StaticCredentials {
    users: HashMap<String, StoredUser>,
    // Verified against for unknown emails so both failure paths cost the same.
    decoy_hash: String,
}

impl StaticCredentials {
    pub fn empty() -> Result<Self, UsersFileError> {
        Ok(Self {
            users: HashMap::new(),
            decoy_hash: hash_password("gatehouse-decoy")?,
        })
    }

    pub fn from_json(json: &str, catalog: &PermissionCatalog) -> Result<Self, UsersFileError> {
        let records: Vec<UserRecord> = serde_json::from_str(json)?;
        let mut creds = Self::empty()?;

        for record in records {
            if PasswordHash::new(&record.password_hash).is_err() {
                return Err(UsersFileError::BadHash(record.email));
            }
            let permissions = catalog
                .resolve(record.permissions.iter().map(String::as_str))
                .map_err(|source| UsersFileError::Permission {
                    email: record.email.clone(),
                    source,
                })?;

            let key = normalize(&record.email);
            if creds.users.contains_key(&key) {
                return Err(UsersFileError::Duplicate(record.email));
            }
            creds.users.insert(
                key,
                StoredUser {
                    principal: VerifiedPrincipal {
                        id: SubjectId::new(record.id),
                        email: record.email,
                        role: Role::from(record.role),
                        permissions,
                    },
                    password_hash: record.password_hash,
                },
            );
        }

        Ok(creds)
    }

    pub fn from_file(path: impl AsRef<Path>, catalog: &PermissionCatalog) -> Result<Self, UsersFileError> {
        let json = std::fs::read_to_string(path)?;
        let creds = Self::from_json(&json, catalog)?;
        tracing::info!(users = creds.len(), "credentials loaded");
        Ok(creds)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<VerifiedPrincipal>, CredentialError> {
        let user = self.users.get(&normalize(email));
        let hash = user.map_or(self.decoy_hash.as_str(), |u| u.password_hash.as_str());

        let password = password.to_owned();
        let hash = hash.to_owned();
        // CPU-bound; keep it off the async workers.
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;

        Ok(match (user, matches) {
            (Some(user), true) => Some(user.principal.clone()),
            _ => None,
        })
    }
}

/// Argon2id PHC string for `password` with a random salt.
pub fn hash_password(password: &str) -> Result<String, UsersFileError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UsersFileError::Hash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
