//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Context;
use axum::Router;

use gatehouse_auth::catalog::defaults;
use gatehouse_auth::{
    AuthorizationGuard, CatalogError, InMemoryCache, KeyValueCache, LoginAttemptCounter,
    PermissionCatalog, RevocationStore, Role, SigningKeys, TokenService,
};
use gatehouse_infra::RedisCache;

use crate::config::{AuthSettings, GatehouseConfig};
use crate::credentials::{CredentialVerifier, StaticCredentials};
use crate::middleware::{self, AuthState, Requirement};

pub mod dto;
pub mod errors;
pub mod routes;

pub const ADMIN_ROLE: &str = "admin";

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub guard: Arc<AuthorizationGuard>,
    pub lockout: LoginAttemptCounter,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub catalog: Arc<PermissionCatalog>,
    pub settings: AuthSettings,
}

impl AppState {
    pub fn new(
        keys: Arc<SigningKeys>,
        cache: Arc<dyn KeyValueCache>,
        credentials: Arc<dyn CredentialVerifier>,
        catalog: Arc<PermissionCatalog>,
        settings: AuthSettings,
    ) -> Self {
        let revocations = RevocationStore::new(cache.clone(), settings.cache_prefix.clone())
            .with_policy(settings.revocation_policy);
        let tokens = TokenService::new(keys, revocations);
        let lockout = LoginAttemptCounter::new(cache, settings.cache_prefix.clone(), settings.lockout);

        Self {
            guard: Arc::new(AuthorizationGuard::new(tokens.clone())),
            tokens,
            lockout,
            credentials,
            catalog,
            settings,
        }
    }
}

/// Build the full HTTP router.
///
/// Login needs the peer address: serve with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_app(state: AppState) -> Result<Router, CatalogError> {
    let guard = state.guard.clone();
    let guarded = |requirement: Requirement| {
        axum::middleware::from_fn_with_state(
            AuthState::new(guard.clone(), requirement),
            middleware::authorize,
        )
    };
    let view_permissions = Requirement::permission(&state.catalog, defaults::VIEW_PERMISSION)?;

    let router = Router::new()
        .merge(routes::public_router())
        .merge(routes::authenticated_router().route_layer(guarded(Requirement::Authenticated)))
        .merge(routes::permission_router().route_layer(guarded(view_permissions)))
        .merge(routes::admin_router().route_layer(guarded(Requirement::Role(Role::from(ADMIN_ROLE)))))
        .with_state(state);

    Ok(router)
}

/// Load keys, connect the cache and load credentials.
///
/// Any failure here is fatal: the process must not serve requests without
/// its keys.
pub async fn bootstrap(config: &GatehouseConfig) -> anyhow::Result<Router> {
    let keys = SigningKeys::from_pem_files(
        config.key_algorithm,
        &config.private_key_path,
        &config.public_key_path,
    )
    .context("failed to load signing keys")?;

    let cache: Arc<dyn KeyValueCache> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCache::connect(url, config.cache_timeout)
                .await
                .context("failed to connect to redis")?,
        ),
        None => {
            tracing::warn!("GATEHOUSE_REDIS_URL not set; revocations and lockouts are process-local");
            Arc::new(InMemoryCache::new())
        }
    };

    let catalog = Arc::new(PermissionCatalog::default_catalog().context("invalid permission catalog")?);

    let credentials: Arc<dyn CredentialVerifier> = match &config.users_file {
        Some(path) => Arc::new(
            StaticCredentials::from_file(path, &catalog)
                .with_context(|| format!("failed to load users file {}", path.display()))?,
        ),
        None => {
            tracing::warn!("GATEHOUSE_USERS_FILE not set; every login will be rejected");
            Arc::new(StaticCredentials::empty().context("failed to prepare credential store")?)
        }
    };

    let state = AppState::new(Arc::new(keys), cache, credentials, catalog, config.auth.clone());
    Ok(build_app(state)?)
}
