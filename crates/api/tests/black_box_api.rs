use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};
use jsonwebtoken::{DecodingKey, EncodingKey};
use reqwest::StatusCode;
use serde_json::json;

use gatehouse_api::app::{AppState, bootstrap, build_app};
use gatehouse_api::config::{AuthSettings, GatehouseConfig};
use gatehouse_api::credentials::{CredentialError, CredentialVerifier, VerifiedPrincipal};
use gatehouse_auth::catalog::defaults;
use gatehouse_auth::{InMemoryCache, KeyAlgorithm, PermissionCatalog, Role, SigningKeys, SubjectId};

const PASSWORD: &str = "correct horse battery staple";

/// Counts every verification so tests can prove lockout short-circuits it.
#[derive(Default)]
struct TestCredentials {
    users: HashMap<String, VerifiedPrincipal>,
    calls: AtomicUsize,
    delay: Duration,
}

impl TestCredentials {
    fn with_user(mut self, id: u64, email: &str, role: &'static str, permissions: &[&str]) -> Self {
        let catalog = PermissionCatalog::default_catalog().unwrap();
        self.users.insert(
            email.to_string(),
            VerifiedPrincipal {
                id: SubjectId::new(id),
                email: email.to_string(),
                role: Role::from(role),
                permissions: catalog.resolve(permissions.iter().copied()).unwrap(),
            },
        );
        self
    }

    /// Stretch every verification, the way a real password hash does.
    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl CredentialVerifier for TestCredentials {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<VerifiedPrincipal>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.users.get(email).filter(|_| password == PASSWORD).cloned())
    }
}

fn ed25519_keys(seed: u8) -> SigningKeys {
    let signing = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]);
    let der = signing.to_pkcs8_der().unwrap();
    let x = URL_SAFE_NO_PAD.encode(signing.verifying_key().to_bytes());
    SigningKeys::new(
        KeyAlgorithm::EdDsa,
        Some(EncodingKey::from_ed_der(der.as_bytes())),
        DecodingKey::from_ed_components(&x).unwrap(),
    )
}

struct TestServer {
    base_url: String,
    state: AppState,
    credentials: Arc<TestCredentials>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(TestCredentials::default()).await
    }

    async fn spawn_with(credentials: TestCredentials) -> Self {
        let credentials = Arc::new(
            credentials
                .with_user(1, "admin@example.com", "admin", &[defaults::VIEW_PERMISSION])
                .with_user(2, "user@example.com", "user", &[defaults::VIEW_USER]),
        );
        let settings = AuthSettings {
            trust_forwarded_for: true,
            ..AuthSettings::default()
        };
        let state = AppState::new(
            Arc::new(ed25519_keys(5)),
            Arc::new(InMemoryCache::new()),
            credentials.clone(),
            Arc::new(PermissionCatalog::default_catalog().unwrap()),
            settings,
        );

        let app = build_app(state.clone()).unwrap();
        let (base_url, handle) = serve(app).await;

        Self {
            base_url,
            state,
            credentials,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, client: &reqwest::Client, email: &str, password: &str, origin: &str) -> reqwest::Response {
        client
            .post(self.url("/auth/login"))
            .header("x-forwarded-for", origin)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    async fn token_for(&self, client: &reqwest::Client, email: &str) -> String {
        let res = self.login(client, email, PASSWORD, "192.0.2.1").await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(app: axum::Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_issues_token_carrying_identity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = srv.login(&client, "user@example.com", PASSWORD, "192.0.2.1").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["token_length"], token.len());
    assert_eq!(body["token_type"], "Bearer");

    let res = client
        .get(srv.url("/auth/me"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["id"], 2);
    assert_eq!(me["email"], "user@example.com");
    assert_eq!(me["role"], "user");
    assert_eq!(me["permissions"], json!([{ "id": 2, "name": "view-user" }]));
}

#[tokio::test]
async fn token_failures_share_one_generic_response() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let forged = {
        let other = TokenServiceFixture::new(9);
        other.issue()
    };

    let attempts = [None, Some("not-a-token".to_string()), Some(forged)];
    for token in attempts {
        let mut req = client.get(srv.url("/auth/me"));
        if let Some(token) = &token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(
            body,
            json!({ "error": "unauthorized", "message": "authentication required" })
        );
    }
}

#[tokio::test]
async fn logout_revokes_token_and_second_logout_is_reported() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.token_for(&client, "user@example.com").await;
    let sibling = srv.token_for(&client, "user@example.com").await;

    let res = client
        .post(srv.url("/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/auth/me")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_logged_out");

    let res = client.get(srv.url("/auth/me")).bearer_auth(&sibling).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn lockout_rejects_before_credential_verification() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let attacker = "198.51.100.23";

    for _ in 0..4 {
        let res = srv.login(&client, "user@example.com", "wrong", attacker).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
    // The failure that reaches the threshold already reports the lockout.
    let res = srv.login(&client, "user@example.com", "wrong", attacker).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["retry-after"], "7200");

    let calls_before = srv.credentials.calls.load(Ordering::SeqCst);
    let res = srv.login(&client, "user@example.com", PASSWORD, attacker).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "too_many_attempts");
    assert_eq!(srv.credentials.calls.load(Ordering::SeqCst), calls_before);

    let res = srv.login(&client, "user@example.com", PASSWORD, "198.51.100.24").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_login_burst_cannot_exceed_lockout_threshold() {
    let srv = Arc::new(
        TestServer::spawn_with(TestCredentials::default().with_delay(Duration::from_millis(50))).await,
    );
    let client = reqwest::Client::new();
    let attacker = "198.51.100.99";

    let tasks: Vec<_> = (0..40)
        .map(|_| {
            let srv = srv.clone();
            let client = client.clone();
            tokio::spawn(async move { srv.login(&client, "user@example.com", "wrong", attacker).await.status() })
        })
        .collect();
    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }

    assert_eq!(srv.credentials.calls.load(Ordering::SeqCst), 5);
    let locked = statuses.iter().filter(|s| **s == StatusCode::TOO_MANY_REQUESTS).count();
    let rejected = statuses.iter().filter(|s| **s == StatusCode::UNAUTHORIZED).count();
    assert_eq!((rejected, locked), (4, 36));
    assert_eq!(srv.state.lockout.failure_count(attacker).await.unwrap(), 5);

    let res = srv.login(&client, "user@example.com", PASSWORD, attacker).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(srv.credentials.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn successful_login_resets_failure_counter() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let origin = "203.0.113.50";

    for _ in 0..3 {
        srv.login(&client, "user@example.com", "wrong", origin).await;
    }
    assert_eq!(srv.state.lockout.failure_count(origin).await.unwrap(), 3);

    let res = srv.login(&client, "user@example.com", PASSWORD, origin).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.state.lockout.failure_count(origin).await.unwrap(), 0);
}

#[tokio::test]
async fn authorization_failures_do_not_count_as_login_failures() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for _ in 0..10 {
        let res = client
            .get(srv.url("/auth/me"))
            .header("x-forwarded-for", "192.0.2.77")
            .bearer_auth("garbage")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    assert_eq!(srv.state.lockout.failure_count("192.0.2.77").await.unwrap(), 0);
}

#[tokio::test]
async fn permission_route_requires_permission_bit() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = srv.token_for(&client, "admin@example.com").await;
    let user = srv.token_for(&client, "user@example.com").await;

    let res = client.get(srv.url("/auth/permissions")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let catalog: serde_json::Value = res.json().await.unwrap();
    assert_eq!(catalog.as_array().unwrap().len(), defaults::ALL.len());

    let res = client.get(srv.url("/auth/permissions")).bearer_auth(&user).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn admin_issues_labeled_tokens() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = srv.token_for(&client, "admin@example.com").await;
    let user = srv.token_for(&client, "user@example.com").await;

    let res = client
        .post(srv.url("/admin/tokens"))
        .bearer_auth(&user)
        .json(&json!({ "label": "nightly-export" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/admin/tokens"))
        .bearer_auth(&admin)
        .json(&json!({ "label": "nightly-export", "ttl_secs": 300 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let labeled = body["token"].as_str().unwrap();

    let res = client.get(srv.url("/auth/me")).bearer_auth(labeled).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["id"], serde_json::Value::Null);
    assert_eq!(me["email"], "nightly-export");
    assert_eq!(me["permissions"], json!([]));
}

#[tokio::test]
async fn bootstrap_refuses_to_start_without_keys() {
    let dir = tempfile::tempdir().unwrap();
    let vars = HashMap::from([
        (
            "GATEHOUSE_PRIVATE_KEY_PATH".to_string(),
            dir.path().join("missing-private.pem").display().to_string(),
        ),
        (
            "GATEHOUSE_PUBLIC_KEY_PATH".to_string(),
            dir.path().join("missing-public.pem").display().to_string(),
        ),
    ]);
    let config = GatehouseConfig::from_lookup(|var| vars.get(var).cloned()).unwrap();

    let err = bootstrap(&config).await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to load signing keys"));
}

#[tokio::test]
async fn bootstrap_serves_users_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let signing = ed25519_dalek::SigningKey::from_bytes(&[7; 32]);
    let private_path = dir.path().join("private.pem");
    let public_path = dir.path().join("public.pem");
    let users_path = dir.path().join("users.json");

    std::fs::write(&private_path, signing.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    std::fs::write(
        &public_path,
        signing.verifying_key().to_public_key_pem(LineEnding::LF).unwrap(),
    )
    .unwrap();
    let hash = gatehouse_api::credentials::hash_password(PASSWORD).unwrap();
    std::fs::write(
        &users_path,
        json!([{
            "id": 11,
            "email": "ops@example.com",
            "role": "admin",
            "permissions": [defaults::VIEW_PERMISSION],
            "password_hash": hash,
        }])
        .to_string(),
    )
    .unwrap();

    let vars = HashMap::from([
        ("GATEHOUSE_PRIVATE_KEY_PATH", private_path.display().to_string()),
        ("GATEHOUSE_PUBLIC_KEY_PATH", public_path.display().to_string()),
        ("GATEHOUSE_USERS_FILE", users_path.display().to_string()),
    ]);
    let config = GatehouseConfig::from_lookup(|var| vars.get(var).cloned()).unwrap();
    let (base_url, handle) = serve(bootstrap(&config).await.unwrap()).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{base_url}/auth/login"))
        .json(&json!({ "email": "ops@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{base_url}/auth/login"))
        .json(&json!({ "email": "ops@example.com", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    handle.abort();
}

/// Issues tokens with an unrelated key pair.
struct TokenServiceFixture {
    tokens: gatehouse_auth::TokenService,
}

impl TokenServiceFixture {
    fn new(seed: u8) -> Self {
        let revocations = gatehouse_auth::RevocationStore::new(Arc::new(InMemoryCache::new()), "");
        Self {
            tokens: gatehouse_auth::TokenService::new(Arc::new(ed25519_keys(seed)), revocations),
        }
    }

    fn issue(&self) -> String {
        self.tokens
            .issue(
                SubjectId::new(1),
                "admin@example.com",
                Role::from("admin"),
                BTreeSet::from([14]),
                chrono::Utc::now() + chrono::Duration::minutes(5),
            )
            .unwrap()
    }
}
