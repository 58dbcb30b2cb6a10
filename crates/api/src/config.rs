//! Process configuration read from `GATEHOUSE_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gatehouse_auth::{KeyAlgorithm, LockoutPolicy, RevocationFailurePolicy};
use gatehouse_observability::LogFormat;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_CACHE_PREFIX: &str = "gatehouse:";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Settings shared by the token service, revocation store and login counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub cache_prefix: String,
    pub token_ttl: Duration,
    pub lockout: LockoutPolicy,
    pub revocation_policy: RevocationFailurePolicy,
    /// Take the login origin from `X-Forwarded-For` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            lockout: LockoutPolicy::default(),
            revocation_policy: RevocationFailurePolicy::default(),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatehouseConfig {
    pub bind_addr: SocketAddr,
    pub key_algorithm: KeyAlgorithm,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// `None` runs with the process-local cache.
    pub redis_url: Option<String>,
    pub cache_timeout: Duration,
    pub users_file: Option<PathBuf>,
    pub log_format: LogFormat,
    pub auth: AuthSettings,
}

impl GatehouseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let defaults = AuthSettings::default();
        let lockout = LockoutPolicy {
            threshold: parse_or(&get, "GATEHOUSE_LOCKOUT_THRESHOLD", defaults.lockout.threshold)?,
            window: parse_secs_or(&get, "GATEHOUSE_LOCKOUT_WINDOW_SECS", defaults.lockout.window)?,
            reset_on_success: parse_bool_or(
                &get,
                "GATEHOUSE_LOCKOUT_RESET_ON_SUCCESS",
                defaults.lockout.reset_on_success,
            )?,
        };
        if lockout.threshold == 0 {
            return Err(invalid("GATEHOUSE_LOCKOUT_THRESHOLD", "must be at least 1"));
        }

        let token_ttl = parse_secs_or(&get, "GATEHOUSE_TOKEN_TTL_SECS", defaults.token_ttl)?;
        if token_ttl.is_zero() {
            return Err(invalid("GATEHOUSE_TOKEN_TTL_SECS", "must be at least 1"));
        }

        let auth = AuthSettings {
            cache_prefix: get("GATEHOUSE_CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            token_ttl,
            lockout,
            revocation_policy: parse_or(&get, "GATEHOUSE_REVOCATION_POLICY", defaults.revocation_policy)?,
            trust_forwarded_for: parse_bool_or(&get, "GATEHOUSE_TRUST_FORWARDED_FOR", false)?,
        };

        Ok(Self {
            bind_addr: parse_or(
                &get,
                "GATEHOUSE_BIND_ADDR",
                DEFAULT_BIND_ADDR
                    .parse()
                    .map_err(|_| invalid("GATEHOUSE_BIND_ADDR", "bad default"))?,
            )?,
            key_algorithm: parse_or(&get, "GATEHOUSE_KEY_ALGORITHM", KeyAlgorithm::default())?,
            private_key_path: required("GATEHOUSE_PRIVATE_KEY_PATH")?.into(),
            public_key_path: required("GATEHOUSE_PUBLIC_KEY_PATH")?.into(),
            redis_url: get("GATEHOUSE_REDIS_URL"),
            cache_timeout: Duration::from_millis(parse_or(
                &get,
                "GATEHOUSE_CACHE_TIMEOUT_MS",
                DEFAULT_CACHE_TIMEOUT.as_millis() as u64,
            )?),
            users_file: get("GATEHOUSE_USERS_FILE").map(PathBuf::from),
            log_format: parse_or(&get, "GATEHOUSE_LOG_FORMAT", LogFormat::default())?,
            auth,
        })
    }
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    G: Fn(&'static str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(var, e.to_string())),
    }
}

fn parse_secs_or<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&'static str) -> Option<String>,
{
    parse_or(get, var, default.as_secs()).map(Duration::from_secs)
}

fn parse_bool_or<G>(get: &G, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&'static str) -> Option<String>,
{
    match get(var).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(var, format!("'{v}' is not a boolean"))),
        },
    }
}
