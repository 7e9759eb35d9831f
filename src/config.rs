// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into
//! [`AppConfig`] and injected through the application state.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_ENV` | `development` or `production` | `development` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | unset |
//! | `AUTH_PROVIDER` | `supabase`, `jwks` or `static` | `supabase` |
//! | `SUPABASE_URL` | Identity provider base URL | Required for `supabase`/`jwks` |
//! | `SUPABASE_ANON_KEY` | Provider API key | Required for `supabase` |
//! | `SUPABASE_SERVICE_ROLE_KEY` | Admin key for development email confirmation | unset |
//! | `SUPABASE_JWT_ISSUER` | Expected `iss` for `jwks` | `{SUPABASE_URL}/auth/v1` |
//! | `SUPABASE_JWT_AUDIENCE` | Expected `aud` for `jwks` | `authenticated` |
//! | `STATIC_AUTH_USERS` | JSON user list for `static` | `[]` |
//! | `IDENTITY_PROVIDER_TIMEOUT_MS` | Bound on each provider call | `5000` |
//! | `SESSION_COOKIE_NAME` | Cookie carrying the credential | `auth_token` |
//! | `RATE_LIMIT_WINDOW` | Window length in milliseconds | `60000` |
//! | `RATE_LIMIT_MAX_REQUESTS` | Requests allowed per window | `100` |
//! | `RATE_LIMIT_MAX_CLIENTS` | Client keys tracked at once | `10000` |
//! | `RATE_LIMIT_BYPASS_PATHS` | Comma list of path prefixes | `/api/health,/api/webhook` |
//! | `FRONTEND_URL` | Extra allowed CORS origin | unset |
//! | `ADDITIONAL_ALLOWED_ORIGINS` | JSON array or comma list of origins | unset |
//! | `MAX_INSPECTED_BODY_BYTES` | Largest body the pattern filter buffers | `1048576` |
//! | `TRUSTED_PROXY_HOPS` | Reverse proxies whose `X-Forwarded-For` entries count | `0` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::credential::DEFAULT_SESSION_COOKIE;
use crate::gatekeeper::rate_limit::{
    RateLimitConfig, DEFAULT_MAX_CLIENTS, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW,
};

pub const APP_ENV_ENV: &str = "APP_ENV";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const AUTH_PROVIDER_ENV: &str = "AUTH_PROVIDER";
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";
pub const SUPABASE_SERVICE_ROLE_KEY_ENV: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const SUPABASE_JWT_ISSUER_ENV: &str = "SUPABASE_JWT_ISSUER";
pub const SUPABASE_JWT_AUDIENCE_ENV: &str = "SUPABASE_JWT_AUDIENCE";
pub const STATIC_AUTH_USERS_ENV: &str = "STATIC_AUTH_USERS";
pub const IDENTITY_PROVIDER_TIMEOUT_ENV: &str = "IDENTITY_PROVIDER_TIMEOUT_MS";
pub const SESSION_COOKIE_NAME_ENV: &str = "SESSION_COOKIE_NAME";
pub const RATE_LIMIT_WINDOW_ENV: &str = "RATE_LIMIT_WINDOW";
pub const RATE_LIMIT_MAX_REQUESTS_ENV: &str = "RATE_LIMIT_MAX_REQUESTS";
pub const RATE_LIMIT_MAX_CLIENTS_ENV: &str = "RATE_LIMIT_MAX_CLIENTS";
pub const RATE_LIMIT_BYPASS_PATHS_ENV: &str = "RATE_LIMIT_BYPASS_PATHS";
pub const FRONTEND_URL_ENV: &str = "FRONTEND_URL";
pub const ADDITIONAL_ALLOWED_ORIGINS_ENV: &str = "ADDITIONAL_ALLOWED_ORIGINS";
pub const MAX_INSPECTED_BODY_BYTES_ENV: &str = "MAX_INSPECTED_BODY_BYTES";
pub const TRUSTED_PROXY_HOPS_ENV: &str = "TRUSTED_PROXY_HOPS";

/// Origins allowed regardless of configuration (local frontends).
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://localhost:8080",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:8080",
];

pub const DEFAULT_BYPASS_PATHS: &[&str] = &["/api/health", "/api/webhook"];
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_INSPECTED_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_JWT_AUDIENCE: &str = "authenticated";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },
    #[error("{0} must use https in production")]
    InsecureUrl(&'static str),
    #[error("unknown value {value:?} for {var}")]
    UnknownValue { var: &'static str, value: String },
    #[error("{0} must be set together with {1}")]
    Incomplete(&'static str, &'static str),
    #[error("the static identity provider cannot be used in production")]
    StaticProviderInProduction,
}

/// Deployment mode. Production tightens CORS and adds HSTS and
/// `Permissions-Policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Mode::Production),
            "development" | "dev" | "test" => Ok(Mode::Development),
            other => Err(ConfigError::UnknownValue {
                var: APP_ENV_ENV,
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Supabase,
    Jwks,
    Static,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(ProviderKind::Supabase),
            "jwks" => Ok(ProviderKind::Jwks),
            "static" => Ok(ProviderKind::Static),
            other => Err(ConfigError::UnknownValue {
                var: AUTH_PROVIDER_ENV,
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Identity provider settings.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub provider: ProviderKind,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: String,
    pub static_users: String,
    pub provider_timeout: Duration,
    pub cookie_name: String,
}

impl AuthSettings {
    /// `SUPABASE_JWT_ISSUER`, or the project's GoTrue URL.
    pub fn issuer(&self) -> Option<String> {
        self.jwt_issuer.clone().or_else(|| {
            self.supabase_url
                .as_deref()
                .map(|url| format!("{}/auth/v1", url.trim_end_matches('/')))
        })
    }
}

// Keys and user tables stay out of logs.
impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("provider", &self.provider)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key.as_ref().map(|_| "<redacted>"))
            .field(
                "supabase_service_role_key",
                &self.supabase_service_role_key.as_ref().map(|_| "<redacted>"),
            )
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("provider_timeout", &self.provider_timeout)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub mode: Mode,
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsPaths>,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_bypass: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub max_inspected_body_bytes: usize,
    /// Reverse proxies in front of the service whose `X-Forwarded-For`
    /// entries are trusted; 0 keys clients on the socket peer only.
    pub trusted_proxy_hops: usize,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mode = var(APP_ENV_ENV)
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Incomplete(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Incomplete(TLS_KEY_PATH_ENV, TLS_CERT_PATH_ENV)),
        };

        let auth = AuthSettings {
            provider: var(AUTH_PROVIDER_ENV)
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            supabase_url: var(SUPABASE_URL_ENV).map(|url| url.trim_end_matches('/').to_string()),
            supabase_anon_key: var(SUPABASE_ANON_KEY_ENV),
            supabase_service_role_key: var(SUPABASE_SERVICE_ROLE_KEY_ENV),
            jwt_issuer: var(SUPABASE_JWT_ISSUER_ENV),
            jwt_audience: var(SUPABASE_JWT_AUDIENCE_ENV)
                .unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.to_string()),
            static_users: var(STATIC_AUTH_USERS_ENV).unwrap_or_else(|| "[]".to_string()),
            provider_timeout: Duration::from_millis(parse_or(
                IDENTITY_PROVIDER_TIMEOUT_ENV,
                var(IDENTITY_PROVIDER_TIMEOUT_ENV),
                DEFAULT_PROVIDER_TIMEOUT_MS,
            )),
            cookie_name: var(SESSION_COOKIE_NAME_ENV)
                .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string()),
        };

        let rate_limit = RateLimitConfig {
            window: Duration::from_millis(parse_or(
                RATE_LIMIT_WINDOW_ENV,
                var(RATE_LIMIT_WINDOW_ENV),
                DEFAULT_WINDOW.as_millis() as u64,
            )),
            max_requests: parse_or(
                RATE_LIMIT_MAX_REQUESTS_ENV,
                var(RATE_LIMIT_MAX_REQUESTS_ENV),
                DEFAULT_MAX_REQUESTS,
            ),
            max_clients: parse_or(
                RATE_LIMIT_MAX_CLIENTS_ENV,
                var(RATE_LIMIT_MAX_CLIENTS_ENV),
                DEFAULT_MAX_CLIENTS,
            ),
        };

        let rate_limit_bypass = match var(RATE_LIMIT_BYPASS_PATHS_ENV) {
            Some(raw) => split_list(&raw),
            None => DEFAULT_BYPASS_PATHS.iter().map(|p| p.to_string()).collect(),
        };

        let mut allowed_origins: Vec<String> =
            DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect();
        allowed_origins.extend(var(FRONTEND_URL_ENV));
        if let Some(raw) = var(ADDITIONAL_ALLOWED_ORIGINS_ENV) {
            allowed_origins.extend(parse_origin_list(&raw));
        }
        allowed_origins.retain(|o| !o.is_empty());
        let mut seen = std::collections::HashSet::new();
        allowed_origins.retain(|o| seen.insert(o.clone()));

        Ok(Self {
            mode,
            host: var(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(PORT_ENV, var(PORT_ENV), 8080),
            tls,
            auth,
            rate_limit,
            rate_limit_bypass,
            allowed_origins,
            max_inspected_body_bytes: parse_or(
                MAX_INSPECTED_BODY_BYTES_ENV,
                var(MAX_INSPECTED_BODY_BYTES_ENV),
                DEFAULT_MAX_INSPECTED_BODY_BYTES,
            ),
            trusted_proxy_hops: parse_or(TRUSTED_PROXY_HOPS_ENV, var(TRUSTED_PROXY_HOPS_ENV), 0),
        })
    }

    /// Check provider settings.
    ///
    /// Problems are fatal in production. In development they are logged and
    /// the returned list is informational.
    pub fn validate(&self) -> Result<Vec<ConfigError>, ConfigError> {
        let problems = self.provider_problems();

        if self.mode.is_production() {
            if let Some(first) = problems.into_iter().next() {
                return Err(first);
            }
            return Ok(Vec::new());
        }

        for problem in &problems {
            warn!(error = %problem, "Configuration problem (ignored in development)");
        }
        Ok(problems)
    }

    fn provider_problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        let auth = &self.auth;

        if auth.provider == ProviderKind::Static && self.mode.is_production() {
            problems.push(ConfigError::StaticProviderInProduction);
        }

        let needs_url = matches!(auth.provider, ProviderKind::Supabase | ProviderKind::Jwks);
        match (&auth.supabase_url, needs_url) {
            (None, true) => problems.push(ConfigError::Missing(SUPABASE_URL_ENV)),
            (Some(raw), true) => match url::Url::parse(raw) {
                Ok(parsed) if parsed.scheme() != "https" && self.mode.is_production() => {
                    problems.push(ConfigError::InsecureUrl(SUPABASE_URL_ENV))
                }
                Ok(_) => {}
                Err(e) => problems.push(ConfigError::InvalidUrl {
                    var: SUPABASE_URL_ENV,
                    reason: e.to_string(),
                }),
            },
            _ => {}
        }

        if auth.provider == ProviderKind::Supabase && auth.supabase_anon_key.is_none() {
            problems.push(ConfigError::Missing(SUPABASE_ANON_KEY_ENV));
        }

        problems
    }
}

fn parse_or<T>(var: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy + fmt::Display,
{
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var, value = %raw, default = %default, "Invalid number, using default");
            default
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `ADDITIONAL_ALLOWED_ORIGINS`: a JSON array of strings, or a comma
/// list. Invalid JSON arrays are logged and ignored.
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return match serde_json::from_str::<Vec<String>>(raw) {
            Ok(list) => list
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            Err(e) => {
                warn!(
                    var = ADDITIONAL_ALLOWED_ORIGINS_ENV,
                    error = %e,
                    "Failed to parse allowed origins, ignoring"
                );
                Vec::new()
            }
        };
    }
    split_list(raw)
}

/// Environment snapshot helper for tests.
#[cfg(test)]
pub(crate) fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
    let map: std::collections::HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(|key| map.get(key).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.auth.cookie_name, "auth_token");
        assert_eq!(config.auth.provider_timeout, Duration::from_secs(5));
        assert_eq!(config.rate_limit_bypass, vec!["/api/health", "/api/webhook"]);
        assert_eq!(config.allowed_origins.len(), DEFAULT_ALLOWED_ORIGINS.len());
        assert!(config.tls.is_none());
        assert_eq!(config.trusted_proxy_hops, 0);
        assert!(config.auth.supabase_service_role_key.is_none());
    }

    #[test]
    fn trusted_proxy_hops_from_environment() {
        let config = config_from(&[(TRUSTED_PROXY_HOPS_ENV, "2")]).unwrap();
        assert_eq!(config.trusted_proxy_hops, 2);

        let config = config_from(&[(TRUSTED_PROXY_HOPS_ENV, "-1")]).unwrap();
        assert_eq!(config.trusted_proxy_hops, 0);
    }

    #[test]
    fn rate_limit_overrides_and_bad_numbers() {
        let config = config_from(&[
            (RATE_LIMIT_WINDOW_ENV, "1000"),
            (RATE_LIMIT_MAX_REQUESTS_ENV, "3"),
            (PORT_ENV, "not-a-port"),
        ])
        .unwrap();
        assert_eq!(config.rate_limit.window, Duration::from_secs(1));
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn origins_from_frontend_url_and_json_list() {
        let config = config_from(&[
            (FRONTEND_URL_ENV, "https://roster.example.com"),
            (
                ADDITIONAL_ALLOWED_ORIGINS_ENV,
                r#"["https://a.example.com", "", "https://roster.example.com"]"#,
            ),
        ])
        .unwrap();
        let tail: Vec<&str> = config.allowed_origins[DEFAULT_ALLOWED_ORIGINS.len()..]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(tail, vec!["https://roster.example.com", "https://a.example.com"]);
    }

    #[test]
    fn origin_list_accepts_comma_form_and_ignores_bad_json() {
        assert_eq!(
            parse_origin_list("https://a.example.com, https://b.example.com"),
            vec!["https://a.example.com", "https://b.example.com"]
        );
        assert!(parse_origin_list("[not json").is_empty());
    }

    #[test]
    fn unknown_mode_and_provider_are_errors() {
        assert!(matches!(
            config_from(&[(APP_ENV_ENV, "staging")]),
            Err(ConfigError::UnknownValue { .. })
        ));
        assert!(matches!(
            config_from(&[(AUTH_PROVIDER_ENV, "auth0")]),
            Err(ConfigError::UnknownValue { .. })
        ));
    }

    #[test]
    fn tls_paths_must_come_in_pairs() {
        assert_eq!(
            config_from(&[(TLS_CERT_PATH_ENV, "/certs/server.pem")]),
            Err(ConfigError::Incomplete(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV))
        );
    }

    #[test]
    fn production_requires_https_provider() {
        let config = config_from(&[
            (APP_ENV_ENV, "production"),
            (SUPABASE_URL_ENV, "http://abc.supabase.co"),
            (SUPABASE_ANON_KEY_ENV, "anon"),
        ])
        .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::InsecureUrl(SUPABASE_URL_ENV)));
    }

    #[test]
    fn development_only_warns() {
        let config = config_from(&[]).unwrap();
        let problems = config.validate().unwrap();
        assert!(problems.contains(&ConfigError::Missing(SUPABASE_URL_ENV)));
        assert!(problems.contains(&ConfigError::Missing(SUPABASE_ANON_KEY_ENV)));
    }

    #[test]
    fn static_provider_rejected_in_production() {
        let config = config_from(&[(APP_ENV_ENV, "production"), (AUTH_PROVIDER_ENV, "static")])
            .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::StaticProviderInProduction));
    }

    #[test]
    fn jwks_issuer_defaults_to_project_url() {
        let config = config_from(&[
            (AUTH_PROVIDER_ENV, "jwks"),
            (SUPABASE_URL_ENV, "https://abc.supabase.co/"),
        ])
        .unwrap();
        assert_eq!(
            config.auth.issuer().as_deref(),
            Some("https://abc.supabase.co/auth/v1")
        );
    }

    #[test]
    fn provider_keys_are_redacted_in_debug() {
        let config = config_from(&[
            (SUPABASE_ANON_KEY_ENV, "super-secret-anon"),
            (SUPABASE_SERVICE_ROLE_KEY_ENV, "super-secret-service"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-anon"));
        assert!(!debug.contains("super-secret-service"));
        assert_eq!(
            config.auth.supabase_service_role_key.as_deref(),
            Some("super-secret-service")
        );
    }
}
