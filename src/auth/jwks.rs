// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching, caching and local JWT verification.
//!
//! ## Security
//!
//! - Keys are cached with a configurable TTL
//! - A token signed with an unknown `kid` forces one refetch, at most once per
//!   [`MIN_ROTATION_REFETCH`], so rotated keys are picked up before the TTL ends
//! - A failed fetch with no fresh cache is reported as provider unavailable
//!   (fail closed)
//! - Clock skew tolerance is 60 seconds
//!
//! ## Usage
//!
//! Selected with `AUTH_PROVIDER=jwks`. The key set is read from
//! `{SUPABASE_URL}/auth/v1/.well-known/jwks.json`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::{Mutex, RwLock};

use super::claims::SupabaseClaims;
use super::credential::Credential;
use super::provider::{IdentityProvider, Principal, ProviderError, ProviderSession};

/// How long a fetched key set is trusted before it is fetched again.
const KEY_SET_TTL: Duration = Duration::from_secs(300);

/// Shortest gap between refetches triggered by an unknown `kid`.
pub const MIN_ROTATION_REFETCH: Duration = Duration::from_secs(30);

/// Clock skew tolerance in seconds.
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Path of the key set relative to the project URL.
pub const JWKS_PATH: &str = "/auth/v1/.well-known/jwks.json";

struct CachedKeys {
    keys: JwkSet,
    expires_at: Instant,
}

impl CachedKeys {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Fetches the project's key set and keeps it for [`KEY_SET_TTL`].
#[derive(Clone)]
pub struct JwksManager {
    url: String,
    ttl: Duration,
    cached: Arc<RwLock<Option<CachedKeys>>>,
    last_rotation_refetch: Arc<Mutex<Option<Instant>>>,
    http: reqwest::Client,
}

impl JwksManager {
    /// `timeout` bounds each key set fetch.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            ttl: KEY_SET_TTL,
            cached: Arc::new(RwLock::new(None)),
            last_rotation_refetch: Arc::new(Mutex::new(None)),
            http,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cached key set, fetched when missing or stale.
    async fn key_set(&self) -> Result<JwkSet, ProviderError> {
        if let Some(cached) = self.cached.read().await.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.keys.clone());
        }
        self.refresh().await
    }

    /// Fetch the key set now and replace the cached copy.
    pub async fn refresh(&self) -> Result<JwkSet, ProviderError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "HTTP {status} from key set endpoint"
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        *self.cached.write().await = Some(CachedKeys {
            keys: keys.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(keys)
    }

    pub async fn is_cached(&self) -> bool {
        self.cached
            .read()
            .await
            .as_ref()
            .is_some_and(CachedKeys::is_fresh)
    }

    /// Decoding key for `kid`, or the first usable key when the token has none.
    pub async fn decoding_key(
        &self,
        kid: Option<&str>,
    ) -> Result<(DecodingKey, Algorithm), ProviderError> {
        let keys = self.key_set().await?;

        let Some(kid) = kid else {
            return keys
                .keys
                .iter()
                .find_map(|jwk| decoding_key_for(jwk).ok())
                .ok_or_else(|| ProviderError::Rejected("no usable key in key set".to_string()));
        };

        if let Some(jwk) = keys.find(kid) {
            return decoding_key_for(jwk);
        }

        // The provider may have rotated its keys since the cached fetch.
        let keys = self.refetch_for_unknown_kid(kid).await?;
        keys.find(kid)
            .ok_or_else(|| ProviderError::Rejected(format!("no key with kid {kid}")))
            .and_then(decoding_key_for)
    }

    async fn refetch_for_unknown_kid(&self, kid: &str) -> Result<JwkSet, ProviderError> {
        let mut last = self.last_rotation_refetch.lock().await;
        if last.is_some_and(|at| at.elapsed() < MIN_ROTATION_REFETCH) {
            return Err(ProviderError::Rejected(format!("no key with kid {kid}")));
        }
        *last = Some(Instant::now());
        self.refresh().await
    }
}

fn decoding_key_for(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), ProviderError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|e| {
                ProviderError::InvalidResponse(format!("failed to create RSA key: {e}"))
            })?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                _ => Algorithm::RS256,
            };

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y).map_err(|e| {
                ProviderError::InvalidResponse(format!("failed to create EC key: {e}"))
            })?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };

            Ok((key, alg))
        }
        _ => Err(ProviderError::InvalidResponse(
            "unsupported key type in JWKS".to_string(),
        )),
    }
}

/// Identity provider that verifies Supabase access tokens locally.
#[derive(Clone)]
pub struct JwksProvider {
    jwks: JwksManager,
    issuer: String,
    audience: String,
}

impl JwksProvider {
    pub fn new(jwks: JwksManager, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwksProvider {
    fn name(&self) -> &'static str {
        "jwks"
    }

    async fn verify(&self, credential: &Credential) -> Result<Principal, ProviderError> {
        let header = decode_header(credential.as_str())
            .map_err(|_| ProviderError::Rejected("malformed token".to_string()))?;

        let (decoding_key, algorithm) = self.jwks.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let token_data = decode::<SupabaseClaims>(credential.as_str(), &decoding_key, &validation)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidIssuer => "invalid issuer",
                    ErrorKind::InvalidAudience => "invalid audience",
                    ErrorKind::ImmatureSignature => "token not yet valid",
                    _ => "malformed token",
                };
                ProviderError::Rejected(reason.to_string())
            })?;

        Ok(token_data.claims.into_principal())
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<ProviderSession, ProviderError> {
        Err(ProviderError::Unsupported("password sign-in"))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.jwks.is_cached().await {
            return Ok(());
        }
        self.jwks.refresh().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> JwksManager {
        JwksManager::new(
            "https://abc.supabase.co/auth/v1/.well-known/jwks.json",
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn key_set_url_and_ttl() {
        let manager = manager().with_ttl(Duration::from_secs(60));
        assert_eq!(manager.url(), "https://abc.supabase.co/auth/v1/.well-known/jwks.json");
        assert_eq!(manager.ttl, Duration::from_secs(60));
    }

    #[test]
    fn cached_keys_expire() {
        let stale = CachedKeys {
            keys: JwkSet { keys: Vec::new() },
            expires_at: Instant::now() - Duration::from_secs(1),
        };
        assert!(!stale.is_fresh());
    }

    #[tokio::test]
    async fn cache_initially_empty() {
        assert!(!manager().is_cached().await);
    }

    #[tokio::test]
    async fn malformed_token_is_rejected_without_fetching_keys() {
        let provider = JwksProvider::new(manager(), "iss", "authenticated");
        let result = provider.verify(&Credential::new("not-a-jwt")).await;
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
        assert!(!provider.jwks.is_cached().await);
    }

    /// Serve a key set that gains the `rotated` key after the first fetch.
    async fn spawn_rotating_key_set() -> (String, Arc<AtomicUsize>) {
        const N: &str = "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw";

        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = fetches.clone();
        let app = Router::new().route(
            JWKS_PATH,
            get(move || {
                let counter = counter.clone();
                async move {
                    let kids: &[&str] = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        &["current"]
                    } else {
                        &["current", "rotated"]
                    };
                    let keys: Vec<_> = kids
                        .iter()
                        .map(|kid| json!({ "kty": "RSA", "kid": kid, "alg": "RS256", "n": N, "e": "AQAB" }))
                        .collect();
                    Json(json!({ "keys": keys }))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}{JWKS_PATH}"), fetches)
    }

    #[tokio::test]
    async fn unknown_kid_refetches_rotated_key_set_once() {
        let (url, fetches) = spawn_rotating_key_set().await;
        let manager = JwksManager::new(url, Duration::from_secs(5)).unwrap();

        let (_, alg) = manager.decoding_key(Some("current")).await.unwrap();
        assert_eq!(alg, Algorithm::RS256);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // Cached set is fresh but lacks the new key.
        manager.decoding_key(Some("rotated")).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        // A second unknown kid inside the refetch interval is not refetched.
        let missing = manager.decoding_key(Some("forged")).await;
        assert!(matches!(missing, Err(ProviderError::Rejected(_))));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn password_sign_in_is_unsupported() {
        let provider = JwksProvider::new(manager(), "iss", "authenticated");
        let result = provider.sign_in("a@b.c", "pw").await;
        assert_eq!(result.unwrap_err(), ProviderError::Unsupported("password sign-in"));
    }
}
