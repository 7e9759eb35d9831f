// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Supabase Auth (GoTrue) identity provider.
//!
//! - `GET  {url}/auth/v1/user` verifies a bearer token and returns the user
//! - `POST {url}/auth/v1/token?grant_type=password` signs in with email/password
//! - `GET  {url}/auth/v1/health` is used by the readiness probe
//! - `POST {url}/auth/v1/recover` sends a password recovery email
//! - `GET  {url}/auth/v1/admin/users` and `PUT {url}/auth/v1/admin/users/{id}`
//!   confirm an email address; these need the service role key
//!
//! Every request carries the project key in the `apikey` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::credential::Credential;
use super::provider::{
    application_role, IdentityProvider, Principal, ProviderError, ProviderSession,
};

const USER_PATH: &str = "/auth/v1/user";
const TOKEN_PATH: &str = "/auth/v1/token?grant_type=password";
const HEALTH_PATH: &str = "/auth/v1/health";
const RECOVER_PATH: &str = "/auth/v1/recover";
const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";

const ADMIN_PAGE_SIZE: usize = 1000;
const MAX_ADMIN_PAGES: usize = 20;

#[derive(Clone)]
pub struct SupabaseProvider {
    base_url: String,
    anon_key: String,
    service_role_key: Option<String>,
    http: Client,
}

impl std::fmt::Debug for SupabaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseProvider")
            .field("base_url", &self.base_url)
            .field("service_role", &self.service_role_key.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    #[serde(default)]
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: Option<Map<String, Value>>,
    #[serde(default)]
    user_metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct AdminUserPage {
    #[serde(default)]
    users: Vec<SupabaseUser>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl SupabaseProvider {
    /// Create a provider for the given project URL and API key.
    ///
    /// `timeout` bounds every HTTP request made by this provider.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_role_key: None,
            http,
        })
    }

    /// Enable the admin operations (email confirmation).
    pub fn with_service_role_key(mut self, key: Option<String>) -> Self {
        self.service_role_key = key;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn service_role_key(&self) -> Result<&str, ProviderError> {
        self.service_role_key
            .as_deref()
            .ok_or(ProviderError::Unsupported("email confirmation without a service role key"))
    }

    /// Look a user up by email through the paginated admin listing.
    async fn find_user_by_email(&self, email: &str) -> Result<SupabaseUser, ProviderError> {
        let key = self.service_role_key()?;

        for page in 1..=MAX_ADMIN_PAGES {
            let response = self
                .http
                .get(self.endpoint(ADMIN_USERS_PATH))
                .query(&[("page", page), ("per_page", ADMIN_PAGE_SIZE)])
                .header("apikey", key)
                .bearer_auth(key)
                .send()
                .await
                .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(map_admin_status(status, "user lookup"));
            }

            let listing: AdminUserPage = response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            let exhausted = listing.users.len() < ADMIN_PAGE_SIZE;

            if let Some(user) = listing.users.into_iter().find(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            }) {
                return Ok(user);
            }
            if exhausted {
                break;
            }
        }

        Err(ProviderError::NotFound(email.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseProvider {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn verify(&self, credential: &Credential) -> Result<Principal, ProviderError> {
        let response = self
            .http
            .get(self.endpoint(USER_PATH))
            .header("apikey", &self.anon_key)
            .bearer_auth(credential.as_str())
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "token verification"));
        }

        let user: SupabaseUser = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        principal_from_user(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        let response = self
            .http
            .post(self.endpoint(TOKEN_PATH))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // GoTrue answers 400 `invalid_grant` for bad credentials.
            if status == StatusCode::BAD_REQUEST {
                return Err(ProviderError::Rejected("invalid credentials".to_string()));
            }
            return Err(map_status(status, "password sign-in"));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(ProviderSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in.unwrap_or(3600),
            token_type: token.token_type.unwrap_or_else(|| "bearer".to_string()),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .http
            .get(self.endpoint(HEALTH_PATH))
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(format!(
                "HTTP {} from health endpoint",
                response.status()
            )))
        }
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(self.endpoint(RECOVER_PATH))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(map_status(status, "password recovery"))
        }
    }

    async fn confirm_email(&self, email: &str) -> Result<(), ProviderError> {
        let user = self.find_user_by_email(email).await?;
        let key = self.service_role_key()?;

        let response = self
            .http
            .put(format!("{}/{}", self.endpoint(ADMIN_USERS_PATH), user.id))
            .header("apikey", key)
            .bearer_auth(key)
            .json(&json!({ "email_confirm": true }))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(map_admin_status(status, "email confirmation"))
        }
    }
}

fn map_status(status: StatusCode, operation: &str) -> ProviderError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Unavailable(format!("HTTP {status} during {operation}"))
    } else {
        ProviderError::Rejected(format!("HTTP {status} during {operation}"))
    }
}

// A refused service role key is a deployment problem, not a caller mistake.
fn map_admin_status(status: StatusCode, operation: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unavailable(format!("HTTP {status} during {operation}"))
        }
        StatusCode::NOT_FOUND => ProviderError::NotFound(format!("HTTP {status} during {operation}")),
        _ => map_status(status, operation),
    }
}

fn principal_from_user(user: SupabaseUser) -> Result<Principal, ProviderError> {
    if user.id.trim().is_empty() {
        return Err(ProviderError::InvalidResponse("user without id".to_string()));
    }

    let metadata = user.user_metadata.unwrap_or_default();
    let role_claim = application_role(user.app_metadata.as_ref(), &metadata);
    let display_name = metadata
        .get("displayName")
        .or_else(|| metadata.get("display_name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Principal {
        id: user.id,
        email: user.email.unwrap_or_default(),
        role_claim,
        display_name,
        metadata,
    })
}
