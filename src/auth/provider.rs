// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity provider boundary.
//!
//! The resolver talks to the identity provider through [`IdentityProvider`].
//! Three implementations exist:
//!
//! - [`SupabaseProvider`](super::supabase::SupabaseProvider) - canonical,
//!   verifies every credential with the provider's user endpoint
//! - [`JwksProvider`](super::jwks::JwksProvider) - verifies provider-issued
//!   JWTs locally against the published key set
//! - [`StaticTokenProvider`](super::static_tokens::StaticTokenProvider) -
//!   fixed token table for development and tests

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::credential::Credential;

/// Principal returned by the provider for a verified credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: String,
    pub email: String,
    /// Application role claim, see [`application_role`]
    pub role_claim: Option<String>,
    pub display_name: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Session issued by a password sign-in.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderSession {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds
    pub expires_in: u64,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the credential or the sign-in attempt.
    #[error("rejected by identity provider: {0}")]
    Rejected(String),

    /// The provider could not be reached or failed internally.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// The account an administrative operation names does not exist.
    #[error("no such user: {0}")]
    NotFound(String),

    /// The provider answered with something we could not interpret.
    #[error("invalid identity provider response: {0}")]
    InvalidResponse(String),

    /// The operation is not offered by this provider.
    #[error("operation not supported by identity provider: {0}")]
    Unsupported(&'static str),
}

/// Pick the application role out of Supabase user metadata.
///
/// `app_metadata` is writable only with the service role key, while users can
/// change their own `user_metadata` through the auth API. A role in
/// `app_metadata` therefore wins; `user_metadata.role` is read only for
/// accounts that have none, so deployments that grant Manager must set it in
/// `app_metadata`.
pub fn application_role(
    app_metadata: Option<&Map<String, Value>>,
    user_metadata: &Map<String, Value>,
) -> Option<String> {
    app_metadata
        .and_then(|app| app.get("role"))
        .or_else(|| user_metadata.get("role"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Verify a bearer credential and return the principal it belongs to.
    ///
    /// Called exactly once per resolution; implementations must not retry.
    async fn verify(&self, credential: &Credential) -> Result<Principal, ProviderError>;

    /// Exchange email and password for a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError>;

    /// Cheap reachability check used by the readiness probe.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Ask the provider to email a password recovery link.
    async fn send_password_reset(&self, _email: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("password reset"))
    }

    /// Mark the account's email address as confirmed. Needs administrative
    /// access to the provider.
    async fn confirm_email(&self, _email: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("email confirmation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn app_metadata_role_overrides_user_metadata() {
        let app = map(json!({ "provider": "email", "role": "Player" }));
        let user = map(json!({ "role": "Manager" }));
        assert_eq!(application_role(Some(&app), &user).as_deref(), Some("Player"));
    }

    #[test]
    fn user_metadata_role_used_when_app_metadata_has_none() {
        let app = map(json!({ "provider": "email" }));
        let user = map(json!({ "role": "Manager" }));
        assert_eq!(application_role(Some(&app), &user).as_deref(), Some("Manager"));
        assert_eq!(application_role(None, &user).as_deref(), Some("Manager"));
        assert_eq!(application_role(None, &Map::new()), None);
    }
}
