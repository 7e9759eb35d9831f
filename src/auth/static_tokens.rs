// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed token table identity provider for development and tests.
//!
//! Users are configured through `STATIC_AUTH_USERS` as a JSON list:
//!
//! ```json
//! [{ "id": "u1", "email": "coach@example.com", "password": "dev",
//!    "token": "dev-manager-token", "role": "Manager", "displayName": "Coach" }]
//! ```
//!
//! Never select this provider in production.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::credential::Credential;
use super::provider::{IdentityProvider, Principal, ProviderError, ProviderSession};

/// Token lifetime reported by sign-in.
const STATIC_TOKEN_TTL_SECS: u64 = 60 * 60 * 24 * 7;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticUser {
    pub id: String,
    pub email: String,
    pub password: String,
    pub token: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl StaticUser {
    fn principal(&self) -> Principal {
        let mut metadata = Map::new();
        if let Some(role) = &self.role {
            metadata.insert("role".to_string(), Value::String(role.clone()));
        }
        if let Some(name) = &self.display_name {
            metadata.insert("displayName".to_string(), Value::String(name.clone()));
        }

        Principal {
            id: self.id.clone(),
            email: self.email.clone(),
            role_claim: self.role.clone(),
            display_name: self.display_name.clone(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    by_token: HashMap<String, StaticUser>,
}

impl StaticTokenProvider {
    pub fn new(users: impl IntoIterator<Item = StaticUser>) -> Self {
        let by_token = users
            .into_iter()
            .filter(|u| !u.token.is_empty())
            .map(|u| (u.token.clone(), u))
            .collect();
        Self { by_token }
    }

    /// Parse the `STATIC_AUTH_USERS` JSON list.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let users: Vec<StaticUser> = serde_json::from_str(raw)?;
        Ok(Self::new(users))
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn verify(&self, credential: &Credential) -> Result<Principal, ProviderError> {
        self.by_token
            .get(credential.as_str())
            .map(StaticUser::principal)
            .ok_or_else(|| ProviderError::Rejected("unknown token".to_string()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        let user = self
            .by_token
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email) && u.password == password)
            .ok_or_else(|| ProviderError::Rejected("invalid credentials".to_string()))?;

        Ok(ProviderSession {
            access_token: user.token.clone(),
            refresh_token: None,
            expires_in: STATIC_TOKEN_TTL_SECS,
            token_type: "bearer".to_string(),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
