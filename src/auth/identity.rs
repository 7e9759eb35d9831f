// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resolved identities and the session record handed to route handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::provider::Principal;
use super::roles::Role;

/// Authenticated principal resolved for a single request.
///
/// Never persisted and never shared across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Identity provider user ID
    pub id: String,
    pub email: String,
    /// Role taken from the provider's role claim
    pub role: Role,
    /// Display name, falling back to the email
    pub display_name: String,
    /// Provider user metadata, passed through untouched
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

impl Identity {
    /// Build an identity from a verified provider principal.
    pub fn from_principal(principal: Principal) -> Self {
        let role = Role::from_claim(principal.role_claim.as_deref());
        let display_name = principal
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| principal.email.clone());

        Self {
            id: principal.id,
            email: principal.email,
            role,
            display_name,
            metadata: principal.metadata,
        }
    }
}

/// Flattened session record passed to protected handlers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub user_email: String,
    pub user_role: Role,
    #[schema(value_type = Object)]
    pub user_metadata: Map<String, Value>,
}

impl Session {
    pub fn is_manager(&self) -> bool {
        self.user_role == Role::Manager
    }
}

impl From<Identity> for Session {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.id,
            user_email: identity.email,
            user_role: identity.role,
            user_metadata: identity.metadata,
        }
    }
}
