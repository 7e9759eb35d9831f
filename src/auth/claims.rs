// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims issued by Supabase Auth.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::provider::{application_role, Principal};

/// Claims carried by a Supabase access token.
///
/// See: https://supabase.com/docs/guides/auth/jwt-fields
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer (`https://<project>.supabase.co/auth/v1`)
    #[serde(default)]
    pub iss: Option<String>,

    /// User email
    #[serde(default)]
    pub email: Option<String>,

    /// Postgres role (`authenticated`), not the application role
    #[serde(default)]
    pub role: Option<String>,

    /// Session ID
    #[serde(default)]
    pub session_id: Option<String>,

    /// Metadata only the service role can write
    #[serde(default)]
    pub app_metadata: Option<Map<String, Value>>,

    /// User-editable metadata
    #[serde(default)]
    pub user_metadata: Option<Map<String, Value>>,
}

impl SupabaseClaims {
    /// Convert verified claims into a provider principal.
    ///
    /// The application role comes from the metadata (see
    /// [`application_role`]); the top-level `role` claim is the database role
    /// and is ignored.
    pub fn into_principal(self) -> Principal {
        let metadata = self.user_metadata.unwrap_or_default();
        let role_claim = application_role(self.app_metadata.as_ref(), &metadata);
        let display_name = metadata
            .get("displayName")
            .and_then(Value::as_str)
            .map(str::to_string);

        Principal {
            id: self.sub,
            email: self.email.unwrap_or_default(),
            role_claim,
            display_name,
            metadata,
        }
    }
}
