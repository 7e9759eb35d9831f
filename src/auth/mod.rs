// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Supabase-backed authentication and role gating for the roster API.
//!
//! ## Auth Flow
//!
//! 1. The frontend signs the user in (directly with Supabase, or through
//!    `POST /api/auth/login`, which also sets the `auth_token` cookie)
//! 2. Requests carry `Authorization: Bearer <token>` or the session cookie;
//!    the header wins when both are present
//! 3. The server:
//!    - asks the configured identity provider to verify the token
//!      (GoTrue `/auth/v1/user`, local JWKS verification, or a static table)
//!    - maps the provider's role claim to `Manager` or `Player`
//!    - checks the role required by the route (exact match)
//!
//! ## Security
//!
//! - Identities are resolved per request and never cached
//! - A provider call is bounded by a timeout and never retried
//! - Provider failures answer 500 with a generic message; details stay in logs

pub mod claims;
pub mod credential;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod guard;
pub mod identity;
pub mod jwks;
pub mod provider;
pub mod resolver;
pub mod roles;
pub mod static_tokens;
pub mod supabase;

pub use credential::{extract_credential, Credential, CredentialSource};
pub use error::AuthError;
pub use extractor::{Auth, ManagerRole, OptionalAuth, PlayerRole, RequireRole};
pub use gate::{authorize, AuthDecision, Denial};
pub use guard::{AuthGuard, GuardOutcome};
pub use identity::{Identity, Session};
pub use jwks::{JwksManager, JwksProvider};
pub use provider::{IdentityProvider, Principal, ProviderError, ProviderSession};
pub use resolver::IdentityResolver;
pub use roles::Role;
pub use static_tokens::StaticTokenProvider;
pub use supabase::SupabaseProvider;
