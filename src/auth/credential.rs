// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer credential extraction.
//!
//! A credential is looked up in a fixed order:
//!
//! 1. `Authorization: Bearer <token>` header, when present and well-formed
//! 2. the session cookie (named by `SESSION_COOKIE_NAME`, `auth_token` by default)
//!
//! Malformed headers (no `Bearer ` prefix, empty token, non-UTF-8) are
//! treated as absent and fall through to the cookie.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

/// Default name of the cookie that carries the session token.
pub const DEFAULT_SESSION_COOKIE: &str = "auth_token";

const BEARER_PREFIX: &str = "Bearer ";

/// Opaque bearer token taken from a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Where the credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    AuthorizationHeader,
    Cookie,
}

/// Extract the request credential, header first, then cookie.
pub fn extract_credential(
    headers: &HeaderMap,
    cookie_name: &str,
) -> Option<(Credential, CredentialSource)> {
    if let Some(token) = bearer_from_header(headers) {
        return Some((Credential::new(token), CredentialSource::AuthorizationHeader));
    }

    let jar = CookieJar::from_headers(headers);
    jar.get(cookie_name)
        .map(|cookie| cookie.value().trim())
        .filter(|value| !value.is_empty())
        .map(|value| (Credential::new(value), CredentialSource::Cookie))
}

fn bearer_from_header(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then_some(token)
}
