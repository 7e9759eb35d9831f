// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Security headers attached to every response.

use std::time::Duration;

use axum::http::{
    header::{
        CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
        X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
    },
    HeaderMap, HeaderName, HeaderValue,
};

use crate::config::Mode;

pub const PRODUCTION_CSP: &str = "default-src 'self'; script-src 'self'; style-src 'self'; \
img-src 'self' data:; font-src 'self'; connect-src 'self' https://*.supabase.co; \
frame-ancestors 'none';";

pub const DEVELOPMENT_CSP: &str = "default-src 'self'; \
script-src 'self' 'unsafe-inline' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; \
img-src 'self' data:; font-src 'self'; connect-src 'self' https://*.supabase.co ws:; \
frame-ancestors 'none';";

pub const HSTS: &str = "max-age=63072000; includeSubDomains; preload";
pub const PERMISSIONS_POLICY: &str = "camera=(), microphone=(), geolocation=(), interest-cohort=()";

const PERMISSIONS_POLICY_HEADER: HeaderName = HeaderName::from_static("permissions-policy");
const SERVER_TIMING_HEADER: HeaderName = HeaderName::from_static("server-timing");

#[derive(Debug, Clone, Copy)]
pub struct SecurityHeaders {
    mode: Mode,
}

impl SecurityHeaders {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn csp(&self) -> &'static str {
        match self.mode {
            Mode::Production => PRODUCTION_CSP,
            Mode::Development => DEVELOPMENT_CSP,
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(self.csp()));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
        headers.insert(
            REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );

        if self.mode.is_production() {
            headers.insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
            headers.insert(
                PERMISSIONS_POLICY_HEADER,
                HeaderValue::from_static(PERMISSIONS_POLICY),
            );
        }
    }

    /// `Server-Timing: total;dur=<ms>`, development only.
    pub fn apply_timing(&self, headers: &mut HeaderMap, elapsed: Duration) {
        if self.mode.is_production() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&format!("total;dur={}", elapsed.as_millis())) {
            headers.insert(SERVER_TIMING_HEADER, value);
        }
    }
}
