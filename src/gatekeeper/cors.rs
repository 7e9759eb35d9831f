// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CORS negotiation for `/api/` routes.
//!
//! - production: a listed origin is echoed, anything else receives the
//!   first configured origin
//! - development: the request origin is echoed, `*` when absent
//!
//! `Access-Control-Allow-Origin` is never left empty.

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
            VARY,
        },
        HeaderMap, HeaderValue, Response, StatusCode,
    },
};

use crate::config::Mode;

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOWED_HEADERS: &str =
    "Content-Type, Authorization, X-Requested-With, X-Request-ID, Cookie";
pub const PREFLIGHT_MAX_AGE_SECS: u32 = 86_400;

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    mode: Mode,
    allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(mode: Mode, allowed_origins: Vec<String>) -> Self {
        Self {
            mode,
            allowed_origins,
        }
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// Origin to answer with for a request carrying `origin`.
    pub fn allowed_origin(&self, origin: Option<&str>) -> String {
        let origin = origin.map(str::trim).filter(|o| !o.is_empty());

        match self.mode {
            Mode::Production => match origin {
                Some(o) if self.allowed_origins.iter().any(|allowed| allowed == o) => {
                    o.to_string()
                }
                _ => self
                    .allowed_origins
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "null".to_string()),
            },
            Mode::Development => origin.unwrap_or("*").to_string(),
        }
    }

    fn origin_value(&self, origin: Option<&str>) -> HeaderValue {
        HeaderValue::from_str(&self.allowed_origin(origin))
            .unwrap_or_else(|_| HeaderValue::from_static("null"))
    }

    /// 204 answer to an `OPTIONS` preflight.
    pub fn preflight_response(&self, origin: Option<&str>) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(PREFLIGHT_MAX_AGE_SECS));
        self.apply(origin, headers);
        response
    }

    /// Annotate a non-preflight response.
    pub fn apply(&self, origin: Option<&str>, response_headers: &mut HeaderMap) {
        response_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.origin_value(origin));
        response_headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        response_headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        response_headers.insert(VARY, HeaderValue::from_static("Origin"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins() -> Vec<String> {
        vec![
            "https://roster.example.com".to_string(),
            "http://localhost:3000".to_string(),
        ]
    }

    #[test]
    fn production_echoes_listed_origin() {
        let cors = CorsPolicy::new(Mode::Production, origins());
        assert_eq!(
            cors.allowed_origin(Some("http://localhost:3000")),
            "http://localhost:3000"
        );
    }

    #[test]
    fn production_falls_back_to_first_origin() {
        let cors = CorsPolicy::new(Mode::Production, origins());
        assert_eq!(
            cors.allowed_origin(Some("https://evil.example.net")),
            "https://roster.example.com"
        );
        assert_eq!(cors.allowed_origin(None), "https://roster.example.com");
    }

    #[test]
    fn development_echoes_any_origin() {
        let cors = CorsPolicy::new(Mode::Development, origins());
        assert_eq!(
            cors.allowed_origin(Some("https://anything.test")),
            "https://anything.test"
        );
        assert_eq!(cors.allowed_origin(None), "*");
    }

    #[test]
    fn preflight_is_204_with_full_headers() {
        let cors = CorsPolicy::new(Mode::Production, origins());
        let response = cors.preflight_response(Some("http://localhost:3000"));

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(headers[VARY], "Origin");
        assert!(headers[ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .contains("Authorization"));
    }

    #[test]
    fn apply_never_leaves_origin_empty() {
        let cors = CorsPolicy::new(Mode::Production, Vec::new());
        let mut response_headers = HeaderMap::new();
        cors.apply(None, &mut response_headers);
        assert_eq!(response_headers[ACCESS_CONTROL_ALLOW_ORIGIN], "null");
    }
}
