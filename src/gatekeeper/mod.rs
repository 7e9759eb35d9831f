// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Edge Gatekeeper
//!
//! Pre-routing pipeline applied to every request, in a fixed order:
//!
//! 1. suspicious-pattern filter (400, may end the request)
//! 2. rate limiter for `/api/` paths outside the bypass list (429, may end
//!    the request)
//! 3. CORS for `/api/` paths (an `OPTIONS` preflight ends with 204)
//! 4. security headers on every response, early rejections included
//!
//! All state (the rate table, compiled signatures, origin list) lives in one
//! [`Gatekeeper`] value injected with `from_fn_with_state`.

pub mod cors;
pub mod headers;
pub mod patterns;
pub mod rate_limit;
pub mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{
        header::{CONTENT_LENGTH, ORIGIN, RETRY_AFTER, USER_AGENT},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::{AppConfig, Mode};
use crate::error::ApiError;

pub use cors::CorsPolicy;
pub use headers::SecurityHeaders;
pub use patterns::SuspiciousPatternFilter;
pub use rate_limit::{ceil_secs, RateLimitDecision, RateLimiter, RateLimiterStats};
pub use sweeper::RateLimitSweeper;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_REQUEST_ID: &str = "x-request-id";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Paths under this prefix are rate limited and receive CORS headers.
pub const API_PREFIX: &str = "/api/";

pub struct Gatekeeper {
    mode: Mode,
    filter: SuspiciousPatternFilter,
    limiter: Arc<RateLimiter>,
    cors: CorsPolicy,
    headers: SecurityHeaders,
    bypass_paths: Vec<String>,
    max_inspected_body_bytes: usize,
    trusted_proxy_hops: usize,
}

/// Gatekeeper snapshot for the admin endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatekeeperStats {
    pub mode: Mode,
    pub rate_limiter: RateLimiterStats,
    pub bypass_paths: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub max_inspected_body_bytes: usize,
    pub trusted_proxy_hops: usize,
}

impl Gatekeeper {
    pub fn from_config(config: &AppConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            mode: config.mode,
            filter: SuspiciousPatternFilter::new()?,
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            cors: CorsPolicy::new(config.mode, config.allowed_origins.clone()),
            headers: SecurityHeaders::new(config.mode),
            bypass_paths: config.rate_limit_bypass.clone(),
            max_inspected_body_bytes: config.max_inspected_body_bytes,
            trusted_proxy_hops: config.trusted_proxy_hops,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn stats(&self) -> GatekeeperStats {
        GatekeeperStats {
            mode: self.mode,
            rate_limiter: self.limiter.stats(),
            bypass_paths: self.bypass_paths.clone(),
            allowed_origins: self.cors.allowed_origins().to_vec(),
            max_inspected_body_bytes: self.max_inspected_body_bytes,
            trusted_proxy_hops: self.trusted_proxy_hops,
        }
    }

    /// Whether `path` counts against the rate limit.
    pub fn is_rate_limited(&self, path: &str) -> bool {
        is_api_path(path)
            && !self.bypass_paths.iter().any(|bypass| {
                path == bypass
                    || path
                        .strip_prefix(bypass.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}

fn is_api_path(path: &str) -> bool {
    path.starts_with(API_PREFIX)
}

/// Key the rate limiter counts under.
///
/// With no trusted proxies the socket peer is the client and
/// `X-Forwarded-For` is ignored, since any caller can write it. Behind
/// `trusted_hops` proxies, each proxy appends the address it received from,
/// so the client is the entry `trusted_hops` positions from the right. A
/// header shorter than that falls back to the peer.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_hops: usize) -> String {
    let forwarded = trusted_hops
        .checked_sub(1)
        .and_then(|skip| {
            headers
                .get(X_FORWARDED_FOR)?
                .to_str()
                .ok()?
                .rsplit(',')
                .nth(skip)
        })
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string);

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn rejection(status: StatusCode, message: &str, code: &'static str) -> Response {
    ApiError::new(status, message).with_code(code).into_response()
}

fn insert_number(headers: &mut HeaderMap, name: HeaderName, value: u64) {
    headers.insert(name, HeaderValue::from(value));
}

/// Unix time in whole seconds (rounded up) at which a window ending
/// `reset_after` from now resets.
fn reset_epoch_secs(reset_after: std::time::Duration) -> u64 {
    let reset_ms = chrono::Utc::now().timestamp_millis().max(0) as u64
        + reset_after.as_millis() as u64;
    reset_ms.div_ceil(1000)
}

/// Axum middleware running the gatekeeper pipeline.
pub async fn gatekeeper_middleware(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let mut response = screen(&gatekeeper, request, next).await;

    gatekeeper.headers.apply(response.headers_mut());
    gatekeeper
        .headers
        .apply_timing(response.headers_mut(), started.elapsed());
    response
}

async fn screen(gatekeeper: &Gatekeeper, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let path = parts.uri.path().to_string();
    let request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(&parts.headers, peer, gatekeeper.trusted_proxy_hops);

    if gatekeeper.mode.is_production() && !path.starts_with("/api/health") {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        info!(
            method = %parts.method,
            path = %path,
            request_id = %request_id,
            client = %client,
            user_agent,
            "Incoming request"
        );
    }

    // 1. Suspicious-pattern filter over url | body | headers
    let declared_len = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > gatekeeper.max_inspected_body_bytes) {
        return rejection(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large", "payload_too_large");
    }
    let body = match axum::body::to_bytes(body, gatekeeper.max_inspected_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Request body rejected");
            return rejection(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large", "payload_too_large");
        }
    };

    if let Some(signature) = gatekeeper.filter.inspect(&parts.uri, &parts.headers, &body) {
        warn!(
            request_id = %request_id,
            path = %path,
            client = %client,
            signature,
            "Suspicious request pattern detected"
        );
        return rejection(StatusCode::BAD_REQUEST, "Bad request", "suspicious_request");
    }

    // 2. Rate limiter
    let mut rate_headers = None;
    if gatekeeper.is_rate_limited(&path) {
        match gatekeeper.limiter.check(&client) {
            RateLimitDecision::Limited { limit, retry_after } => {
                warn!(
                    request_id = %request_id,
                    path = %path,
                    client = %client,
                    "Rate limit exceeded"
                );
                let mut response = rejection(
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many requests",
                    "rate_limit_exceeded",
                );
                let headers = response.headers_mut();
                insert_number(headers, RETRY_AFTER, ceil_secs(retry_after));
                insert_number(headers, X_RATELIMIT_LIMIT, u64::from(limit));
                insert_number(headers, X_RATELIMIT_REMAINING, 0);
                insert_number(headers, X_RATELIMIT_RESET, reset_epoch_secs(retry_after));
                return response;
            }
            RateLimitDecision::Allowed {
                limit,
                remaining,
                reset_after,
            } => rate_headers = Some((limit, remaining, reset_after)),
        }
    }

    // 3. CORS
    let is_api = is_api_path(&path);
    let origin = parts
        .headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = if is_api && parts.method == Method::OPTIONS {
        gatekeeper.cors.preflight_response(origin.as_deref())
    } else {
        let mut response = next.run(Request::from_parts(parts, Body::from(body))).await;
        if is_api {
            gatekeeper.cors.apply(origin.as_deref(), response.headers_mut());
        }
        response
    };

    if let Some((limit, remaining, reset_after)) = rate_headers {
        let headers = response.headers_mut();
        insert_number(headers, X_RATELIMIT_LIMIT, u64::from(limit));
        insert_number(headers, X_RATELIMIT_REMAINING, u64::from(remaining));
        insert_number(headers, X_RATELIMIT_RESET, reset_epoch_secs(reset_after));
    }

    response
}
