// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::State,
    http::{header::CACHE_CONTROL, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::Mode;
use crate::state::AppState;

const NO_STORE: &str = "no-store, max-age=0";

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// RFC 3339 timestamp of the check.
    pub timestamp: String,
    pub environment: Mode,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Identity provider reachability ("ok" or "unavailable").
    pub identity_provider: String,
    /// Which identity provider is configured.
    pub provider: String,
}

/// Liveness probe response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

async fn check_identity_provider(state: &AppState) -> bool {
    let provider = &state.provider;
    let timeout = state.config.auth.provider_timeout;

    match tokio::time::timeout(timeout, provider.health_check()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(provider = provider.name(), error = %e, "Identity provider health check failed");
            false
        }
        Err(_) => {
            warn!(provider = provider.name(), "Identity provider health check timed out");
            false
        }
    }
}

/// Health check endpoint handler.
///
/// Returns 200 when the identity provider answers, 503 otherwise.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Identity provider unreachable", body = ReadyResponse)
    )
)]
pub async fn health(
    State(state): State<AppState>,
) -> (StatusCode, [(axum::http::HeaderName, &'static str); 1], Json<ReadyResponse>) {
    let provider_ok = check_identity_provider(&state).await;

    let response = ReadyResponse {
        status: if provider_ok { "ok" } else { "degraded" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        environment: state.config.mode,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        checks: HealthChecks {
            service: "ok".to_string(),
            identity_provider: if provider_ok { "ok" } else { "unavailable" }.to_string(),
            provider: state.provider.name().to_string(),
        },
    };

    if state.config.mode.is_production() {
        info!(status = %response.status, "Health check completed");
    }

    let status = if provider_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, [(CACHE_CONTROL, NO_STORE)], Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 while the process is running.
#[utoipa::path(
    get,
    path = "/api/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
#[utoipa::path(
    get,
    path = "/api/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(
    state: State<AppState>,
) -> (StatusCode, [(axum::http::HeaderName, &'static str); 1], Json<ReadyResponse>) {
    health(state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        resolver::tests::ScriptedProvider, IdentityProvider, ProviderError,
    };
    use crate::config::config_from;
    use std::sync::Arc;

    fn state_with(provider: Arc<dyn IdentityProvider>) -> AppState {
        AppState::new(config_from(&[]).unwrap(), provider).unwrap()
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let Json(body) = liveness().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn healthy_provider_reports_ok() {
        let state = crate::state::tests::test_state(&[]);
        let (status, headers, Json(body)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[0].1, NO_STORE);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.identity_provider, "ok");
        assert_eq!(body.checks.provider, "static");
        assert_eq!(body.environment, Mode::Development);
    }

    #[tokio::test]
    async fn unreachable_provider_is_503() {
        let provider = Arc::new(ScriptedProvider::answering(Err(ProviderError::Unavailable(
            "connection refused".to_string(),
        ))));
        let (status, _, Json(body)) = readiness(State(state_with(provider))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.checks.identity_provider, "unavailable");
    }
}
