// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Manager-only operational endpoints.

use std::convert::Infallible;
use std::time::Instant;

use axum::{extract::State, http::HeaderMap, response::Response, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::{ManagerRole, RequireRole, Role},
    gatekeeper::GatekeeperStats,
    state::AppState,
};

/// Gatekeeper snapshot for operators.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatekeeperStatusResponse {
    #[serde(flatten)]
    pub gatekeeper: GatekeeperStats,
    /// Configured identity provider.
    pub identity_provider: String,
    pub uptime_seconds: u64,
    /// Current timestamp.
    pub timestamp: String,
}

/// Rate limiter and gatekeeper configuration.
///
/// Requires the Manager role.
#[utoipa::path(
    get,
    path = "/api/admin/gatekeeper",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Gatekeeper status", body = GatekeeperStatusResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Manager role required"),
    )
)]
pub async fn gatekeeper_status(
    State(state): State<AppState>,
    RequireRole(session, _): RequireRole<ManagerRole>,
) -> Json<GatekeeperStatusResponse> {
    info!(user_id = %session.user_id, "Gatekeeper status requested");

    Json(GatekeeperStatusResponse {
        gatekeeper: state.gatekeeper.stats(),
        identity_provider: state.provider.name().to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    /// Expired client windows dropped by this sweep.
    pub removed: usize,
    pub tracked_clients: usize,
}

/// Drop expired rate-limit windows now instead of waiting for the sweeper.
///
/// Requires the Manager role.
#[utoipa::path(
    post,
    path = "/api/admin/gatekeeper/sweep",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Sweep finished", body = SweepResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Manager role required"),
    )
)]
pub async fn sweep_rate_limits(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let limiter = state.gatekeeper.limiter().clone();
    state
        .guard
        .with_auth(&headers, Some(Role::Manager), |session| async move {
            let removed = limiter.sweep_expired(Instant::now());
            info!(user_id = %session.user_id, removed, "Rate limit sweep requested");
            Ok::<_, Infallible>(Json(SweepResponse {
                removed,
                tracked_clients: limiter.tracked_clients(),
            }))
        })
        .await
}
