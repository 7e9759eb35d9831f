// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::Json;

use crate::auth::{Auth, Session};

/// Session record of the authenticated caller, any role.
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current session", body = Session),
        (status = 401, description = "Unauthorized - missing or invalid credential"),
        (status = 500, description = "Identity provider unavailable"),
    )
)]
pub async fn get_current_user(Auth(session): Auth) -> Json<Session> {
    Json(session)
}
