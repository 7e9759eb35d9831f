// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role gate: turns a resolution result and an optional required role into
//! an authorization decision.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::identity::Identity;
use super::roles::Role;
use super::AuthError;
use crate::error::ErrorBody;

/// Denial returned verbatim to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: String,
    pub status: StatusCode,
    pub code: &'static str,
}

impl From<AuthError> for Denial {
    fn from(err: AuthError) -> Self {
        Self {
            reason: err.client_message(),
            status: err.status_code(),
            code: err.error_code(),
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.reason,
            code: Some(self.code),
        });
        (self.status, body).into_response()
    }
}

/// Outcome of the role gate. Produced once per request and never cached.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    Authorized { identity: Identity },
    Denied(Denial),
}

impl AuthDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthDecision::Authorized { .. })
    }
}

/// Decide whether a resolved identity may proceed.
///
/// - resolution failure: denied with the failure's status (401, or 500
///   when the provider is unavailable)
/// - no required role: any identity is authorized
/// - required role: exact match, otherwise 403
pub fn authorize(resolved: Result<Identity, AuthError>, required: Option<Role>) -> AuthDecision {
    let identity = match resolved {
        Ok(identity) => identity,
        Err(err) => return AuthDecision::Denied(err.into()),
    };

    match required {
        Some(role) if !identity.role.satisfies(role) => {
            AuthDecision::Denied(AuthError::Forbidden(role).into())
        }
        _ => AuthDecision::Authorized { identity },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn identity(role: Role) -> Identity {
        Identity {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            role,
            display_name: "u1".to_string(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn any_identity_passes_without_required_role() {
        assert!(authorize(Ok(identity(Role::Player)), None).is_authorized());
        assert!(authorize(Ok(identity(Role::Manager)), None).is_authorized());
    }

    #[test]
    fn matching_role_is_authorized() {
        let decision = authorize(Ok(identity(Role::Manager)), Some(Role::Manager));
        assert_eq!(
            decision,
            AuthDecision::Authorized {
                identity: identity(Role::Manager)
            }
        );
    }

    #[test]
    fn wrong_role_is_forbidden() {
        match authorize(Ok(identity(Role::Player)), Some(Role::Manager)) {
            AuthDecision::Denied(denial) => {
                assert_eq!(denial.status, StatusCode::FORBIDDEN);
                assert_eq!(denial.code, "forbidden");
                assert!(denial.reason.starts_with("Forbidden"));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn manager_does_not_satisfy_player_requirement() {
        assert!(!authorize(Ok(identity(Role::Manager)), Some(Role::Player)).is_authorized());
    }

    #[test]
    fn missing_identity_is_unauthorized_not_forbidden() {
        for err in [AuthError::NoCredential, AuthError::InvalidCredential] {
            match authorize(Err(err), Some(Role::Manager)) {
                AuthDecision::Denied(denial) => assert_eq!(denial.status, StatusCode::UNAUTHORIZED),
                other => panic!("expected denial, got {other:?}"),
            }
        }
    }

    #[test]
    fn provider_outage_is_internal_error() {
        let err = AuthError::ServiceUnavailable("timeout".to_string());
        match authorize(Err(err), None) {
            AuthDecision::Denied(denial) => {
                assert_eq!(denial.status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(denial.code, "identity_provider_unavailable");
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }
}
