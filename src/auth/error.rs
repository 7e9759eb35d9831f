// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::gate::Denial;
use super::roles::Role;

/// Authentication error type.
///
/// Produced by the identity resolver and the role gate. The `Display`
/// output may carry provider detail and is meant for server logs only;
/// clients see [`AuthError::client_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential in the `Authorization` header or session cookie
    NoCredential,
    /// The identity provider rejected the credential or returned no principal
    InvalidCredential,
    /// Authenticated, but the role does not match the required role
    Forbidden(Role),
    /// The identity provider failed or timed out
    ServiceUnavailable(String),
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NoCredential => "no_credential",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::ServiceUnavailable(_) => "identity_provider_unavailable",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoCredential | AuthError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::ServiceUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable message safe to return to clients.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::NoCredential | AuthError::InvalidCredential => {
                "Unauthorized - Please login".to_string()
            }
            AuthError::Forbidden(role) => format!("Forbidden - {role} access required"),
            AuthError::ServiceUnavailable(_) => "Authentication service unavailable".to_string(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NoCredential => write!(f, "No credential presented"),
            AuthError::InvalidCredential => write!(f, "Credential rejected by identity provider"),
            AuthError::Forbidden(role) => write!(f, "Role {role} required"),
            AuthError::ServiceUnavailable(msg) => write!(f, "Identity provider unavailable: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        Denial::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn no_credential_returns_401() {
        let response = AuthError::NoCredential.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["code"], "no_credential");
        assert_eq!(body["error"], "Unauthorized - Please login");
    }

    #[tokio::test]
    async fn forbidden_returns_403() {
        let response = AuthError::Forbidden(Role::Manager).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn provider_detail_never_reaches_client() {
        let err = AuthError::ServiceUnavailable("connect refused 10.0.0.3:443".to_string());
        assert!(err.to_string().contains("10.0.0.3"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(!body.contains("10.0.0.3"));
        assert!(body.contains("Authentication service unavailable"));
    }
}
