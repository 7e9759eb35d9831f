// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints: password login, logout and token validation, plus the
//! development-only account helpers (password reset, email confirmation).

use std::future::Future;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{AuthError, Credential, Identity, ProviderError, ProviderSession, Role};
use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Lifetime of the session cookie set by login.
pub const SESSION_COOKIE_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 7;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User fields exposed by login and validate.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub display_name: String,
}

impl From<Identity> for AuthUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            role: identity.role,
            display_name: identity.display_name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginData {
    pub session: ProviderSession,
    pub user: AuthUser,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    pub data: LoginData,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Body of the development account helpers.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AccountEmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn session_cookie(name: &str, value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn sign_in_error(err: ProviderError) -> ApiError {
    match err {
        ProviderError::Rejected(_) | ProviderError::NotFound(_) => {
            ApiError::unauthorized("Invalid credentials").with_code("invalid_credential")
        }
        ProviderError::Unsupported(op) => {
            ApiError::not_implemented(format!("Identity provider does not support {op}"))
                .with_code("not_supported")
        }
        ProviderError::Unavailable(_) | ProviderError::InvalidResponse(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication service unavailable",
        )
        .with_code("identity_provider_unavailable"),
    }
}

fn account_action_error(err: ProviderError, failure: &str, code: &'static str) -> ApiError {
    match err {
        ProviderError::NotFound(_) => {
            ApiError::new(StatusCode::NOT_FOUND, "User not found").with_code("user_not_found")
        }
        ProviderError::Rejected(_) => ApiError::bad_request(failure).with_code(code),
        other => sign_in_error(other),
    }
}

fn dev_only(state: &AppState) -> Result<(), ApiError> {
    if state.config.mode.is_production() {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "This endpoint is only available in development mode",
        )
        .with_code("dev_only"));
    }
    Ok(())
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|e| {
        ApiError::bad_request(format!("Invalid request body: {}", e.body_text()))
            .with_code("invalid_body")
    })
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let well_formed = email
        .trim()
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(ApiError::bad_request("A valid email is required").with_code("invalid_body"));
    }
    Ok(())
}

/// Run a provider call under the configured provider timeout.
async fn bounded<T>(
    state: &AppState,
    operation: &'static str,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(state.config.auth.provider_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Unavailable(format!("{operation} timed out"))),
    }
}

fn validate_login(request: &LoginRequest) -> Result<(), ApiError> {
    validate_email(&request.email)?;
    if request.password.is_empty() {
        return Err(ApiError::bad_request("Password is required").with_code("invalid_body"));
    }
    Ok(())
}

/// Sign in with email and password.
///
/// On success the access token is also set as the `HttpOnly` session cookie.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Malformed request body", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 501, description = "Provider cannot sign users in", body = ErrorBody),
        (status = 500, description = "Authentication service unavailable", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let request = parse_body(payload)?;
    validate_login(&request)?;

    let provider = &state.provider;
    let session = bounded(
        &state,
        "sign-in",
        provider.sign_in(request.email.trim(), &request.password),
    )
    .await
    .map_err(|e| {
        warn!(provider = provider.name(), error = %e, "Sign-in failed");
        sign_in_error(e)
    })?;

    let credential = Credential::new(session.access_token.clone());
    let identity = state
        .guard
        .resolver()
        .resolve(Some(&credential))
        .await
        .map_err(|e| match e {
            AuthError::ServiceUnavailable(detail) => {
                sign_in_error(ProviderError::Unavailable(detail))
            }
            other => sign_in_error(ProviderError::InvalidResponse(other.to_string())),
        })?;

    info!(user_id = %identity.id, role = %identity.role, "User signed in");

    let cookie = session_cookie(
        state.guard.cookie_name(),
        session.access_token.clone(),
        SESSION_COOKIE_MAX_AGE_SECS,
        state.config.mode.is_production(),
    );

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            success: true,
            data: LoginData {
                session,
                user: identity.into(),
            },
        }),
    ))
}

/// Clear the session cookie.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Authentication",
    responses(
        (status = 200, description = "Logout successful", body = LogoutResponse)
    )
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    let cookie = session_cookie(
        state.guard.cookie_name(),
        String::new(),
        0,
        state.config.mode.is_production(),
    );
    (jar.add(cookie), Json(LogoutResponse { success: true }))
}

/// Send a password recovery email (development only).
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Authentication",
    request_body = AccountEmailRequest,
    responses(
        (status = 200, description = "Recovery email sent", body = AccountActionResponse),
        (status = 400, description = "Malformed request body", body = ErrorBody),
        (status = 403, description = "Disabled in production", body = ErrorBody),
        (status = 501, description = "Provider cannot send recovery email", body = ErrorBody),
        (status = 500, description = "Authentication service unavailable", body = ErrorBody)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<AccountEmailRequest>, JsonRejection>,
) -> Result<Json<AccountActionResponse>, ApiError> {
    dev_only(&state)?;
    let request = parse_body(payload)?;
    validate_email(&request.email)?;

    let provider = &state.provider;
    bounded(
        &state,
        "password reset",
        provider.send_password_reset(request.email.trim()),
    )
    .await
    .map_err(|e| {
        warn!(provider = provider.name(), error = %e, "Password reset failed");
        account_action_error(e, "Failed to send password reset email", "reset_error")
    })?;

    info!(provider = provider.name(), "Password reset email requested");
    Ok(Json(AccountActionResponse {
        success: true,
        message: "Password reset email sent. Follow the link in it to choose a new password."
            .to_string(),
    }))
}

/// Mark an account's email address as confirmed (development only).
#[utoipa::path(
    post,
    path = "/api/auth/confirm-email",
    tag = "Authentication",
    request_body = AccountEmailRequest,
    responses(
        (status = 200, description = "Email confirmed", body = AccountActionResponse),
        (status = 400, description = "Malformed request body", body = ErrorBody),
        (status = 403, description = "Disabled in production", body = ErrorBody),
        (status = 404, description = "No user with this email", body = ErrorBody),
        (status = 501, description = "Provider cannot confirm email", body = ErrorBody),
        (status = 500, description = "Authentication service unavailable", body = ErrorBody)
    )
)]
pub async fn confirm_email(
    State(state): State<AppState>,
    payload: Result<Json<AccountEmailRequest>, JsonRejection>,
) -> Result<Json<AccountActionResponse>, ApiError> {
    dev_only(&state)?;
    let request = parse_body(payload)?;
    validate_email(&request.email)?;

    let provider = &state.provider;
    bounded(
        &state,
        "email confirmation",
        provider.confirm_email(request.email.trim()),
    )
    .await
    .map_err(|e| {
        warn!(provider = provider.name(), error = %e, "Email confirmation failed");
        account_action_error(e, "Failed to confirm email", "update_error")
    })?;

    info!(provider = provider.name(), "Email confirmed");
    Ok(Json(AccountActionResponse {
        success: true,
        message: "Email confirmed. The account can now log in.".to_string(),
    }))
}

/// Check the request's credential and return the user it belongs to.
#[utoipa::path(
    get,
    path = "/api/auth/validate",
    tag = "Authentication",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Credential is valid", body = ValidateResponse),
        (status = 401, description = "Missing or invalid credential", body = ValidateResponse),
        (status = 500, description = "Identity provider unavailable", body = ErrorBody)
    )
)]
pub async fn validate(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.guard.resolve(&headers).await {
        Ok(identity) => {
            info!(user_id = %identity.id, "Token validated");
            Json(ValidateResponse {
                valid: true,
                user: Some(identity.into()),
                error: None,
            })
            .into_response()
        }
        Err(e @ AuthError::ServiceUnavailable(_)) => e.into_response(),
        Err(e) => {
            let message = match e {
                AuthError::NoCredential => "No token provided",
                _ => "Invalid token",
            };
            warn!(reason = message, "Token validation failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(ValidateResponse {
                    valid: false,
                    user: None,
                    error: Some(message.to_string()),
                }),
            )
                .into_response()
        }
    }
}
