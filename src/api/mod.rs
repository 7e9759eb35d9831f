// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{any::Any, convert::Infallible};

use axum::{
    extract::Request as AxumRequest,
    http::{HeaderValue, Request, Response},
    middleware,
    response::IntoResponse,
    routing::{get, post, Route},
    Router,
};
use tower::{Layer, Service};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::error;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::{
    auth::{Role, Session},
    config::Mode,
    error::{ApiError, ErrorBody},
    gatekeeper::{gatekeeper_middleware, GatekeeperStats, RateLimiterStats},
    state::AppState,
};

pub mod admin;
pub mod auth;
pub mod health;
pub mod users;

/// Assigns a v4 UUID to requests arriving without `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<axum::body::Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Request handler panicked");
    ApiError::internal().into_response()
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/validate", get(auth::validate))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/confirm-email", post(auth::confirm_email))
        .route("/users/me", get(users::get_current_user))
        .route("/admin/gatekeeper", get(admin::gatekeeper_status))
        .route("/admin/gatekeeper/sweep", post(admin::sweep_rate_limits));

    let gatekeeper = state.gatekeeper.clone();

    let routes = Router::new()
        .nest("/api", api_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    edge_layers(
        routes,
        middleware::from_fn_with_state(gatekeeper, gatekeeper_middleware),
    )
}

/// Wrap `routes` in the shared layer stack around the `screen` middleware.
///
/// From the outside in: panic guard, request id, trace, request id
/// propagation, `screen`, panic guard. The inner guard turns handler panics
/// into a 500 that still passes through `screen`; the outer one covers panics
/// in the layers themselves.
fn edge_layers<L>(routes: Router, screen: L) -> Router
where
    L: Layer<Route> + Clone + Send + Sync + 'static,
    L::Service: Service<AxumRequest> + Clone + Send + Sync + 'static,
    <L::Service as Service<AxumRequest>>::Response: IntoResponse + 'static,
    <L::Service as Service<AxumRequest>>::Error: Into<Infallible> + 'static,
    <L::Service as Service<AxumRequest>>::Future: Send + 'static,
{
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(screen)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
        .layer(CatchPanicLayer::custom(panic_response))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Identity provider access token. The auth_token cookie is accepted as well.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::login,
        auth::logout,
        auth::validate,
        auth::reset_password,
        auth::confirm_email,
        users::get_current_user,
        admin::gatekeeper_status,
        admin::sweep_rate_limits
    ),
    components(
        schemas(
            ErrorBody,
            Mode,
            Role,
            Session,
            GatekeeperStats,
            RateLimiterStats,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::LoginData,
            auth::AuthUser,
            auth::LogoutResponse,
            auth::ValidateResponse,
            auth::AccountEmailRequest,
            auth::AccountActionResponse,
            admin::GatekeeperStatusResponse,
            admin::SweepResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Authentication", description = "Login, logout, token validation and development account helpers"),
        (name = "Users", description = "Current user"),
        (name = "Admin", description = "Manager-only operations")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{APP_ENV_ENV, FRONTEND_URL_ENV, RATE_LIMIT_MAX_REQUESTS_ENV};
    use crate::state::tests::test_state;
    use axum::{
        body::{to_bytes, Body},
        http::{
            header::{
                AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, COOKIE, SET_COOKIE,
                X_FRAME_OPTIONS,
            },
            Method, StatusCode,
        },
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn get_request(uri: &str) -> axum::http::request::Builder {
        axum::http::Request::builder().method(Method::GET).uri(uri)
    }

    fn login_request(email: &str, password: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"email":"{email}","password":"{password}"}}"#
            )))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn login_sets_session_cookie() {
        let app = router(test_state(&[]));
        let response = app
            .oneshot(login_request("coach@example.com", "pw-coach"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("auth_token=tok-manager"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));

        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["user"]["role"], "Manager");
        assert_eq!(body["data"]["user"]["displayName"], "Coach");
    }

    #[tokio::test]
    async fn login_cookie_is_secure_in_production() {
        let app = router(test_state(&[
            (APP_ENV_ENV, "production"),
            (FRONTEND_URL_ENV, "https://roster.example.com"),
        ]));
        let response = app
            .oneshot(login_request("coach@example.com", "pw-coach"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Secure"));
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_401() {
        let app = router(test_state(&[]));
        let response = app
            .oneshot(login_request("coach@example.com", "nope"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!response.headers().contains_key(SET_COOKIE));
        assert_eq!(json(response).await["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn login_with_malformed_body_is_400() {
        let app = router(test_state(&[]));
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "invalid_body");
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let app = router(test_state(&[]));
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/logout")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("auth_token="));
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(json(response).await["success"], true);
    }

    #[tokio::test]
    async fn validate_returns_user_for_cookie() {
        let app = router(test_state(&[]));
        let request = get_request("/api/auth/validate")
            .header(COOKIE, "auth_token=tok-player")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["user"]["id"], "p1");
        assert_eq!(body["user"]["role"], "Player");
        assert_eq!(body["user"]["displayName"], "pat@example.com");
    }

    #[tokio::test]
    async fn validate_without_token_is_401() {
        let app = router(test_state(&[]));
        let response = app
            .oneshot(get_request("/api/auth/validate").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json(response).await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["error"], "No token provided");
    }

    #[tokio::test]
    async fn header_credential_wins_over_cookie() {
        let app = router(test_state(&[]));
        let request = get_request("/api/users/me")
            .header(AUTHORIZATION, "Bearer tok-manager")
            .header(COOKIE, "auth_token=tok-player")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["userId"], "m1");
        assert_eq!(body["userRole"], "Manager");
    }

    #[tokio::test]
    async fn me_without_credential_is_401() {
        let app = router(test_state(&[]));
        let response = app
            .oneshot(get_request("/api/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["error"], "Unauthorized - Please login");
    }

    #[tokio::test]
    async fn admin_route_forbids_players() {
        let app = router(test_state(&[]));
        let request = get_request("/api/admin/gatekeeper")
            .header(AUTHORIZATION, "Bearer tok-player")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json(response).await["code"], "forbidden");
    }

    #[tokio::test]
    async fn admin_route_serves_managers() {
        let app = router(test_state(&[]));
        let request = get_request("/api/admin/gatekeeper")
            .header(AUTHORIZATION, "Bearer tok-manager")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["mode"], "development");
        assert_eq!(body["identityProvider"], "static");
    }

    #[tokio::test]
    async fn sweep_requires_manager() {
        let app = router(test_state(&[]));
        let sweep = |token: &str| {
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/api/admin/gatekeeper/sweep")
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(sweep("tok-player")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(sweep("tok-manager")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["removed"], 0);
        // The sweep request itself holds a live window.
        assert_eq!(body["trackedClients"], 1);
    }

    #[tokio::test]
    async fn security_headers_on_rejections() {
        let app = router(test_state(&[(RATE_LIMIT_MAX_REQUESTS_ENV, "1")]));

        let suspicious = app
            .clone()
            .oneshot(
                get_request("/api/users/me?q=../../etc/passwd")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(suspicious.status(), StatusCode::BAD_REQUEST);
        assert_eq!(suspicious.headers()[X_FRAME_OPTIONS], "DENY");
        assert!(suspicious.headers().contains_key(CONTENT_SECURITY_POLICY));

        let first = app
            .clone()
            .oneshot(get_request("/api/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

        let limited = app
            .oneshot(get_request("/api/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()[X_FRAME_OPTIONS], "DENY");
        assert!(limited.headers().contains_key(CONTENT_SECURITY_POLICY));
    }

    #[tokio::test]
    async fn request_id_is_generated_and_propagated() {
        let app = router(test_state(&[]));
        let response = app
            .clone()
            .oneshot(get_request("/api/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let generated = response.headers()["x-request-id"].to_str().unwrap();
        assert!(Uuid::parse_str(generated).is_ok());

        let response = app
            .oneshot(
                get_request("/api/health/live")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = router(test_state(&[]));
        let response = app
            .oneshot(get_request("/api-doc/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert!(body["paths"]["/api/auth/login"].is_object());
        assert!(body["paths"]["/api/auth/reset-password"].is_object());
        assert!(body["paths"]["/api/auth/confirm-email"].is_object());
        assert!(body["components"]["securitySchemes"]["bearer"].is_object());
    }

    fn account_request(uri: &str, email: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"email":"{email}"}}"#)))
            .unwrap()
    }

    #[tokio::test]
    async fn account_helpers_are_forbidden_in_production() {
        let app = router(test_state(&[
            (APP_ENV_ENV, "production"),
            (FRONTEND_URL_ENV, "https://roster.example.com"),
        ]));

        for uri in ["/api/auth/reset-password", "/api/auth/confirm-email"] {
            let response = app
                .clone()
                .oneshot(account_request(uri, "pat@example.com"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(response.headers()[X_FRAME_OPTIONS], "DENY");
            assert_eq!(json(response).await["code"], "dev_only");
        }
    }

    #[tokio::test]
    async fn account_helpers_report_unsupported_provider() {
        let app = router(test_state(&[]));

        for uri in ["/api/auth/reset-password", "/api/auth/confirm-email"] {
            let response = app
                .clone()
                .oneshot(account_request(uri, "pat@example.com"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED, "{uri}");
            assert_eq!(json(response).await["code"], "not_supported");
        }
    }

    #[tokio::test]
    async fn account_helpers_validate_email() {
        let app = router(test_state(&[]));
        let response = app
            .oneshot(account_request("/api/auth/reset-password", "not-an-email"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "invalid_body");
    }

    #[tokio::test]
    async fn panic_in_screen_layer_is_contained() {
        async fn failing_screen(
            _request: AxumRequest,
            _next: middleware::Next,
        ) -> axum::response::Response {
            panic!("screen failed")
        }

        let routes = Router::new().route("/api/teams", get(|| async { "teams" }));
        let app = edge_layers(routes, middleware::from_fn(failing_screen));

        let response = app
            .oneshot(get_request("/api/teams").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(response).await;
        assert_eq!(body["code"], "internal_error");
        assert!(!body.to_string().contains("screen failed"));
    }

    #[tokio::test]
    async fn handler_panic_still_gets_security_headers() {
        async fn failing_handler() -> &'static str {
            panic!("handler failed")
        }

        let state = test_state(&[]);
        let gatekeeper = state.gatekeeper.clone();
        let routes = Router::new().route("/api/teams", get(failing_handler));
        let app = edge_layers(
            routes,
            middleware::from_fn_with_state(gatekeeper, gatekeeper_middleware),
        );

        let response = app
            .oneshot(get_request("/api/teams").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[X_FRAME_OPTIONS], "DENY");
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn panic_response_is_generic_500() {
        let response = panic_response(Box::new("secret detail".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
