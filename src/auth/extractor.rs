// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors backed by the [`AuthGuard`].
//!
//! ```rust,ignore
//! async fn me(Auth(session): Auth) -> Json<Session> {
//!     Json(session)
//! }
//!
//! async fn stats(RequireRole(session, _): RequireRole<ManagerRole>) -> impl IntoResponse {
//!     // only Managers reach here
//! }
//! ```
//!
//! Rejections are [`Denial`]s, so a missing credential answers 401, a wrong
//! role 403, and a provider outage 500.

use std::marker::PhantomData;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::gate::{authorize, AuthDecision, Denial};
use super::guard::AuthGuard;
use super::identity::{Identity, Session};
use super::roles::Role;

/// Role a [`RequireRole`] extractor demands.
pub trait RoleRequirement: Send + Sync + 'static {
    const ROLE: Role;
}

pub struct ManagerRole;

impl RoleRequirement for ManagerRole {
    const ROLE: Role = Role::Manager;
}

pub struct PlayerRole;

impl RoleRequirement for PlayerRole {
    const ROLE: Role = Role::Player;
}

/// Resolve the identity for this request once.
///
/// The resolved identity is stored in the request extensions so that several
/// extractors on one handler share a single provider call. Nothing outlives
/// the request.
async fn resolve_identity<S>(parts: &mut Parts, state: &S) -> Result<Identity, Denial>
where
    AuthGuard: FromRef<S>,
    S: Send + Sync,
{
    if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
        return Ok(identity);
    }

    let guard = AuthGuard::from_ref(state);
    match authorize(guard.resolve(&parts.headers).await, None) {
        AuthDecision::Authorized { identity } => {
            parts.extensions.insert(identity.clone());
            Ok(identity)
        }
        AuthDecision::Denied(denial) => Err(denial),
    }
}

/// Any authenticated user.
pub struct Auth(pub Session);

impl<S> FromRequestParts<S> for Auth
where
    AuthGuard: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Denial;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = resolve_identity(parts, state).await?;
        Ok(Auth(Session::from(identity)))
    }
}

/// Authenticated user holding exactly the role `R`.
pub struct RequireRole<R: RoleRequirement>(pub Session, pub PhantomData<R>);

impl<S, R> FromRequestParts<S> for RequireRole<R>
where
    AuthGuard: FromRef<S>,
    S: Send + Sync,
    R: RoleRequirement,
{
    type Rejection = Denial;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = resolve_identity(parts, state).await?;
        match authorize(Ok(identity), Some(R::ROLE)) {
            AuthDecision::Authorized { identity } => {
                Ok(RequireRole(Session::from(identity), PhantomData))
            }
            AuthDecision::Denied(denial) => Err(denial),
        }
    }
}

/// Session when one resolves, `None` otherwise.
///
/// Provider outages also yield `None`; use [`Auth`] where that must surface.
pub struct OptionalAuth(pub Option<Session>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AuthGuard: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(
            resolve_identity(parts, state).await.ok().map(Session::from),
        ))
    }
}
