// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request guard.
//!
//! Composes credential extraction, identity resolution and the role gate
//! around a protected operation:
//!
//! ```text
//! Start -> CredentialExtracted | NoCredential
//!       -> IdentityResolved | ResolutionFailed
//!       -> Authorized | Denied
//!       -> HandlerInvoked -> Completed | HandlerFailed
//! ```
//!
//! This is the single place where handler failures (errors and panics) are
//! turned into transport-level responses.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use tracing::{debug, error};

use super::credential::extract_credential;
use super::gate::{authorize, AuthDecision, Denial};
use super::identity::{Identity, Session};
use super::resolver::IdentityResolver;
use super::roles::Role;
use super::AuthError;
use crate::error::ApiError;

/// Terminal state of a guarded request.
#[derive(Debug)]
pub enum GuardOutcome<T> {
    /// The handler ran and produced a value
    Completed(T),
    /// The request never reached the handler
    Denied(Denial),
    /// The handler returned an error or panicked; details are in the logs
    HandlerFailed,
}

impl<T: IntoResponse> IntoResponse for GuardOutcome<T> {
    fn into_response(self) -> Response {
        match self {
            GuardOutcome::Completed(value) => value.into_response(),
            GuardOutcome::Denied(denial) => denial.into_response(),
            GuardOutcome::HandlerFailed => ApiError::internal().into_response(),
        }
    }
}

#[derive(Clone)]
pub struct AuthGuard {
    resolver: IdentityResolver,
    cookie_name: Arc<str>,
}

impl AuthGuard {
    pub fn new(resolver: IdentityResolver, cookie_name: impl Into<String>) -> Self {
        Self {
            resolver,
            cookie_name: Arc::from(cookie_name.into()),
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Extract the credential from `headers` and resolve it.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let credential = match extract_credential(headers, &self.cookie_name) {
            Some((credential, source)) => {
                debug!(?source, "Credential extracted");
                Some(credential)
            }
            None => {
                debug!("No credential on request");
                None
            }
        };

        let resolved = self.resolver.resolve(credential.as_ref()).await;
        match &resolved {
            Ok(identity) => debug!(user_id = %identity.id, role = %identity.role, "Identity resolved"),
            Err(e) => debug!(error = %e, "Identity resolution failed"),
        }
        resolved
    }

    /// Run extraction, resolution and the role gate.
    pub async fn check(&self, headers: &HeaderMap, required: Option<Role>) -> AuthDecision {
        let decision = authorize(self.resolve(headers).await, required);
        if let AuthDecision::Denied(denial) = &decision {
            debug!(status = %denial.status, code = denial.code, "Request denied");
        }
        decision
    }

    /// Guard `handler`: it runs only for authorized requests, receiving the
    /// flattened session record.
    pub async fn guard<F, Fut, T, E>(
        &self,
        headers: &HeaderMap,
        required: Option<Role>,
        handler: F,
    ) -> GuardOutcome<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let identity = match self.check(headers, required).await {
            AuthDecision::Authorized { identity } => identity,
            AuthDecision::Denied(denial) => return GuardOutcome::Denied(denial),
        };

        let user_id = identity.id.clone();
        let invoked = AssertUnwindSafe(async move { handler(Session::from(identity)).await })
            .catch_unwind()
            .await;

        match invoked {
            Ok(Ok(value)) => GuardOutcome::Completed(value),
            Ok(Err(e)) => {
                error!(user_id = %user_id, error = %e, "Protected handler failed");
                GuardOutcome::HandlerFailed
            }
            Err(panic) => {
                error!(
                    user_id = %user_id,
                    panic = panic_message(panic.as_ref()),
                    "Protected handler panicked"
                );
                GuardOutcome::HandlerFailed
            }
        }
    }

    /// [`AuthGuard::guard`] rendered straight into a response.
    pub async fn with_auth<F, Fut, T, E>(
        &self,
        headers: &HeaderMap,
        required: Option<Role>,
        handler: F,
    ) -> Response
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: IntoResponse,
        E: Display,
    {
        self.guard(headers, required, handler).await.into_response()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
