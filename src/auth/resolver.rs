// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential to identity resolution.
//!
//! One provider call per resolution, no retries: a failed check fails
//! closed so a revoked session can never be masked by a later success.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::credential::Credential;
use super::identity::Identity;
use super::provider::{IdentityProvider, ProviderError};
use super::AuthError;

/// Default bound on a single identity provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Resolve a credential into an identity.
    ///
    /// - `None` fails with `NoCredential` without contacting the provider
    /// - provider rejection or an empty principal fails with `InvalidCredential`
    /// - provider outage or timeout fails with `ServiceUnavailable`
    pub async fn resolve(&self, credential: Option<&Credential>) -> Result<Identity, AuthError> {
        let credential = credential.ok_or(AuthError::NoCredential)?;

        let verified = tokio::time::timeout(self.timeout, self.provider.verify(credential)).await;

        let principal = match verified {
            Err(_elapsed) => {
                warn!(
                    provider = self.provider.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Identity provider call timed out"
                );
                return Err(AuthError::ServiceUnavailable(format!(
                    "{} did not answer within {:?}",
                    self.provider.name(),
                    self.timeout
                )));
            }
            Ok(Err(e)) => return Err(map_provider_error(self.provider.name(), e)),
            Ok(Ok(principal)) => principal,
        };

        if principal.id.trim().is_empty() {
            debug!(provider = self.provider.name(), "Provider returned an empty principal");
            return Err(AuthError::InvalidCredential);
        }

        Ok(Identity::from_principal(principal))
    }
}

fn map_provider_error(provider: &str, error: ProviderError) -> AuthError {
    match error {
        ProviderError::Rejected(reason) | ProviderError::NotFound(reason) => {
            debug!(provider, reason = %reason, "Credential rejected");
            AuthError::InvalidCredential
        }
        ProviderError::InvalidResponse(reason) => {
            warn!(provider, reason = %reason, "Unreadable identity provider response");
            AuthError::InvalidCredential
        }
        e @ (ProviderError::Unavailable(_) | ProviderError::Unsupported(_)) => {
            warn!(provider, error = %e, "Identity provider unavailable");
            AuthError::ServiceUnavailable(e.to_string())
        }
    }
}
