// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::jwks::JWKS_PATH;
use crate::auth::{
    AuthGuard, IdentityProvider, IdentityResolver, JwksManager, JwksProvider, ProviderError,
    StaticTokenProvider, SupabaseProvider,
};
use crate::config::{
    AppConfig, AuthSettings, ConfigError, ProviderKind, SUPABASE_ANON_KEY_ENV, SUPABASE_URL_ENV,
};
use crate::gatekeeper::Gatekeeper;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("identity provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("STATIC_AUTH_USERS is not a valid user list: {0}")]
    StaticUsers(#[from] serde_json::Error),
    #[error("request signatures failed to compile: {0}")]
    Signatures(#[from] regex::Error),
}

/// Process-wide state shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub provider: Arc<dyn IdentityProvider>,
    pub guard: AuthGuard,
    pub gatekeeper: Arc<Gatekeeper>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, provider: Arc<dyn IdentityProvider>) -> Result<Self, StartupError> {
        let resolver = IdentityResolver::new(provider.clone())
            .with_timeout(config.auth.provider_timeout);
        let guard = AuthGuard::new(resolver, config.auth.cookie_name.clone());
        let gatekeeper = Arc::new(Gatekeeper::from_config(&config)?);

        Ok(Self {
            config: Arc::new(config),
            provider,
            guard,
            gatekeeper,
            started_at: Instant::now(),
        })
    }

    /// Build state with the provider selected by `AUTH_PROVIDER`.
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let provider = build_provider(&config.auth)?;
        Self::new(config, provider)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl FromRef<AppState> for AuthGuard {
    fn from_ref(state: &AppState) -> Self {
        state.guard.clone()
    }
}

impl FromRef<AppState> for Arc<Gatekeeper> {
    fn from_ref(state: &AppState) -> Self {
        state.gatekeeper.clone()
    }
}

/// Construct the configured identity provider.
pub fn build_provider(auth: &AuthSettings) -> Result<Arc<dyn IdentityProvider>, StartupError> {
    let provider: Arc<dyn IdentityProvider> = match auth.provider {
        ProviderKind::Supabase => {
            let url = auth
                .supabase_url
                .clone()
                .ok_or(ConfigError::Missing(SUPABASE_URL_ENV))?;
            let key = auth
                .supabase_anon_key
                .clone()
                .ok_or(ConfigError::Missing(SUPABASE_ANON_KEY_ENV))?;
            Arc::new(
                SupabaseProvider::new(url, key, auth.provider_timeout)?
                    .with_service_role_key(auth.supabase_service_role_key.clone()),
            )
        }
        ProviderKind::Jwks => {
            let url = auth
                .supabase_url
                .as_deref()
                .ok_or(ConfigError::Missing(SUPABASE_URL_ENV))?;
            let issuer = auth.issuer().ok_or(ConfigError::Missing(SUPABASE_URL_ENV))?;
            let jwks = JwksManager::new(format!("{url}{JWKS_PATH}"), auth.provider_timeout)?;
            Arc::new(JwksProvider::new(jwks, issuer, auth.jwt_audience.clone()))
        }
        ProviderKind::Static => {
            let provider = StaticTokenProvider::from_json(&auth.static_users)?;
            if provider.is_empty() {
                warn!("Static identity provider has no users; every request will be rejected");
            }
            Arc::new(provider)
        }
    };

    info!(provider = provider.name(), "Identity provider configured");
    Ok(provider)
}
