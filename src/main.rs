// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, net::SocketAddr, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use roster_gatekeeper::{
    api::router,
    config::AppConfig,
    gatekeeper::RateLimitSweeper,
    logging::{init_tracing, LogFormat},
    state::AppState,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    init_tracing(LogFormat::from_env());

    let config = AppConfig::from_env()?;
    // Logs its own warnings outside production.
    config.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let tls = config.tls.clone();
    let mode = config.mode;

    let state = AppState::from_config(config)?;

    let shutdown = CancellationToken::new();
    let sweeper = RateLimitSweeper::new(state.gatekeeper.limiter().clone());
    tokio::spawn(sweeper.run(shutdown.clone()));

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone(), shutdown.clone()));

    match tls {
        Some(paths) => {
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| "failed to install rustls crypto provider")?;
            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;

            info!(%addr, %mode, "Roster gatekeeper listening on https (docs at /api/docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await?;
        }
        None => {
            info!(%addr, %mode, "Roster gatekeeper listening on http (docs at /api/docs)");
            axum_server::bind(addr).handle(handle).serve(app).await?;
        }
    }

    shutdown.cancel();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_on_signal(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
