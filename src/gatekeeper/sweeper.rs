// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Rate Limit Sweeper
//!
//! Background task that periodically drops rate-limit windows that have
//! already ended, so the table only holds clients seen within the last window.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::rate_limit::RateLimiter;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct RateLimitSweeper {
    limiter: Arc<RateLimiter>,
    sweep_interval: Duration,
}

impl RateLimitSweeper {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Rate limit sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Rate limit sweeper shutting down");
                    return;
                }
            }

            self.sweep_step();
        }
    }

    fn sweep_step(&self) -> usize {
        let removed = self.limiter.sweep_expired(Instant::now());
        if removed > 0 {
            debug!(
                removed,
                remaining = self.limiter.tracked_clients(),
                "Swept expired rate limit windows"
            );
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::rate_limit::RateLimitConfig;

    #[tokio::test]
    async fn sweeper_evicts_expired_windows_and_stops_on_cancel() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(10),
            max_requests: 5,
            max_clients: 16,
        }));
        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.tracked_clients(), 2);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            RateLimitSweeper::new(limiter.clone())
                .with_interval(Duration::from_millis(20))
                .run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn sweep_step_reports_removed_count() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            window: Duration::ZERO,
            max_requests: 5,
            max_clients: 16,
        }));
        limiter.check("a");
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(RateLimitSweeper::new(limiter).sweep_step(), 1);
    }
}
