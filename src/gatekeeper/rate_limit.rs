// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-window rate limiter keyed by client address.
//!
//! For each key: when `now` is past the window end, the count restarts and
//! the window is moved to `now + W`; the count is then incremented and the
//! request is rejected once it exceeds `N`.
//!
//! The whole read-modify-write happens under one mutex, so concurrent bursts
//! from the same client are never undercounted. The table is an LRU bounded
//! to `max_clients` keys and is additionally swept of expired windows by
//! [`super::sweeper::RateLimitSweeper`].
//!
//! Limits are per process; several instances behind a balancer each count
//! separately.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_MAX_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

/// Per-client counter.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Limited {
        limit: u32,
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Snapshot exposed on the admin endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    pub tracked_clients: usize,
    pub max_clients: usize,
    pub window_ms: u64,
    pub max_requests: u32,
}

pub struct RateLimiter {
    windows: Mutex<LruCache<String, RateWindow>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_clients).unwrap_or(NonZeroUsize::MIN);
        Self {
            windows: Mutex::new(LruCache::new(capacity)),
            config,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    // A panic while holding the lock leaves the table consistent (each update
    // is a plain field write), so a poisoned lock is still usable.
    fn table(&self) -> MutexGuard<'_, LruCache<String, RateWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let limit = self.config.max_requests;
        let mut table = self.table();

        let window = table.get_or_insert_mut(key.to_string(), || RateWindow {
            count: 0,
            window_reset_at: now + self.config.window,
        });

        if now > window.window_reset_at {
            window.count = 0;
            window.window_reset_at = now + self.config.window;
        }
        window.count = window.count.saturating_add(1);

        let reset_after = window.window_reset_at.saturating_duration_since(now);
        if window.count > limit {
            RateLimitDecision::Limited {
                limit,
                retry_after: reset_after,
            }
        } else {
            RateLimitDecision::Allowed {
                limit,
                remaining: limit.saturating_sub(window.count),
                reset_after,
            }
        }
    }

    /// Drop every window that ended before `now`. Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut table = self.table();
        let expired: Vec<String> = table
            .iter()
            .filter(|(_, window)| now > window.window_reset_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            table.pop(key);
        }
        expired.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.table().len()
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            tracked_clients: self.tracked_clients(),
            max_clients: self.config.max_clients,
            window_ms: self.config.window.as_millis() as u64,
            max_requests: self.config.max_requests,
        }
    }
}

/// Whole seconds until `after` elapses, rounded up and never below one.
pub fn ceil_secs(after: Duration) -> u64 {
    let secs = after.as_secs() + u64::from(after.subsec_nanos() > 0);
    secs.max(1)
}
