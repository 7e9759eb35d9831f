// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Roster Gatekeeper - authentication and edge protection for the roster API
//!
//! Resolves bearer credentials against the identity provider, enforces the
//! Manager/Player roles on protected routes, and screens every request with
//! the edge gatekeeper before it reaches a handler.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers and the router (Axum)
//! - `auth` - credential extraction, identity resolution, role gate, guard
//! - `gatekeeper` - pattern filter, rate limiter, CORS, security headers
//! - `config` - environment configuration and validation

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod logging;
pub mod state;
