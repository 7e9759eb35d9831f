// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles recognized by the roster API.
///
/// Roles are compared for equality only. There is no hierarchy: a
/// `Manager` does not implicitly satisfy a `Player` requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    /// Team manager (creates teams, manages rosters and games)
    Manager,
    /// Regular player
    #[default]
    Player,
}

impl Role {
    /// Exact-match role check.
    pub fn satisfies(self, required: Role) -> bool {
        self == required
    }

    /// Map a provider role claim onto a role.
    ///
    /// Absent or unrecognized claims fall back to [`Role::Player`], the
    /// least-privileged role.
    pub fn from_claim(claim: Option<&str>) -> Role {
        claim
            .and_then(|c| c.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Manager => "Manager",
            Role::Player => "Player",
        }
    }
}

/// Error returned when a string does not name a known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Parse role from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Role::Manager),
            "player" => Ok(Role::Player),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
