// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles and capabilities for authorization.
//!
//! Roles are coarse account categories. Capabilities are individual grants
//! carried on the user record and checked by exact set membership; the
//! only capability the authentication core reads is [`Capability::Impersonation`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles.
///
/// ## Role Hierarchy
///
/// - `Admin` - Back-office operator, granted out of band (seed file)
/// - `User` - Regular marketplace contributor (granted on sign-up)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular authenticated user
    User,
    /// Back-office administrator
    Admin,
}

impl Default for Role {
    /// Role assigned to every newly signed-up user.
    fn default() -> Self {
        Role::User
    }
}

/// A named permission grant carried on `User::permissions`.
///
/// Serialized as its snake_case code (`"impersonation"`), which is also the
/// form used in seed files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May act as another existing user for the duration of a request.
    Impersonation,
}
