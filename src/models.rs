// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Models
//!
//! Records owned by the identity core ([`User`]) and the project facts the
//! permission gate reads through the storage collaborator ([`Project`],
//! [`ProjectRef`]).
//!
//! ## Identity continuity
//!
//! A [`User`] is keyed by its internal `id`, assigned once on first sight
//! and never changed. `external_user_id` is the GitHub numeric id and is
//! unique across users; login, avatar and email are refreshed from the
//! identity provider on every sighting.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Capability, Role};

// =============================================================================
// Users
// =============================================================================

/// Internal user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Internal identifier, stable across login/avatar changes
    pub id: Uuid,
    /// GitHub numeric user id (unique)
    pub external_user_id: i64,
    /// GitHub login
    pub login: String,
    /// GitHub avatar URL
    pub avatar_url: String,
    /// Email reported by the identity provider, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Account roles
    pub roles: BTreeSet<Role>,
    /// Capability grants
    pub permissions: BTreeSet<Capability>,
    /// Whether the user has gone through the onboarding wizard
    pub onboarding_accepted: bool,
    /// Whether the user accepted the latest terms and conditions
    pub terms_accepted: bool,
}

impl User {
    /// Check exact membership of a capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.permissions.contains(&capability)
    }
}

// =============================================================================
// Projects
// =============================================================================

/// Project visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectVisibility {
    /// Anyone, including anonymous callers, may read the project
    Public,
    /// Only users with an explicit access grant may read the project
    Private,
}

/// Project summary as exposed by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub short_description: String,
    pub visibility: ProjectVisibility,
}

/// A project addressed either by id or by slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectRef {
    Id(Uuid),
    Slug(String),
}

impl From<Uuid> for ProjectRef {
    fn from(id: Uuid) -> Self {
        ProjectRef::Id(id)
    }
}

impl From<&str> for ProjectRef {
    fn from(slug: &str) -> Self {
        ProjectRef::Slug(slug.to_string())
    }
}

impl std::fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectRef::Id(id) => write!(f, "{id}"),
            ProjectRef::Slug(slug) => write!(f, "{slug}"),
        }
    }
}

/// Repository linked to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LinkedRepo {
    pub project_id: Uuid,
    /// GitHub repository id
    pub repo_id: i64,
}
