// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Collaborator
//!
//! Narrow contracts the identity core and the permission gate consume.
//! Persistence itself (schemas, transactions, ORM mapping) lives behind these
//! traits; this crate ships an in-memory adapter used by the binary and tests,
//! and a [`Seed`] loader for the back-office state it has no API for.
//!
//! ## Uniqueness
//!
//! Implementations must enforce uniqueness of `User::external_user_id` and
//! report a violation on [`UserStore::create_user`] as
//! [`StorageError::AlreadyExists`]. The identity resolver treats that error
//! as "someone else created it first" and retries as a lookup.
//!
//! ## Freshness
//!
//! [`ProjectStore`] lookups are answered from the current grant state on every
//! call. Callers must not cache their results.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{LinkedRepo, Project, ProjectRef, ProjectVisibility, User};

pub mod memory;
pub mod seed;

pub use memory::InMemoryStore;
pub use seed::{Seed, SeedError};

/// Error type for storage collaborator operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Entity already exists (uniqueness constraint)
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    /// Backend unreachable or failed
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// User persistence consumed by the identity resolver.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by GitHub numeric id.
    async fn find_user_by_external_id(&self, external_user_id: i64) -> StorageResult<Option<User>>;

    /// Persist a new user.
    ///
    /// # Errors
    /// `StorageError::AlreadyExists` if a user with the same external id exists.
    async fn create_user(&self, user: User) -> StorageResult<User>;

    /// Refresh the provider-owned profile fields of an existing user.
    async fn update_user_profile(
        &self,
        user_id: Uuid,
        login: &str,
        avatar_url: &str,
        email: Option<&str>,
    ) -> StorageResult<()>;
}

/// Project facts consumed by the permission gate and project operations.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Visibility of a project, or `None` if no such project exists.
    async fn project_visibility(&self, project: &ProjectRef)
        -> StorageResult<Option<ProjectVisibility>>;

    /// Whether the user holds an explicit access grant on the project.
    async fn user_has_access_to_project(
        &self,
        project: &ProjectRef,
        user_id: Uuid,
    ) -> StorageResult<bool>;

    /// Whether the user leads the project.
    async fn user_is_project_lead(&self, project_id: Uuid, user_id: Uuid) -> StorageResult<bool>;

    /// Whether the GitHub repository is linked to the project.
    async fn is_repo_linked_to_project(&self, project_id: Uuid, repo_id: i64)
        -> StorageResult<bool>;

    /// Load a project.
    async fn find_project(&self, project: &ProjectRef) -> StorageResult<Option<Project>>;

    /// Replace a project's short description.
    async fn update_project_description(
        &self,
        project_id: Uuid,
        short_description: &str,
    ) -> StorageResult<Project>;

    /// Load a repository link.
    async fn find_linked_repo(&self, project_id: Uuid, repo_id: i64)
        -> StorageResult<Option<LinkedRepo>>;
}
