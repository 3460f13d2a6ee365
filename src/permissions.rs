// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Permission Gate
//!
//! Stateless predicates over project facts, evaluated against the storage
//! collaborator on every call. Nothing is cached: a revoked grant takes
//! effect on the next request.
//!
//! Every protected operation calls the relevant `ensure_*` helper before it
//! reads or mutates anything. A storage failure never reads as "allowed":
//! it surfaces as an error and the operation does not proceed.
//!
//! ## Unknown projects
//!
//! A project that does not exist is treated exactly like a private project
//! the caller cannot see: access is denied with `Forbidden`, and nobody
//! leads it. Callers cannot probe for the existence of private projects.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::{ProjectRef, ProjectVisibility};
use crate::storage::{ProjectStore, StorageResult};

#[derive(Clone)]
pub struct PermissionService {
    projects: Arc<dyn ProjectStore>,
}

impl PermissionService {
    pub fn new(projects: Arc<dyn ProjectStore>) -> Self {
        Self { projects }
    }

    /// Whether `user_id` leads `project_id`.
    pub async fn is_user_project_lead(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<bool> {
        self.projects.user_is_project_lead(project_id, user_id).await
    }

    /// Whether the project is public, or the user holds an access grant on it.
    pub async fn has_user_access_to_project(
        &self,
        project: &ProjectRef,
        user_id: Option<Uuid>,
    ) -> StorageResult<bool> {
        match self.projects.project_visibility(project).await? {
            Some(ProjectVisibility::Public) => Ok(true),
            Some(ProjectVisibility::Private) => match user_id {
                Some(user_id) => self.projects.user_has_access_to_project(project, user_id).await,
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    /// Whether the GitHub repository is linked to the project.
    pub async fn is_repo_linked_to_project(
        &self,
        project_id: Uuid,
        repo_id: i64,
    ) -> StorageResult<bool> {
        self.projects.is_repo_linked_to_project(project_id, repo_id).await
    }

    pub async fn ensure_project_lead(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        denial: &str,
    ) -> Result<(), AuthError> {
        if self.is_user_project_lead(project_id, user_id).await? {
            return Ok(());
        }
        tracing::debug!(%project_id, %user_id, "Project lead check denied");
        Err(AuthError::forbidden(denial))
    }

    pub async fn ensure_project_access(
        &self,
        project: &ProjectRef,
        user_id: Option<Uuid>,
    ) -> Result<(), AuthError> {
        if self.has_user_access_to_project(project, user_id).await? {
            return Ok(());
        }
        let user = user_id.map_or_else(|| "anonymous".to_string(), |id| id.to_string());
        tracing::debug!(%project, %user, "Project access denied");
        Err(AuthError::forbidden(format!(
            "Project {project} is private and user {user} cannot access it"
        )))
    }

    pub async fn ensure_repo_linked(
        &self,
        project_id: Uuid,
        repo_id: i64,
        denial: &str,
    ) -> Result<(), AuthError> {
        if self.is_repo_linked_to_project(project_id, repo_id).await? {
            return Ok(());
        }
        tracing::debug!(%project_id, repo_id, "Repository link check denied");
        Err(AuthError::forbidden(denial))
    }
}
