// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Protected project operations.
//!
//! Each operation takes the request's [`AuthContext`] explicitly and runs its
//! permission check before touching project data.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::auth::{AuthContext, AuthError};
use crate::models::{LinkedRepo, Project, ProjectRef};
use crate::permissions::PermissionService;
use crate::storage::{ProjectStore, StorageError};

pub const LEAD_ONLY_UPDATE: &str = "Only project leads can update their projects";
pub const LEAD_ONLY_REPOS: &str =
    "Only project leads can view repositories linked to their projects";
pub const REPO_NOT_LINKED: &str = "Repository is not linked to this project";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Clone)]
pub struct ProjectService {
    permissions: PermissionService,
    projects: Arc<dyn ProjectStore>,
}

impl ProjectService {
    pub fn new(projects: Arc<dyn ProjectStore>) -> Self {
        Self {
            permissions: PermissionService::new(projects.clone()),
            projects,
        }
    }

    /// Read a project by id. Anonymous callers see public projects only.
    pub async fn get_by_id(
        &self,
        ctx: &AuthContext,
        project_id: Uuid,
    ) -> Result<Project, ProjectError> {
        self.get(ctx, ProjectRef::Id(project_id)).await
    }

    /// Read a project by slug. Anonymous callers see public projects only.
    pub async fn get_by_slug(
        &self,
        ctx: &AuthContext,
        slug: &str,
    ) -> Result<Project, ProjectError> {
        self.get(ctx, ProjectRef::Slug(slug.to_string())).await
    }

    async fn get(&self, ctx: &AuthContext, project: ProjectRef) -> Result<Project, ProjectError> {
        self.permissions
            .ensure_project_access(&project, ctx.caller_id())
            .await?;

        self.projects
            .find_project(&project)
            .await?
            .ok_or_else(|| ProjectError::NotFound(format!("Project {project}")))
    }

    /// Replace the short description. Project leads only.
    pub async fn update_description(
        &self,
        ctx: &AuthContext,
        project_id: Uuid,
        short_description: &str,
    ) -> Result<Project, ProjectError> {
        let caller = ctx.authenticated_user()?;
        self.permissions
            .ensure_project_lead(project_id, caller.id, LEAD_ONLY_UPDATE)
            .await?;

        let project = self
            .projects
            .update_project_description(project_id, short_description)
            .await?;
        tracing::info!(%project_id, user_id = %caller.id, "Project description updated");
        Ok(project)
    }

    /// Read a repository link. The caller must lead the project and the
    /// repository must be linked to it.
    pub async fn get_linked_repo(
        &self,
        ctx: &AuthContext,
        project_id: Uuid,
        repo_id: i64,
    ) -> Result<LinkedRepo, ProjectError> {
        let caller = ctx.authenticated_user()?;
        self.permissions
            .ensure_project_lead(project_id, caller.id, LEAD_ONLY_REPOS)
            .await?;
        self.permissions
            .ensure_repo_linked(project_id, repo_id, REPO_NOT_LINKED)
            .await?;

        self.projects
            .find_linked_repo(project_id, repo_id)
            .await?
            .ok_or_else(|| ProjectError::NotFound(format!("Repository {repo_id}")))
    }
}
