// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory storage adapter.
//!
//! Backs the binary when no database is wired in, and every test. Users and
//! projects are kept in separate locks; each trait call takes one lock, so a
//! call is atomic on its own but there is no cross-call transaction.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ProjectStore, StorageError, StorageResult, UserStore};
use crate::auth::Capability;
use crate::models::{LinkedRepo, Project, ProjectRef, ProjectVisibility, User};

#[derive(Debug, Clone)]
struct StoredProject {
    project: Project,
    leads: HashSet<Uuid>,
    granted: HashSet<Uuid>,
    repos: HashSet<i64>,
}

#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    projects: RwLock<HashMap<Uuid, StoredProject>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a project with no leads, grants or repositories.
    pub async fn insert_project(
        &self,
        slug: impl Into<String>,
        name: impl Into<String>,
        visibility: ProjectVisibility,
    ) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            short_description: String::new(),
            visibility,
        };
        self.projects.write().await.insert(
            project.id,
            StoredProject {
                project: project.clone(),
                leads: HashSet::new(),
                granted: HashSet::new(),
                repos: HashSet::new(),
            },
        );
        project
    }

    pub async fn add_project_lead(&self, project_id: Uuid, user_id: Uuid) -> StorageResult<()> {
        self.with_project(project_id, |stored| {
            stored.leads.insert(user_id);
        })
        .await
    }

    pub async fn grant_project_access(&self, project_id: Uuid, user_id: Uuid) -> StorageResult<()> {
        self.with_project(project_id, |stored| {
            stored.granted.insert(user_id);
        })
        .await
    }

    pub async fn revoke_project_access(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<()> {
        self.with_project(project_id, |stored| {
            stored.granted.remove(&user_id);
        })
        .await
    }

    pub async fn link_repo(&self, project_id: Uuid, repo_id: i64) -> StorageResult<()> {
        self.with_project(project_id, |stored| {
            stored.repos.insert(repo_id);
        })
        .await
    }

    /// Grant a capability to an existing user (back-office operation).
    pub async fn grant_capability(
        &self,
        user_id: Uuid,
        capability: Capability,
    ) -> StorageResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))?;
        user.permissions.insert(capability);
        Ok(())
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    async fn with_project(
        &self,
        project_id: Uuid,
        f: impl FnOnce(&mut StoredProject),
    ) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        let stored = projects
            .get_mut(&project_id)
            .ok_or_else(|| StorageError::NotFound(format!("Project {project_id}")))?;
        f(stored);
        Ok(())
    }
}

fn matches(stored: &StoredProject, project: &ProjectRef) -> bool {
    match project {
        ProjectRef::Id(id) => stored.project.id == *id,
        ProjectRef::Slug(slug) => stored.project.slug == *slug,
    }
}

fn find<'a>(
    projects: &'a HashMap<Uuid, StoredProject>,
    project: &ProjectRef,
) -> Option<&'a StoredProject> {
    match project {
        ProjectRef::Id(id) => projects.get(id),
        ProjectRef::Slug(_) => projects.values().find(|stored| matches(stored, project)),
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user_by_external_id(&self, external_user_id: i64) -> StorageResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.external_user_id == external_user_id)
            .cloned())
    }

    async fn create_user(&self, user: User) -> StorageResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|existing| existing.external_user_id == user.external_user_id)
        {
            return Err(StorageError::AlreadyExists(format!(
                "User with external id {}",
                user.external_user_id
            )));
        }
        if users.contains_key(&user.id) {
            return Err(StorageError::AlreadyExists(format!("User {}", user.id)));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        login: &str,
        avatar_url: &str,
        email: Option<&str>,
    ) -> StorageResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))?;
        user.login = login.to_string();
        user.avatar_url = avatar_url.to_string();
        user.email = email.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn project_visibility(
        &self,
        project: &ProjectRef,
    ) -> StorageResult<Option<ProjectVisibility>> {
        let projects = self.projects.read().await;
        Ok(find(&projects, project).map(|stored| stored.project.visibility))
    }

    async fn user_has_access_to_project(
        &self,
        project: &ProjectRef,
        user_id: Uuid,
    ) -> StorageResult<bool> {
        let projects = self.projects.read().await;
        Ok(find(&projects, project)
            .map(|stored| stored.granted.contains(&user_id) || stored.leads.contains(&user_id))
            .unwrap_or(false))
    }

    async fn user_is_project_lead(&self, project_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let projects = self.projects.read().await;
        Ok(projects
            .get(&project_id)
            .map(|stored| stored.leads.contains(&user_id))
            .unwrap_or(false))
    }

    async fn is_repo_linked_to_project(
        &self,
        project_id: Uuid,
        repo_id: i64,
    ) -> StorageResult<bool> {
        let projects = self.projects.read().await;
        Ok(projects
            .get(&project_id)
            .map(|stored| stored.repos.contains(&repo_id))
            .unwrap_or(false))
    }

    async fn find_project(&self, project: &ProjectRef) -> StorageResult<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(find(&projects, project).map(|stored| stored.project.clone()))
    }

    async fn update_project_description(
        &self,
        project_id: Uuid,
        short_description: &str,
    ) -> StorageResult<Project> {
        let mut projects = self.projects.write().await;
        let stored = projects
            .get_mut(&project_id)
            .ok_or_else(|| StorageError::NotFound(format!("Project {project_id}")))?;
        stored.project.short_description = short_description.to_string();
        Ok(stored.project.clone())
    }

    async fn find_linked_repo(
        &self,
        project_id: Uuid,
        repo_id: i64,
    ) -> StorageResult<Option<LinkedRepo>> {
        let projects = self.projects.read().await;
        Ok(projects
            .get(&project_id)
            .filter(|stored| stored.repos.contains(&repo_id))
            .map(|_| LinkedRepo {
                project_id,
                repo_id,
            }))
    }
}
