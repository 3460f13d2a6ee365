// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup seed data for the in-memory store.
//!
//! Back-office state (admin roles, the impersonation capability, projects and
//! their leads) has no API of its own. A deployment without a database loads
//! it from the JSON file named by `SEED_FILE`:
//!
//! ```json
//! {
//!   "users": [
//!     { "github_user_id": 31901905, "login": "kaelsky",
//!       "roles": ["admin"], "capabilities": ["impersonation"] }
//!   ],
//!   "projects": [
//!     { "slug": "kaaper", "name": "Kaaper", "visibility": "PRIVATE",
//!       "leads": [31901905], "members": [], "repos": [498695724] }
//!   ]
//! }
//! ```
//!
//! Seeded users get the default role on top of the listed ones. Their
//! profile is refreshed from the identity provider on first sign-in.
//! Project `leads` and `members` name users by GitHub id, either seeded in
//! the same file or already stored.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use super::{InMemoryStore, ProjectStore, StorageError, UserStore};
use crate::auth::{Capability, Role};
use crate::models::{ProjectRef, ProjectVisibility, User};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid seed data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Project {project} references unknown GitHub user {github_user_id}")]
    UnknownUser { project: String, github_user_id: i64 },
    #[error("Project slug {0} is already taken")]
    DuplicateProject(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub projects: Vec<SeedProject>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub github_user_id: i64,
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedProject {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub short_description: String,
    pub visibility: ProjectVisibility,
    /// GitHub ids of the project leads
    #[serde(default)]
    pub leads: Vec<i64>,
    /// GitHub ids of users granted access to a private project
    #[serde(default)]
    pub members: Vec<i64>,
    #[serde(default)]
    pub repos: Vec<i64>,
}

/// What [`Seed::apply`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub projects: usize,
}

impl Seed {
    pub fn from_file(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write users first, then projects with their leads, members and repositories.
    ///
    /// Stops at the first error; whatever was written before it stays.
    pub async fn apply(&self, store: &InMemoryStore) -> Result<SeedSummary, SeedError> {
        for seeded in &self.users {
            let mut roles = seeded.roles.clone();
            roles.insert(Role::default());
            store
                .create_user(User {
                    id: Uuid::new_v4(),
                    external_user_id: seeded.github_user_id,
                    login: seeded.login.clone(),
                    avatar_url: seeded.avatar_url.clone(),
                    email: seeded.email.clone(),
                    roles,
                    permissions: seeded.capabilities.clone(),
                    onboarding_accepted: false,
                    terms_accepted: false,
                })
                .await?;
        }

        let mut slugs = HashSet::new();
        for seeded in &self.projects {
            let taken = store
                .find_project(&ProjectRef::from(seeded.slug.as_str()))
                .await?
                .is_some();
            if taken || !slugs.insert(seeded.slug.as_str()) {
                return Err(SeedError::DuplicateProject(seeded.slug.clone()));
            }

            let project = store
                .insert_project(&seeded.slug, &seeded.name, seeded.visibility)
                .await;
            if !seeded.short_description.is_empty() {
                store
                    .update_project_description(project.id, &seeded.short_description)
                    .await?;
            }
            for github_user_id in &seeded.leads {
                let user_id = user_id_for(store, &seeded.slug, *github_user_id).await?;
                store.add_project_lead(project.id, user_id).await?;
            }
            for github_user_id in &seeded.members {
                let user_id = user_id_for(store, &seeded.slug, *github_user_id).await?;
                store.grant_project_access(project.id, user_id).await?;
            }
            for repo_id in &seeded.repos {
                store.link_repo(project.id, *repo_id).await?;
            }
        }

        Ok(SeedSummary {
            users: self.users.len(),
            projects: self.projects.len(),
        })
    }
}

async fn user_id_for(
    store: &InMemoryStore,
    project: &str,
    github_user_id: i64,
) -> Result<Uuid, SeedError> {
    store
        .find_user_by_external_id(github_user_id)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| SeedError::UnknownUser {
            project: project.to_string(),
            github_user_id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/seed.json")
    }

    #[tokio::test]
    async fn seed_file_grants_roles_capabilities_and_project_membership() {
        let store = InMemoryStore::new();
        let seed = Seed::from_file(&seed_path()).unwrap();

        let summary = seed.apply(&store).await.unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                users: 2,
                projects: 2
            }
        );

        let operator = store
            .find_user_by_external_id(31901905)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(operator.roles, BTreeSet::from([Role::User, Role::Admin]));
        assert!(operator.has_capability(Capability::Impersonation));

        let member = store
            .find_user_by_external_id(595505)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(member.roles, BTreeSet::from([Role::User]));
        assert!(!member.has_capability(Capability::Impersonation));
        assert_eq!(member.email.as_deref(), Some("ofux@example.com"));

        let kaaper = store
            .find_project(&ProjectRef::from("kaaper"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kaaper.short_description, "Documentation generator for Cairo");
        let is_lead = store.user_is_project_lead(kaaper.id, member.id).await;
        assert_eq!(is_lead, Ok(true));
        let is_linked = store.is_repo_linked_to_project(kaaper.id, 498695724).await;
        assert_eq!(is_linked, Ok(true));

        let secret = ProjectRef::from("secret-sauce");
        assert_eq!(
            store.project_visibility(&secret).await.unwrap(),
            Some(ProjectVisibility::Private)
        );
        let has_access = store.user_has_access_to_project(&secret, member.id).await;
        assert_eq!(has_access, Ok(true));
    }

    #[tokio::test]
    async fn unknown_lead_is_rejected() {
        let seed: Seed = serde_json::from_str(
            r#"{"projects":[{"slug":"kaaper","name":"Kaaper","visibility":"PUBLIC","leads":[7]}]}"#,
        )
        .unwrap();

        let err = seed.apply(&InMemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, SeedError::UnknownUser { github_user_id: 7, .. }));
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let project = r#"{"slug":"kaaper","name":"Kaaper","visibility":"PUBLIC"}"#;
        let seed: Seed =
            serde_json::from_str(&format!(r#"{{"projects":[{project},{project}]}}"#)).unwrap();

        let err = seed.apply(&InMemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, SeedError::DuplicateProject(slug) if slug == "kaaper"));
    }

    #[test]
    fn unknown_capability_fails_to_parse() {
        let result = serde_json::from_str::<Seed>(
            r#"{"users":[{"github_user_id":1,"login":"a","capabilities":["superuser"]}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Seed::from_file(Path::new("/nonexistent/seed.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/seed.json"));
    }
}
