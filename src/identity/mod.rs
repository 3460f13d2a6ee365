// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Resolution
//!
//! Maps an [`ExternalIdentity`] to the internal [`User`] record.
//!
//! ## States
//!
//! | Stored user | `create_if_not_exists` | Outcome |
//! |-------------|------------------------|---------|
//! | found       | any                    | profile refreshed, same `id` returned |
//! | absent      | `true`                 | user created with `{User}` role, observer notified |
//! | absent      | `false`                | `UserNotFound` |
//!
//! The caller path always creates. The impersonation target path never
//! does, so an operator cannot conjure an account by impersonating an
//! unknown id.
//!
//! ## Races
//!
//! Two first sightings of the same identity may both miss the lookup. The
//! store's uniqueness constraint makes one `create_user` fail with
//! `AlreadyExists`; that call retries as a lookup and reconciles.

pub mod observer;

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::auth::claims::ExternalIdentity;
use crate::auth::{AuthError, Role};
use crate::models::User;
use crate::storage::{StorageError, UserStore};

pub use observer::{ChannelUserObserver, LoggingUserObserver, UserObserver, UserSignedUp};

#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    observer: Arc<dyn UserObserver>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>, observer: Arc<dyn UserObserver>) -> Self {
        Self { users, observer }
    }

    /// Find or create the user for an external identity, refreshing its profile.
    pub async fn resolve(
        &self,
        identity: &ExternalIdentity,
        create_if_not_exists: bool,
    ) -> Result<User, AuthError> {
        if let Some(user) = self.users.find_user_by_external_id(identity.external_user_id).await? {
            return self.reconcile(user, identity).await;
        }

        if !create_if_not_exists {
            return Err(AuthError::UserNotFound(identity.external_user_id));
        }

        self.create(identity).await
    }

    /// Find the user for an external identity without creating or updating it.
    pub async fn lookup(&self, identity: &ExternalIdentity) -> Result<User, AuthError> {
        self.users
            .find_user_by_external_id(identity.external_user_id)
            .await?
            .ok_or(AuthError::UserNotFound(identity.external_user_id))
    }

    /// Bring the provider-owned fields of `user` in line with `identity`.
    ///
    /// The internal id, roles, capabilities and flags are never touched. An
    /// identity without an email keeps the stored one.
    pub async fn reconcile(
        &self,
        mut user: User,
        identity: &ExternalIdentity,
    ) -> Result<User, AuthError> {
        let email = identity.email.clone().or_else(|| user.email.clone());
        if user.login == identity.login
            && user.avatar_url == identity.avatar_url
            && user.email == email
        {
            return Ok(user);
        }

        self.users
            .update_user_profile(user.id, &identity.login, &identity.avatar_url, email.as_deref())
            .await?;
        tracing::debug!(
            user_id = %user.id,
            external_user_id = user.external_user_id,
            "User profile refreshed"
        );

        user.login = identity.login.clone();
        user.avatar_url = identity.avatar_url.clone();
        user.email = email;
        Ok(user)
    }

    async fn create(&self, identity: &ExternalIdentity) -> Result<User, AuthError> {
        let user = User {
            id: Uuid::new_v4(),
            external_user_id: identity.external_user_id,
            login: identity.login.clone(),
            avatar_url: identity.avatar_url.clone(),
            email: identity.email.clone(),
            roles: BTreeSet::from([Role::default()]),
            permissions: BTreeSet::new(),
            onboarding_accepted: false,
            terms_accepted: false,
        };

        match self.users.create_user(user).await {
            Ok(user) => {
                self.observer.on_user_signed_up(&user);
                Ok(user)
            }
            Err(StorageError::AlreadyExists(_)) => {
                tracing::debug!(
                    external_user_id = identity.external_user_id,
                    "Concurrent sign-up detected, retrying as lookup"
                );
                let user = self.lookup(identity).await?;
                self.reconcile(user, identity).await
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, StorageResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn identity(id: i64, login: &str, avatar: &str) -> ExternalIdentity {
        ExternalIdentity {
            external_user_id: id,
            login: login.to_string(),
            avatar_url: avatar.to_string(),
            email: None,
        }
    }

    fn resolver(
        store: Arc<dyn UserStore>,
    ) -> (
        IdentityResolver,
        tokio::sync::mpsc::UnboundedReceiver<UserSignedUp>,
    ) {
        let (observer, rx) = ChannelUserObserver::new();
        (IdentityResolver::new(store, Arc::new(observer)), rx)
    }

    #[tokio::test]
    async fn first_sighting_creates_user_with_default_role() {
        let store = Arc::new(InMemoryStore::new());
        let (resolver, mut rx) = resolver(store.clone());

        let user = resolver
            .resolve(&identity(42, "octocat", "https://avatars/42?v=1"), true)
            .await
            .unwrap();

        assert_eq!(user.external_user_id, 42);
        assert_eq!(user.roles, BTreeSet::from([Role::User]));
        assert!(user.permissions.is_empty());
        assert!(!user.onboarding_accepted);
        assert_eq!(rx.try_recv().unwrap().user_id, user.id);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn second_sighting_keeps_id_and_refreshes_profile() {
        let store = Arc::new(InMemoryStore::new());
        let (resolver, mut rx) = resolver(store.clone());

        let first = resolver
            .resolve(&identity(42, "octocat", "https://avatars/42?v=1"), true)
            .await
            .unwrap();
        let _ = rx.try_recv();

        let second = resolver
            .resolve(&identity(42, "octocat-renamed", "https://avatars/42?v=2"), true)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.login, "octocat-renamed");
        assert_eq!(second.avatar_url, "https://avatars/42?v=2");
        assert_eq!(second.roles, first.roles);
        assert!(rx.try_recv().is_err(), "no second sign-up event");
        assert_eq!(store.user_count().await, 1);

        let stored = store.find_user_by_external_id(42).await.unwrap().unwrap();
        assert_eq!(stored.avatar_url, "https://avatars/42?v=2");
    }

    #[tokio::test]
    async fn missing_email_keeps_stored_email() {
        let store = Arc::new(InMemoryStore::new());
        let (resolver, _rx) = resolver(store.clone());

        let mut with_email = identity(7, "seven", "https://avatars/7");
        with_email.email = Some("seven@example.com".into());
        resolver.resolve(&with_email, true).await.unwrap();

        let user = resolver
            .resolve(&identity(7, "seven", "https://avatars/7"), true)
            .await
            .unwrap();
        assert_eq!(user.email.as_deref(), Some("seven@example.com"));
    }

    #[tokio::test]
    async fn unknown_identity_without_create_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let (resolver, mut rx) = resolver(store.clone());

        let result = resolver
            .resolve(&identity(595505, "ofux", "https://avatars/595505"), false)
            .await;

        assert!(matches!(result, Err(AuthError::UserNotFound(595505))));
        assert_eq!(store.user_count().await, 0);
        assert!(rx.try_recv().is_err());
    }

    /// Hides the stored user from the first lookup, as if another request
    /// created it in between.
    struct RacingStore {
        inner: InMemoryStore,
        hidden_once: AtomicBool,
    }

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_user_by_external_id(&self, id: i64) -> StorageResult<Option<User>> {
            if !self.hidden_once.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_user_by_external_id(id).await
        }

        async fn create_user(&self, user: User) -> StorageResult<User> {
            self.inner.create_user(user).await
        }

        async fn update_user_profile(
            &self,
            user_id: Uuid,
            login: &str,
            avatar_url: &str,
            email: Option<&str>,
        ) -> StorageResult<()> {
            self.inner
                .update_user_profile(user_id, login, avatar_url, email)
                .await
        }
    }

    #[tokio::test]
    async fn uniqueness_violation_retries_as_lookup() {
        let inner = InMemoryStore::new();
        let existing = inner
            .create_user(User {
                id: Uuid::new_v4(),
                external_user_id: 42,
                login: "octocat".into(),
                avatar_url: "https://avatars/42?v=1".into(),
                email: None,
                roles: BTreeSet::from([Role::User]),
                permissions: BTreeSet::new(),
                onboarding_accepted: true,
                terms_accepted: true,
            })
            .await
            .unwrap();

        let store = Arc::new(RacingStore {
            inner,
            hidden_once: AtomicBool::new(false),
        });
        let (resolver, mut rx) = resolver(store.clone());

        let user = resolver
            .resolve(&identity(42, "octocat", "https://avatars/42?v=2"), true)
            .await
            .unwrap();

        assert_eq!(user.id, existing.id);
        assert_eq!(user.avatar_url, "https://avatars/42?v=2");
        assert!(user.onboarding_accepted);
        assert!(rx.try_recv().is_err(), "the loser of the race is not a sign-up");
    }

    struct FailingStore;

    #[async_trait]
    impl UserStore for FailingStore {
        async fn find_user_by_external_id(&self, _: i64) -> StorageResult<Option<User>> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn create_user(&self, _: User) -> StorageResult<User> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn update_user_profile(
            &self,
            _: Uuid,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> StorageResult<()> {
            Err(StorageError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_storage_error() {
        let (resolver, _rx) = resolver(Arc::new(FailingStore));
        let result = resolver
            .resolve(&identity(42, "octocat", "https://avatars/42"), true)
            .await;
        assert!(matches!(result, Err(AuthError::Storage(_))));
    }
}
