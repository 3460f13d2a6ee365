// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Chain and Impersonation
//!
//! Turns a bearer token (and an optional impersonation header) into an
//! [`AuthenticatedPrincipal`]. The steps run strictly in order, each one a
//! precondition for the next:
//!
//! 1. verify the token;
//! 2. decode the caller's identity from its claims;
//! 3. resolve the caller, creating the user on first sight;
//! 4. if an impersonation header is present and non-blank:
//!    - decode the target identity from it,
//!    - look the target up (never created; unknown targets fail),
//!    - require [`Capability::Impersonation`] on the **caller**,
//!    - refresh the target's profile and act as the target.
//!
//! ## Trust boundary
//!
//! The impersonation header is not signed. It is believed only because the
//! caller's own token was verified and the caller holds the capability. The
//! target's profile is written only after that check, so a caller without
//! the capability cannot alter anyone's profile through the header.
//!
//! ## Failure policy
//!
//! [`Authenticator::authenticate`] collapses every failure to `None`: business
//! code sees an optional principal and enforces "must be authenticated"
//! itself. Impersonation failures never fall back to the caller's identity.

use std::time::Duration;

use super::claims::ExternalIdentity;
use super::error::AuthError;
use super::principal::{AuthenticatedPrincipal, Credential};
use super::roles::Capability;
use super::verifier::TokenVerifier;
use crate::identity::IdentityResolver;

/// Request header carrying the impersonation payload.
pub const IMPERSONATION_HEADER: &str = "x-impersonation-claims";

/// Default deadline for one authentication pass (5 seconds).
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(5000);

#[derive(Clone)]
pub struct Authenticator {
    verifier: TokenVerifier,
    resolver: IdentityResolver,
    deadline: Duration,
}

impl Authenticator {
    pub fn new(verifier: TokenVerifier, resolver: IdentityResolver) -> Self {
        Self {
            verifier,
            resolver,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Bound the time spent on key fetches and user lookups per request.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Authenticate a request, or `None` if any step fails or the deadline passes.
    pub async fn authenticate(
        &self,
        token: &str,
        impersonation: Option<&str>,
    ) -> Option<AuthenticatedPrincipal> {
        match tokio::time::timeout(self.deadline, self.try_authenticate(token, impersonation)).await
        {
            Ok(Ok(principal)) => Some(principal),
            Ok(Err(e)) => {
                match &e {
                    AuthError::InvalidToken(_) | AuthError::MalformedClaims(_) => {
                        tracing::debug!(error = %e, "Authentication rejected")
                    }
                    AuthError::Forbidden(_) | AuthError::UserNotFound(_) => {
                        tracing::warn!(error = %e, "Impersonation rejected")
                    }
                    _ => tracing::warn!(error = %e, "Authentication failed"),
                }
                None
            }
            Err(_) => {
                tracing::warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Authentication timed out"
                );
                None
            }
        }
    }

    /// Authenticate a request, reporting why it failed.
    pub async fn try_authenticate(
        &self,
        token: &str,
        impersonation: Option<&str>,
    ) -> Result<AuthenticatedPrincipal, AuthError> {
        let verified = self.verifier.verify(token).await?;
        let identity = ExternalIdentity::from_claims(verified.claims())?;
        let caller = self.resolver.resolve(&identity, true).await?;
        let credential = Credential::new(token);

        let Some(header) = impersonation.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(AuthenticatedPrincipal::for_caller(caller, credential));
        };

        let target_identity = ExternalIdentity::from_impersonation_header(header)?;
        let target = self.resolver.lookup(&target_identity).await?;

        if !caller.has_capability(Capability::Impersonation) {
            tracing::warn!(
                caller = %caller.login,
                caller_external_id = caller.external_user_id,
                target_external_id = target.external_user_id,
                "Impersonation attempted without capability"
            );
            return Err(AuthError::forbidden(format!(
                "User {} is not allowed to impersonate",
                caller.login
            )));
        }

        let target = self.resolver.reconcile(target, &target_identity).await?;
        tracing::info!(
            impersonator = %caller.login,
            impersonator_external_id = caller.external_user_id,
            target = %target.login,
            target_external_id = target.external_user_id,
            "Impersonating user"
        );

        Ok(AuthenticatedPrincipal::impersonating(target, caller, credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwks::JwksManager;
    use crate::auth::TokenRejection;
    use crate::identity::{ChannelUserObserver, UserSignedUp};
    use crate::models::User;
    use crate::storage::{InMemoryStore, StorageResult, UserStore};
    use crate::test_support::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    struct Harness {
        store: Arc<InMemoryStore>,
        resolver: IdentityResolver,
        authenticator: Authenticator,
        signups: UnboundedReceiver<UserSignedUp>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let (observer, signups) = ChannelUserObserver::new();
        let resolver = IdentityResolver::new(store.clone(), Arc::new(observer));
        let verifier = TokenVerifier::new(JwksManager::from_jwk_set(signing_jwk_set()), ISSUER)
            .with_audience(AUDIENCE);
        Harness {
            store,
            authenticator: Authenticator::new(verifier, resolver.clone()),
            resolver,
            signups,
        }
    }

    impl Harness {
        async fn seed(&self, id: i64, login: &str, avatar: &str, capable: bool) -> User {
            let user = self
                .resolver
                .resolve(
                    &ExternalIdentity {
                        external_user_id: id,
                        login: login.into(),
                        avatar_url: avatar.into(),
                        email: None,
                    },
                    true,
                )
                .await
                .unwrap();
            if capable {
                self.store
                    .grant_capability(user.id, Capability::Impersonation)
                    .await
                    .unwrap();
            }
            user
        }

        async fn user(&self, id: i64) -> Option<User> {
            self.store.find_user_by_external_id(id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn valid_token_authenticates_caller_and_creates_user() {
        let mut h = harness();
        let principal = h
            .authenticator
            .authenticate(&mint(&caller_claims()), None)
            .await
            .unwrap();

        assert_eq!(principal.effective_user().external_user_id, CALLER_ID);
        assert_eq!(principal.effective_user().login, CALLER_LOGIN);
        assert!(!principal.is_impersonating());
        assert_eq!(h.signups.try_recv().unwrap().external_user_id, CALLER_ID);
    }

    #[tokio::test]
    async fn repeated_authentication_reuses_the_user() {
        let h = harness();
        let token = mint(&caller_claims());

        let first = h.authenticator.authenticate(&token, None).await.unwrap();
        let second = h.authenticator.authenticate(&token, None).await.unwrap();

        assert_eq!(first.effective_user().id, second.effective_user().id);
        assert_eq!(h.store.user_count().await, 1);
    }

    #[tokio::test]
    async fn blank_impersonation_header_is_ignored() {
        let h = harness();
        let token = mint(&caller_claims());

        for header in ["", "   "] {
            let principal = h
                .authenticator
                .authenticate(&token, Some(header))
                .await
                .unwrap();
            assert!(!principal.is_impersonating());
            assert_eq!(principal.effective_user().external_user_id, CALLER_ID);
        }
    }

    #[tokio::test]
    async fn invalid_tokens_yield_no_principal_and_no_user() {
        let h = harness();

        let foreign = mint_with(&caller_claims(), FOREIGN_KEY_PEM, Some(SIGNING_KID));
        assert!(h.authenticator.authenticate(&foreign, None).await.is_none());

        let mut expired = caller_claims();
        expired["iat"] = (now() - 7200).into();
        expired["exp"] = (now() - 3600).into();
        assert!(h.authenticator.authenticate(&mint(&expired), None).await.is_none());

        assert!(h.authenticator.authenticate("garbage", None).await.is_none());
        assert_eq!(h.store.user_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_subject_yields_no_principal() {
        let h = harness();
        let mut claims = caller_claims();
        claims["sub"] = "google-oauth2|31901905".into();

        let result = h.authenticator.try_authenticate(&mint(&claims), None).await;
        assert!(matches!(result, Err(AuthError::MalformedClaims(_))));
        assert!(h.authenticator.authenticate(&mint(&claims), None).await.is_none());
    }

    #[tokio::test]
    async fn impersonation_without_capability_is_denied() {
        let h = harness();
        h.seed(TARGET_ID, TARGET_LOGIN, "https://avatars/old", false).await;
        let token = mint(&caller_claims());

        let result = h
            .authenticator
            .try_authenticate(&token, Some(&target_header()))
            .await;
        assert!(matches!(result, Err(AuthError::Forbidden(_))));
        assert!(h
            .authenticator
            .authenticate(&token, Some(&target_header()))
            .await
            .is_none());

        // The unverified header must not have touched the target
        let target = h.user(TARGET_ID).await.unwrap();
        assert_eq!(target.avatar_url, "https://avatars/old");
    }

    #[tokio::test]
    async fn impersonation_with_capability_acts_as_target() {
        let h = harness();
        let caller = h.seed(CALLER_ID, CALLER_LOGIN, CALLER_AVATAR, true).await;
        let target = h.seed(TARGET_ID, TARGET_LOGIN, "https://avatars/old", false).await;

        let principal = h
            .authenticator
            .authenticate(&mint(&caller_claims()), Some(&target_header()))
            .await
            .unwrap();

        assert!(principal.is_impersonating());
        assert_eq!(principal.effective_user().id, target.id);
        assert_eq!(principal.effective_user().external_user_id, TARGET_ID);
        assert_eq!(principal.impersonator().unwrap().id, caller.id);
        assert_eq!(principal.impersonator().unwrap().external_user_id, CALLER_ID);
        assert_eq!(principal.name(), TARGET_ID.to_string());
        // Target has no grants, so neither does the request
        assert!(!principal.has_authority(Capability::Impersonation));
        assert_eq!(principal.effective_user().avatar_url, TARGET_AVATAR);
        assert_eq!(h.user(TARGET_ID).await.unwrap().avatar_url, TARGET_AVATAR);
    }

    #[tokio::test]
    async fn target_capability_does_not_enable_impersonation() {
        let h = harness();
        h.seed(TARGET_ID, TARGET_LOGIN, TARGET_AVATAR, true).await;

        let principal = h
            .authenticator
            .authenticate(&mint(&caller_claims()), Some(&target_header()))
            .await;
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn unknown_target_fails_closed() {
        let h = harness();
        h.seed(CALLER_ID, CALLER_LOGIN, CALLER_AVATAR, true).await;
        let token = mint(&caller_claims());

        let result = h
            .authenticator
            .try_authenticate(&token, Some(&target_header()))
            .await;
        assert!(matches!(result, Err(AuthError::UserNotFound(TARGET_ID))));
        assert!(h.user(TARGET_ID).await.is_none());
        assert!(h
            .authenticator
            .authenticate(&token, Some(&target_header()))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn malformed_impersonation_header_fails_closed() {
        let h = harness();
        h.seed(CALLER_ID, CALLER_LOGIN, CALLER_AVATAR, true).await;
        let token = mint(&caller_claims());

        for header in [
            "not json".to_string(),
            json!({ "sub": "github|abc", "nickname": "x", "picture": "y" }).to_string(),
            json!({ "sub": format!("github|{TARGET_ID}") }).to_string(),
        ] {
            assert!(
                h.authenticator.authenticate(&token, Some(&header)).await.is_none(),
                "{header} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn empty_key_set_rejects_every_token() {
        let store = Arc::new(InMemoryStore::new());
        let (observer, _rx) = ChannelUserObserver::new();
        let resolver = IdentityResolver::new(store, Arc::new(observer));
        let empty = JwksManager::from_jwk_set(serde_json::from_value(jwk_set_json(&[])).unwrap());
        let authenticator = Authenticator::new(TokenVerifier::new(empty, ISSUER), resolver);

        let result = authenticator
            .try_authenticate(&mint(&caller_claims()), None)
            .await;
        assert!(matches!(
            result,
            Err(AuthError::InvalidToken(TokenRejection::UnknownKey))
        ));
    }

    struct SlowStore;

    #[async_trait]
    impl UserStore for SlowStore {
        async fn find_user_by_external_id(&self, _: i64) -> StorageResult<Option<User>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }

        async fn create_user(&self, user: User) -> StorageResult<User> {
            Ok(user)
        }

        async fn update_user_profile(
            &self,
            _: Uuid,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_identity_lookup_hits_the_deadline() {
        let (observer, _rx) = ChannelUserObserver::new();
        let resolver = IdentityResolver::new(Arc::new(SlowStore), Arc::new(observer));
        let verifier = TokenVerifier::new(JwksManager::from_jwk_set(signing_jwk_set()), ISSUER);
        let authenticator =
            Authenticator::new(verifier, resolver).with_deadline(Duration::from_millis(50));

        assert!(authenticator
            .authenticate(&mint(&caller_claims()), None)
            .await
            .is_none());
    }
}
