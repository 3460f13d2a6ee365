// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated principal and the per-request authentication context.
//!
//! [`AuthContext`] is built once at the request boundary and passed by
//! reference into every business call. Services obtain the caller only
//! through [`AuthContext::authenticated_user`]; they never read tokens.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use super::error::AuthError;
use super::roles::Capability;
use crate::models::User;

/// The raw bearer token a principal was authenticated with.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for forwarding to downstream services.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// The resolved identity attached to a request. Immutable once built.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    effective_user: User,
    impersonator: Option<User>,
    credential: Credential,
    authorities: BTreeSet<Capability>,
}

impl AuthenticatedPrincipal {
    /// Principal acting as the token's own subject.
    pub fn for_caller(caller: User, credential: Credential) -> Self {
        let authorities = caller.permissions.clone();
        Self {
            effective_user: caller,
            impersonator: None,
            credential,
            authorities,
        }
    }

    /// Principal acting as `target` on behalf of `impersonator`.
    ///
    /// Authorities are the target's: the effective subject's grants govern
    /// what the request may do, not the operator's.
    pub fn impersonating(target: User, impersonator: User, credential: Credential) -> Self {
        let authorities = target.permissions.clone();
        Self {
            effective_user: target,
            impersonator: Some(impersonator),
            credential,
            authorities,
        }
    }

    /// The user business code acts as.
    pub fn effective_user(&self) -> &User {
        &self.effective_user
    }

    /// The real caller, when impersonating.
    pub fn impersonator(&self) -> Option<&User> {
        self.impersonator.as_ref()
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonator.is_some()
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn authorities(&self) -> &BTreeSet<Capability> {
        &self.authorities
    }

    pub fn has_authority(&self, capability: Capability) -> bool {
        self.authorities.contains(&capability)
    }

    /// Principal name: the effective user's GitHub id.
    pub fn name(&self) -> String {
        self.effective_user.external_user_id.to_string()
    }
}

/// Who is calling, for the duration of one request.
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    /// No valid credentials were presented
    #[default]
    Anonymous,
    Authenticated(Arc<AuthenticatedPrincipal>),
}

impl AuthContext {
    pub fn authenticated(principal: AuthenticatedPrincipal) -> Self {
        AuthContext::Authenticated(Arc::new(principal))
    }

    pub fn principal(&self) -> Option<&AuthenticatedPrincipal> {
        match self {
            AuthContext::Anonymous => None,
            AuthContext::Authenticated(principal) => Some(principal),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal().is_some()
    }

    /// The effective user of the current request.
    ///
    /// # Errors
    /// `Unauthorized` when anonymous, or when the principal carries no
    /// resolved user.
    pub fn authenticated_user(&self) -> Result<&User, AuthError> {
        let user = self
            .principal()
            .map(AuthenticatedPrincipal::effective_user)
            .ok_or(AuthError::Unauthorized)?;
        if user.id.is_nil() {
            return Err(AuthError::Unauthorized);
        }
        Ok(user)
    }

    /// Internal id of the effective user, if any.
    pub fn caller_id(&self) -> Option<Uuid> {
        self.authenticated_user().ok().map(|user| user.id)
    }
}

impl From<Option<AuthenticatedPrincipal>> for AuthContext {
    fn from(principal: Option<AuthenticatedPrincipal>) -> Self {
        principal.map_or(AuthContext::Anonymous, AuthContext::authenticated)
    }
}
