// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{Authenticator, JwksManager, TokenVerifier};
use crate::identity::{IdentityResolver, UserObserver};
use crate::projects::ProjectService;
use crate::storage::{ProjectStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Authenticator,
    pub projects: ProjectService,
}

impl AppState {
    pub fn new(authenticator: Authenticator, projects: ProjectService) -> Self {
        Self {
            authenticator,
            projects,
        }
    }

    /// Wire the authentication chain and project operations over one store.
    pub fn build<S>(verifier: TokenVerifier, store: Arc<S>, observer: Arc<dyn UserObserver>) -> Self
    where
        S: UserStore + ProjectStore + 'static,
    {
        let resolver = IdentityResolver::new(store.clone(), observer);
        Self::new(
            Authenticator::new(verifier, resolver),
            ProjectService::new(store),
        )
    }

    pub fn jwks(&self) -> &JwksManager {
        self.authenticator.verifier().jwks()
    }
}
