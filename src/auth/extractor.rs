// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the authentication context.
//!
//! Use `Auth` in handlers that require a caller, `OptionalAuth` in handlers
//! that also serve anonymous requests:
//!
//! ```rust,ignore
//! async fn me(Auth(principal): Auth) -> impl IntoResponse { /* ... */ }
//!
//! async fn project(OptionalAuth(ctx): OptionalAuth, State(state): State<AppState>) {
//!     state.projects.get_by_id(&ctx, id).await
//! }
//! ```
//!
//! Both reuse the context stored by the authentication middleware when it
//! ran, and otherwise authenticate the request themselves.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::AuthError;
use super::middleware::{bearer_token, resolve_context};
use super::principal::{AuthContext, AuthenticatedPrincipal};
use crate::state::AppState;

/// Extractor for authenticated principals.
///
/// Rejects with 401 when the request carries no usable credentials.
pub struct Auth(pub Arc<AuthenticatedPrincipal>);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match request_context(parts, state).await {
            AuthContext::Authenticated(principal) => Ok(Auth(principal)),
            AuthContext::Anonymous => Err(match bearer_token(&parts.headers) {
                Ok(None) => AuthError::MissingAuthHeader,
                Ok(Some(_)) => AuthError::Unauthorized,
                Err(e) => e,
            }),
        }
    }
}

/// Optional authentication extractor.
///
/// Yields [`AuthContext::Anonymous`] instead of rejecting.
pub struct OptionalAuth(pub AuthContext);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(request_context(parts, state).await))
    }
}

async fn request_context(parts: &mut Parts, state: &AppState) -> AuthContext {
    // First check if middleware already resolved the caller
    if let Some(context) = parts.extensions.get::<AuthContext>() {
        return context.clone();
    }

    let context = resolve_context(&parts.headers, &state.authenticator).await;
    parts.extensions.insert(context.clone());
    context
}
