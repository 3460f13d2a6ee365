// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Runs the authentication chain once per request and stores the resulting
//! [`AuthContext`] in the request extensions. It never rejects: requests
//! without valid credentials continue as [`AuthContext::Anonymous`], and
//! handlers decide whether that is acceptable (see `extractor.rs`).
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/v1/me", get(handler))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), authenticate));
//! ```

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::error::AuthError;
use super::impersonation::{Authenticator, IMPERSONATION_HEADER};
use super::principal::AuthContext;
use crate::state::AppState;

/// Authentication middleware function.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = resolve_context(request.headers(), &state.authenticator).await;
    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Build the authentication context for a set of request headers.
pub async fn resolve_context(headers: &HeaderMap, authenticator: &Authenticator) -> AuthContext {
    let token = match bearer_token(headers) {
        Ok(Some(token)) => token,
        Ok(None) => return AuthContext::Anonymous,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unusable Authorization header");
            return AuthContext::Anonymous;
        }
    };

    // A present but unreadable impersonation header must not fall back to
    // the caller's own identity.
    let impersonation = match headers.get(IMPERSONATION_HEADER).map(|v| v.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            tracing::warn!("Impersonation header is not valid UTF-8");
            return AuthContext::Anonymous;
        }
    };

    authenticator.authenticate(token, impersonation).await.into()
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// `Ok(None)` when the header is absent.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let token = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(Some(token))
}
