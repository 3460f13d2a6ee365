// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// Why a bearer token was refused by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Not a well-formed compact JWS, or the payload is not valid JSON
    Malformed,
    /// Signature does not match the selected key
    InvalidSignature,
    /// `exp` is in the past (beyond leeway)
    Expired,
    /// `nbf` is in the future (beyond leeway)
    NotYetValid,
    /// `iat` is in the future (beyond leeway)
    IssuedInFuture,
    /// `iss` does not match configuration
    InvalidIssuer,
    /// `aud` does not match configuration
    InvalidAudience,
    /// Header algorithm is not the one pinned by the key
    UnsupportedAlgorithm,
    /// No key in the key set matches the token
    UnknownKey,
}

impl TokenRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::Malformed => "malformed",
            TokenRejection::InvalidSignature => "invalid_signature",
            TokenRejection::Expired => "expired",
            TokenRejection::NotYetValid => "not_yet_valid",
            TokenRejection::IssuedInFuture => "issued_in_future",
            TokenRejection::InvalidIssuer => "invalid_issuer",
            TokenRejection::InvalidAudience => "invalid_audience",
            TokenRejection::UnsupportedAlgorithm => "unsupported_algorithm",
            TokenRejection::UnknownKey => "unknown_key",
        }
    }
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication error type.
///
/// Failures in the authentication chain (token, claims, identity lookup)
/// are collapsed to "no principal" by `Authenticator::authenticate`; they
/// only surface as HTTP responses through the extractors and the typed
/// diagnostic path. `Forbidden` and `Unauthorized` are raised directly to
/// the caller of a business operation.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Invalid authorization header format
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Signature, issuer, audience or time-window check failed
    #[error("Invalid token: {0}")]
    InvalidToken(TokenRejection),
    /// Verified payload (or impersonation payload) has the wrong shape
    #[error("Malformed claims: {0}")]
    MalformedClaims(String),
    /// No internal user for this external id and creation was not allowed
    #[error("User {0} not found")]
    UserNotFound(i64),
    /// Caller is known but not entitled
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// No valid principal where one is required
    #[error("Unauthorized")]
    Unauthorized,
    /// Key set could not be fetched and no cached copy exists
    #[error("Verification keys unavailable: {0}")]
    KeySetUnavailable(String),
    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Build a `Forbidden` error with a human readable reason.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        AuthError::Forbidden(reason.into())
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::MalformedClaims(_) => "malformed_claims",
            AuthError::UserNotFound(_) => "user_not_found",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::Unauthorized => "unauthorized",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::Storage(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::MalformedClaims(_)
            | AuthError::UserNotFound(_)
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::KeySetUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
