// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Identity provider (Auth0, GitHub connection) JWT authentication for the
//! marketplace API, with operator impersonation.
//!
//! ## Auth Flow
//!
//! 1. Frontend authenticates the user with the identity provider
//! 2. Frontend sends `Authorization: Bearer <JWT>`, and optionally
//!    `X-Impersonation-Claims: {"sub": "github|<id>", "nickname": ..., "picture": ...}`
//! 3. Server:
//!    - Verifies signature, expiry, issuer, audience against the cached JWKS
//!    - Extracts `sub` (`github|<id>`), `nickname`, `picture`, `email`
//!    - Resolves (or creates) the internal user
//!    - Switches to the impersonated user if the caller holds the capability
//!
//! ## Security
//!
//! - JWT verification uses HTTPS-only JWKS fetching
//! - JWKS is cached with TTL and refreshed in the background
//! - Clock skew tolerance defaults to 60 seconds
//! - Any failure in the chain leaves the request anonymous

pub mod claims;
pub mod error;
pub mod extractor;
pub mod impersonation;
pub mod jwks;
pub mod middleware;
pub mod principal;
pub mod roles;
pub mod verifier;

pub use claims::ExternalIdentity;
pub use error::{AuthError, TokenRejection};
pub use extractor::{Auth, OptionalAuth};
pub use impersonation::{Authenticator, IMPERSONATION_HEADER};
pub use jwks::{JwksManager, KeySetStatus};
pub use principal::{AuthContext, AuthenticatedPrincipal, Credential};
pub use roles::{Capability, Role};
pub use verifier::{TokenVerifier, VerifiedToken};
