// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! A token is accepted only if every check passes:
//!
//! 1. the header parses and names a key present in the key set (or no `kid`
//!    and a usable key exists);
//! 2. the header algorithm is the one pinned by that key;
//! 3. the signature verifies;
//! 4. `iss` matches, and `aud` matches when an audience is configured;
//! 5. `exp`, `nbf` and `iat` are within the leeway.
//!
//! There is no partial trust: any failure is an `InvalidToken`.
//! Verification reads keys from the [`JwksManager`] cache and performs no
//! network round trip in the common path.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};

use super::error::{AuthError, TokenRejection};
use super::jwks::JwksManager;

/// Default clock skew tolerance (60 seconds).
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// Claims that must be present in every token.
const REQUIRED_CLAIMS: [&str; 3] = ["exp", "iss", "sub"];

/// A token that passed every check, with its decoded payload.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    claims: Map<String, Value>,
    kid: Option<String>,
    algorithm: Algorithm,
}

impl VerifiedToken {
    /// Decoded payload.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Verifies bearer tokens against the identity provider's key set.
#[derive(Clone)]
pub struct TokenVerifier {
    jwks: JwksManager,
    issuer: String,
    audience: Option<String>,
    leeway: Duration,
}

impl TokenVerifier {
    pub fn new(jwks: JwksManager, issuer: impl Into<String>) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: None,
            leeway: DEFAULT_LEEWAY,
        }
    }

    /// Require the given `aud`. Without it the audience is not checked.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn jwks(&self) -> &JwksManager {
        &self.jwks
    }

    /// Verify a compact JWS and return its payload.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        let header =
            decode_header(token).map_err(|_| AuthError::InvalidToken(TokenRejection::Malformed))?;

        let (decoding_key, algorithm) = self.jwks.decoding_key(header.kid.as_deref()).await?;
        if header.alg != algorithm {
            return Err(AuthError::InvalidToken(TokenRejection::UnsupportedAlgorithm));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway.as_secs();
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&REQUIRED_CLAIMS);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Map<String, Value>>(token, &decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(rejection_for(e.kind())))?;
        let claims = token_data.claims;

        self.check_issued_at(&claims)?;

        Ok(VerifiedToken {
            claims,
            kid: header.kid,
            algorithm,
        })
    }

    /// Reject tokens issued further in the future than the leeway allows.
    fn check_issued_at(&self, claims: &Map<String, Value>) -> Result<(), AuthError> {
        let Some(iat) = claims.get("iat") else {
            return Ok(());
        };
        let iat = iat
            .as_i64()
            .ok_or(AuthError::InvalidToken(TokenRejection::Malformed))?;

        let latest = chrono::Utc::now().timestamp() + self.leeway.as_secs() as i64;
        if iat > latest {
            return Err(AuthError::InvalidToken(TokenRejection::IssuedInFuture));
        }
        Ok(())
    }
}

fn rejection_for(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        ErrorKind::ImmatureSignature => TokenRejection::NotYetValid,
        ErrorKind::InvalidSignature => TokenRejection::InvalidSignature,
        ErrorKind::InvalidIssuer => TokenRejection::InvalidIssuer,
        ErrorKind::InvalidAudience => TokenRejection::InvalidAudience,
        ErrorKind::InvalidAlgorithm => TokenRejection::UnsupportedAlgorithm,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => TokenRejection::InvalidIssuer,
            "aud" => TokenRejection::InvalidAudience,
            _ => TokenRejection::Malformed,
        },
        _ => TokenRejection::Malformed,
    }
}
