// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity claims and the external identity they describe.
//!
//! Two inputs share one shape:
//!
//! - the payload of a bearer token, after [`TokenVerifier`](super::TokenVerifier)
//!   has checked it;
//! - the JSON object carried by the impersonation header.
//!
//! ```json
//! { "sub": "github|595505", "nickname": "ofux", "picture": "https://...", "email": "..." }
//! ```
//!
//! ## Trust boundary
//!
//! The impersonation payload is **not** signature-verified. It is trusted only
//! because the same request carries a verified caller token, and only after
//! that caller has been shown to hold [`Capability::Impersonation`](super::Capability).
//! Nothing decoded from it is acted upon before that check.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::AuthError;

/// Identity provider prefix of the `sub` claim.
pub const SUBJECT_PREFIX: &str = "github|";

/// Identity fields of a token or impersonation payload.
///
/// Registered claims (`exp`, `iss`, ...) are validated by the verifier and
/// ignored here.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// `<provider>|<numeric id>`
    pub sub: String,
    /// Login at the identity provider
    #[serde(default)]
    pub nickname: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Canonical external identity, produced from claims and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub external_user_id: i64,
    pub login: String,
    pub avatar_url: String,
    pub email: Option<String>,
}

impl ExternalIdentity {
    /// Decode the identity from a verified token payload.
    pub fn from_claims(claims: &Map<String, Value>) -> Result<Self, AuthError> {
        let claims: IdentityClaims = serde_json::from_value(Value::Object(claims.clone()))
            .map_err(|e| AuthError::MalformedClaims(format!("token payload: {e}")))?;
        Self::try_from(claims)
    }

    /// Decode the identity from a raw impersonation header value.
    pub fn from_impersonation_header(raw: &str) -> Result<Self, AuthError> {
        let claims: IdentityClaims = serde_json::from_str(raw)
            .map_err(|e| AuthError::MalformedClaims(format!("impersonation payload: {e}")))?;
        Self::try_from(claims)
    }
}

impl TryFrom<IdentityClaims> for ExternalIdentity {
    type Error = AuthError;

    fn try_from(claims: IdentityClaims) -> Result<Self, Self::Error> {
        let external_user_id = parse_subject(&claims.sub)?;

        let login = claims
            .nickname
            .filter(|nickname| !nickname.is_empty())
            .ok_or_else(|| AuthError::MalformedClaims("missing nickname".to_string()))?;
        let avatar_url = claims
            .picture
            .ok_or_else(|| AuthError::MalformedClaims("missing picture".to_string()))?;

        Ok(ExternalIdentity {
            external_user_id,
            login,
            avatar_url,
            email: claims.email.filter(|email| !email.is_empty()),
        })
    }
}

/// Parse `github|<digits>` into the numeric GitHub id.
pub fn parse_subject(sub: &str) -> Result<i64, AuthError> {
    let digits = sub
        .strip_prefix(SUBJECT_PREFIX)
        .ok_or_else(|| AuthError::MalformedClaims(format!("unexpected subject '{sub}'")))?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::MalformedClaims(format!(
            "subject '{sub}' has a non-numeric id"
        )));
    }

    digits
        .parse::<i64>()
        .map_err(|_| AuthError::MalformedClaims(format!("subject '{sub}' id out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn decodes_token_payload() {
        let claims = payload(json!({
            "sub": "github|31901905",
            "nickname": "kaelsky",
            "picture": "https://avatars.githubusercontent.com/u/31901905?v=4",
            "iss": "https://onlydust.eu.auth0.com/",
            "exp": 4102444800u64,
        }));

        let identity = ExternalIdentity::from_claims(&claims).unwrap();
        assert_eq!(identity.external_user_id, 31901905);
        assert_eq!(identity.login, "kaelsky");
        assert_eq!(
            identity.avatar_url,
            "https://avatars.githubusercontent.com/u/31901905?v=4"
        );
        assert_eq!(identity.email, None);
    }

    #[test]
    fn decodes_impersonation_header() {
        let header = json!({
            "sub": "github|595505",
            "nickname": "ofux",
            "picture": "https://avatars.githubusercontent.com/u/595505?v=4",
            "email": "ofux@example.com"
        })
        .to_string();
        let identity = ExternalIdentity::from_impersonation_header(&header).unwrap();

        assert_eq!(identity.external_user_id, 595505);
        assert_eq!(identity.login, "ofux");
        assert_eq!(identity.email.as_deref(), Some("ofux@example.com"));
    }

    #[test]
    fn rejects_foreign_or_non_numeric_subjects() {
        for sub in [
            "google-oauth2|123",
            "github|",
            "github|abc",
            "github|-5",
            "github|12 ",
            "31901905",
            "github|99999999999999999999",
        ] {
            assert!(
                matches!(parse_subject(sub), Err(AuthError::MalformedClaims(_))),
                "{sub} should be rejected"
            );
        }
    }

    #[test]
    fn missing_profile_fields_are_malformed() {
        let no_nickname = payload(json!({
            "sub": "github|42",
            "picture": "https://avatars.githubusercontent.com/u/42",
        }));
        assert!(matches!(
            ExternalIdentity::from_claims(&no_nickname),
            Err(AuthError::MalformedClaims(_))
        ));

        let no_picture = payload(json!({ "sub": "github|42", "nickname": "octo" }));
        assert!(matches!(
            ExternalIdentity::from_claims(&no_picture),
            Err(AuthError::MalformedClaims(_))
        ));
    }

    #[test]
    fn invalid_header_json_is_malformed() {
        assert!(matches!(
            ExternalIdentity::from_impersonation_header("not json"),
            Err(AuthError::MalformedClaims(_))
        ));
        assert!(matches!(
            ExternalIdentity::from_impersonation_header(r#"{"nickname":"ofux"}"#),
            Err(AuthError::MalformedClaims(_))
        ));
    }
}
