// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: signing keys, key sets and token minting.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::auth::{JwksManager, TokenVerifier};
use crate::identity::LoggingUserObserver;
use crate::state::AppState;
use crate::storage::InMemoryStore;

pub const ISSUER: &str = "https://onlydust.eu.auth0.com/";
pub const AUDIENCE: &str = "marketplace-api";
pub const SIGNING_KID: &str = "signing-key-1";
pub const ROTATED_KID: &str = "signing-key-2";

pub const SIGNING_KEY_PEM: &str = include_str!("../testdata/signing_key.pem");
pub const FOREIGN_KEY_PEM: &str = include_str!("../testdata/foreign_key.pem");

/// Base64url modulus of `testdata/signing_key.pem`.
pub const SIGNING_KEY_N: &str = "oshrZhjYl3CFP-tuk6z5r89Xmb31Gpa1izoa-NSYRZKnxJah3nF23CYuEvXh8IFLTPFKZMCK7aqtolcY0qIYT79P4IVG9Q7xrPUc3L5cwHMqvRilkF_TGWO0IXfq168pJ5pBdKVAYrzmQcqitbIqZYLMQhoF2d63VYG_Z5sN4Pq5D2uNB_pV4xIZnL45cww6MRSJA0OGqFVNnBFrD-rih6dlR2eTqKpLT4CCen_ffN7xR6aaZY7wC4RtIvRvmXKkgB0PgI9xYEC8BCA1weK6RKGzkL1BzNXEaqKO7xayYWRuEXLz1rJutRMTixkTZpgCUUgUVLylDA9lF4EDBYIh3Q";

/// Base64url modulus of `testdata/foreign_key.pem`.
pub const FOREIGN_KEY_N: &str = "wQohIFPjtJU-_zYasiXgskBQM0SmKICVfGv5E5D5BrqAXJBumbGopxH_9QVGGYs1BmhkUhJGSDvRk_Eul315h3PNxO-E9sZWFRuNIqjDgFMDELjs6H1-de6bDspDD1qNNXcSI4tWFZdoN2Ha60v1qoN6U9qHkD3_3UTFY-3JSY022yKsY8u41Cd_txv-80AHezn5CbBFgbY2uoTEetEG6d-iyMGj2ivHO8EjdcHHqVHGIoFjQ7PDPePgsJoSLIOPoZGQtZrLynNAZ1aGa8IkYgBVZQ88Uzb2mpGOjob1nRuHMQ1vZorIcmySPDJ_5ZLP4RbwJ2XQUXhLvH_fB95Wuw";

pub const CALLER_ID: i64 = 31901905;
pub const CALLER_LOGIN: &str = "kaelsky";
pub const CALLER_AVATAR: &str = "https://avatars.githubusercontent.com/u/31901905?v=4";
pub const TARGET_ID: i64 = 595505;
pub const TARGET_LOGIN: &str = "ofux";
pub const TARGET_AVATAR: &str = "https://avatars.githubusercontent.com/u/595505?v=4";

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// JSON for one RSA verification key.
pub fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": n,
        "e": "AQAB",
    })
}

pub fn jwk_set_json(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// Key set containing only the signing key, under [`SIGNING_KID`].
pub fn signing_jwk_set() -> JwkSet {
    serde_json::from_value(jwk_set_json(&[rsa_jwk(SIGNING_KID, SIGNING_KEY_N)])).unwrap()
}

/// Standard claims for a GitHub identity, valid for an hour.
pub fn identity_claims(external_id: i64, login: &str, avatar: &str) -> Value {
    let now = now();
    json!({
        "sub": format!("github|{external_id}"),
        "nickname": login,
        "picture": avatar,
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now,
        "exp": now + 3600,
    })
}

pub fn caller_claims() -> Value {
    identity_claims(CALLER_ID, CALLER_LOGIN, CALLER_AVATAR)
}

/// Sign arbitrary claims with a PEM key under the given `kid`.
pub fn mint_with(claims: &Value, pem: &str, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Sign claims with the trusted signing key.
pub fn mint(claims: &Value) -> String {
    mint_with(claims, SIGNING_KEY_PEM, Some(SIGNING_KID))
}

/// Impersonation header value for the standard target identity.
pub fn target_header() -> String {
    json!({
        "sub": format!("github|{TARGET_ID}"),
        "nickname": TARGET_LOGIN,
        "picture": TARGET_AVATAR,
    })
    .to_string()
}

/// Verifier trusting [`signing_jwk_set`] for [`ISSUER`] and [`AUDIENCE`].
pub fn test_verifier() -> TokenVerifier {
    TokenVerifier::new(JwksManager::from_jwk_set(signing_jwk_set()), ISSUER).with_audience(AUDIENCE)
}

/// Application state over a fresh in-memory store.
pub fn test_state() -> (AppState, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::build(test_verifier(), store.clone(), Arc::new(LoggingUserObserver));
    (state, store)
}
