// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Security
//!
//! - JWKS is fetched via HTTPS only (plain HTTP is accepted for loopback hosts)
//! - The signing algorithm is taken from the key, never from the token alone
//! - Keys are cached with a configurable TTL and swapped atomically on refresh
//! - Stale cache is used on fetch failure (fail-open for availability)
//!
//! ## Request path
//!
//! Once any key set is cached, verification never waits on the network. An
//! expired set keeps serving while a single refresh runs in the background.
//! Only an empty cache (cold start) makes a request fetch, and concurrent
//! cold requests share that one fetch.
//!
//! ## Key rotation
//!
//! A token naming a `kid` that is absent from the cached set forces one
//! refresh. Refreshes started from the request path, forced or for expiry,
//! happen at most once per [`MIN_REFRESH_INTERVAL`], so a flood of tokens
//! with bogus `kid`s cannot turn into a flood of fetches.
//!
//! ## Usage
//!
//! Build the manager from `AUTH_JWKS_URL` in main.rs and spawn
//! [`JwksManager::spawn_refresh_task`] so the cache stays fresh out of band.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{
    AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use super::error::{AuthError, TokenRejection};

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Lower bound between two refreshes started from the request path.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// JWKS cache entry.
struct CacheEntry {
    jwks: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Bookkeeping for refreshes started by requests. Guarded by one mutex so
/// that at most one of them talks to the identity provider at a time.
#[derive(Default)]
struct RefreshState {
    /// Last expiry or unknown-`kid` refresh
    last_attempt: Option<Instant>,
    /// Last failed cold-start fetch
    last_failure: Option<Instant>,
}

#[derive(Clone)]
enum KeySource {
    /// Published by the identity provider
    Remote { url: Url, client: reqwest::Client },
    /// Fixed at construction (tests, offline deployments)
    Static,
}

/// Freshness of the cached key set, as reported to readiness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetStatus {
    Fresh,
    Stale,
    Missing,
}

/// JWKS manager with caching.
///
/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct JwksManager {
    source: KeySource,
    /// Cache TTL
    cache_ttl: Duration,
    /// Cached JWKS
    cache: Arc<RwLock<Option<CacheEntry>>>,
    refresh_state: Arc<Mutex<RefreshState>>,
}

impl JwksManager {
    /// Create a new JWKS manager.
    ///
    /// # Arguments
    /// - `jwks_url`: The JWKS endpoint URL
    ///   (e.g., `https://tenant.eu.auth0.com/.well-known/jwks.json`)
    /// - `fetch_timeout`: Per-request timeout for key set fetches
    pub fn new(jwks_url: &str, fetch_timeout: Duration) -> Result<Self, AuthError> {
        let url = validate_jwks_url(jwks_url)?;
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| {
                AuthError::KeySetUnavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self::with_source(KeySource::Remote { url, client }, None))
    }

    /// Create a manager serving a fixed key set. It never fetches.
    pub fn from_jwk_set(jwks: JwkSet) -> Self {
        let entry = CacheEntry {
            jwks: Arc::new(jwks),
            fetched_at: Instant::now(),
        };
        Self::with_source(KeySource::Static, Some(entry))
    }

    fn with_source(source: KeySource, entry: Option<CacheEntry>) -> Self {
        Self {
            source,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(entry)),
            refresh_state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Get the JWKS URL, if keys are fetched remotely.
    pub fn jwks_url(&self) -> Option<&str> {
        match &self.source {
            KeySource::Remote { url, .. } => Some(url.as_str()),
            KeySource::Static => None,
        }
    }

    /// Current key set without waiting on the network when one is cached.
    ///
    /// An expired set is returned as is and a background refresh is
    /// scheduled. Only an empty cache fetches inline.
    pub async fn get_jwks(&self) -> Result<Arc<JwkSet>, AuthError> {
        let cached = {
            let cache = self.cache.read().await;
            cache
                .as_ref()
                .map(|entry| (entry.jwks.clone(), self.is_fresh(entry)))
        };

        match cached {
            Some((jwks, true)) => Ok(jwks),
            Some((jwks, false)) => {
                self.schedule_refresh();
                Ok(jwks)
            }
            None => self.load_cold().await,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        matches!(self.source, KeySource::Static) || entry.fetched_at.elapsed() < self.cache_ttl
    }

    /// First fetch, shared by every request that finds the cache empty.
    async fn load_cold(&self) -> Result<Arc<JwkSet>, AuthError> {
        let waiting_since = Instant::now();
        let mut state = self.refresh_state.lock().await;

        // Another request may have loaded the set, or just failed to, while we waited
        if let Some(entry) = self.cache.read().await.as_ref() {
            return Ok(entry.jwks.clone());
        }
        if state.last_failure.is_some_and(|at| at >= waiting_since) {
            return Err(AuthError::KeySetUnavailable(
                "key set fetch failed while waiting".into(),
            ));
        }

        match self.refresh().await {
            Ok(jwks) => Ok(jwks),
            Err(e) => {
                state.last_failure = Some(Instant::now());
                Err(e)
            }
        }
    }

    /// Refresh an expired set in the background, unless a request-path
    /// refresh is already running or ran within the rate limit.
    fn schedule_refresh(&self) {
        if matches!(self.source, KeySource::Static) {
            return;
        }
        let Ok(mut state) = self.refresh_state.clone().try_lock_owned() else {
            return;
        };
        if state
            .last_attempt
            .is_some_and(|at| at.elapsed() < MIN_REFRESH_INTERVAL)
        {
            return;
        }
        state.last_attempt = Some(Instant::now());

        let manager = self.clone();
        tokio::spawn(async move {
            match manager.refresh().await {
                Ok(_) => tracing::debug!("Expired JWKS refreshed"),
                Err(e) => tracing::warn!(error = %e, "JWKS refresh failed, serving stale key set"),
            }
            drop(state);
        });
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(url: &Url, client: &reqwest::Client) -> Result<JwkSet, AuthError> {
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(format!("invalid JWKS document: {e}")))
    }

    /// Get the decoding key and pinned algorithm for a token.
    ///
    /// With a `kid`, the key must match it exactly. Without one, the first
    /// usable signing key is returned.
    pub async fn decoding_key(
        &self,
        kid: Option<&str>,
    ) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;

        let Some(kid) = kid else {
            return jwks
                .keys
                .iter()
                .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
                .ok_or(AuthError::InvalidToken(TokenRejection::UnknownKey));
        };

        if let Some(jwk) = find_key(&jwks, kid) {
            return jwk_to_decoding_key(jwk);
        }

        let Some(jwks) = self.refresh_for_unknown_kid(kid).await else {
            return Err(AuthError::InvalidToken(TokenRejection::UnknownKey));
        };
        find_key(&jwks, kid)
            .ok_or(AuthError::InvalidToken(TokenRejection::UnknownKey))
            .and_then(jwk_to_decoding_key)
    }

    /// Forced refresh after a `kid` miss, rate limited.
    ///
    /// Returns the new key set, or `None` if no refresh happened.
    async fn refresh_for_unknown_kid(&self, kid: &str) -> Option<Arc<JwkSet>> {
        if matches!(self.source, KeySource::Static) {
            return None;
        }

        // Held across the fetch so concurrent misses wait for one refresh.
        let mut state = self.refresh_state.lock().await;
        if state
            .last_attempt
            .is_some_and(|at| at.elapsed() < MIN_REFRESH_INTERVAL)
        {
            // Another miss may have refreshed already
            let cache = self.cache.read().await;
            return cache.as_ref().map(|entry| entry.jwks.clone());
        }
        state.last_attempt = Some(Instant::now());

        tracing::info!(kid, "Unknown key id, refreshing JWKS");
        match self.refresh().await {
            Ok(jwks) => Some(jwks),
            Err(e) => {
                tracing::warn!(kid, error = %e, "JWKS refresh for unknown key id failed");
                None
            }
        }
    }

    /// Force refresh the JWKS cache.
    ///
    /// The new set replaces the old one in a single write, so readers see
    /// either the old set or the new one.
    pub async fn refresh(&self) -> Result<Arc<JwkSet>, AuthError> {
        let (url, client) = match &self.source {
            KeySource::Remote { url, client } => (url, client),
            KeySource::Static => {
                let cache = self.cache.read().await;
                return cache
                    .as_ref()
                    .map(|entry| entry.jwks.clone())
                    .ok_or_else(|| AuthError::KeySetUnavailable("empty static key set".into()));
            }
        };

        let jwks = Arc::new(Self::fetch_jwks(url, client).await?);
        tracing::debug!(keys = jwks.keys.len(), "JWKS refreshed");

        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        self.status().await == KeySetStatus::Fresh
    }

    /// Freshness of the cached key set.
    pub async fn status(&self) -> KeySetStatus {
        let cache = self.cache.read().await;
        match &*cache {
            Some(entry) if self.is_fresh(entry) => KeySetStatus::Fresh,
            Some(_) => KeySetStatus::Stale,
            None => KeySetStatus::Missing,
        }
    }

    /// Refresh the key set every `interval` until `shutdown` is cancelled.
    ///
    /// The first refresh runs immediately.
    pub fn spawn_refresh_task(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("JWKS refresh task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = manager.refresh().await {
                            tracing::warn!(error = %e, "Background JWKS refresh failed");
                        }
                    }
                }
            }
        })
    }
}

fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
}

/// Accept `https://` URLs, and `http://` only for loopback hosts.
fn validate_jwks_url(raw: &str) -> Result<Url, AuthError> {
    let url = Url::parse(raw)
        .map_err(|e| AuthError::KeySetUnavailable(format!("invalid JWKS URL '{raw}': {e}")))?;

    let loopback = match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    };

    match url.scheme() {
        "https" => Ok(url),
        "http" if loopback => Ok(url),
        scheme => Err(AuthError::KeySetUnavailable(format!(
            "JWKS URL must use https, got '{scheme}'"
        ))),
    }
}

/// Convert a JWK to a DecodingKey and the algorithm it pins.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    let unsupported = || AuthError::InvalidToken(TokenRejection::UnsupportedAlgorithm);

    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return Err(unsupported());
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|_| AuthError::InvalidToken(TokenRejection::UnknownKey))?;

            let alg = match jwk.common.key_algorithm {
                None | Some(KeyAlgorithm::RS256) => Algorithm::RS256,
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                Some(KeyAlgorithm::PS384) => Algorithm::PS384,
                Some(KeyAlgorithm::PS512) => Algorithm::PS512,
                Some(_) => return Err(unsupported()),
            };

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|_| AuthError::InvalidToken(TokenRejection::UnknownKey))?;

            let alg = match (jwk.common.key_algorithm, &ec.curve) {
                (None | Some(KeyAlgorithm::ES256), EllipticCurve::P256) => Algorithm::ES256,
                (None | Some(KeyAlgorithm::ES384), EllipticCurve::P384) => Algorithm::ES384,
                _ => return Err(unsupported()),
            };

            Ok((key, alg))
        }
        _ => Err(unsupported()),
    }
}
