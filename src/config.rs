// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into a typed
//! [`Config`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `AUTH_JWKS_URL` | Identity provider JWKS endpoint (HTTPS) | Required |
//! | `AUTH_ISSUER` | Expected JWT issuer claim | Required |
//! | `AUTH_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `AUTH_LEEWAY_SECS` | Clock skew tolerance for `exp`/`nbf`/`iat` | `60` |
//! | `AUTH_JWKS_CACHE_TTL_SECS` | JWKS cache freshness window | `300` |
//! | `AUTH_JWKS_REFRESH_SECS` | Background JWKS refresh interval | `300` |
//! | `AUTH_TIMEOUT_MS` | Deadline for one authentication pass | `5000` |
//! | `AUTH_JWKS_FETCH_TIMEOUT_MS` | Per-fetch JWKS timeout | `2000`, at most half the deadline |
//! | `SEED_FILE` | JSON users and projects loaded at startup | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const AUTH_JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
pub const AUTH_AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
pub const AUTH_LEEWAY_SECS_ENV: &str = "AUTH_LEEWAY_SECS";
pub const AUTH_JWKS_CACHE_TTL_SECS_ENV: &str = "AUTH_JWKS_CACHE_TTL_SECS";
pub const AUTH_JWKS_REFRESH_SECS_ENV: &str = "AUTH_JWKS_REFRESH_SECS";
pub const AUTH_TIMEOUT_MS_ENV: &str = "AUTH_TIMEOUT_MS";
pub const AUTH_JWKS_FETCH_TIMEOUT_MS_ENV: &str = "AUTH_JWKS_FETCH_TIMEOUT_MS";
pub const SEED_FILE_ENV: &str = "SEED_FILE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LEEWAY_SECS: u64 = 60;
const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_JWKS_REFRESH_SECS: u64 = 300;
const DEFAULT_AUTH_TIMEOUT_MS: u64 = 5000;
const DEFAULT_JWKS_FETCH_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'json' or 'pretty', got '{other}'")),
        }
    }
}

/// Token verification and identity provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub jwks_url: Url,
    pub issuer: String,
    pub audience: Option<String>,
    pub leeway: Duration,
    pub jwks_cache_ttl: Duration,
    pub jwks_refresh_interval: Duration,
    pub timeout: Duration,
    /// Per-fetch timeout for the key set endpoint, always below `timeout`
    pub jwks_fetch_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub auth: AuthSettings,
    pub log_format: LogFormat,
    pub seed_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwks_url = get(AUTH_JWKS_URL_ENV).ok_or(ConfigError::Missing(AUTH_JWKS_URL_ENV))?;
        let jwks_url = Url::parse(&jwks_url).map_err(|e| ConfigError::Invalid {
            var: AUTH_JWKS_URL_ENV,
            reason: e.to_string(),
        })?;

        let timeout = Duration::from_millis(positive(
            AUTH_TIMEOUT_MS_ENV,
            parse_or(&get, AUTH_TIMEOUT_MS_ENV, DEFAULT_AUTH_TIMEOUT_MS)?,
        )?);

        let auth = AuthSettings {
            jwks_url,
            issuer: get(AUTH_ISSUER_ENV).ok_or(ConfigError::Missing(AUTH_ISSUER_ENV))?,
            audience: get(AUTH_AUDIENCE_ENV),
            leeway: Duration::from_secs(parse_or(&get, AUTH_LEEWAY_SECS_ENV, DEFAULT_LEEWAY_SECS)?),
            jwks_cache_ttl: Duration::from_secs(parse_or(
                &get,
                AUTH_JWKS_CACHE_TTL_SECS_ENV,
                DEFAULT_JWKS_CACHE_TTL_SECS,
            )?),
            jwks_refresh_interval: Duration::from_secs(positive(
                AUTH_JWKS_REFRESH_SECS_ENV,
                parse_or(&get, AUTH_JWKS_REFRESH_SECS_ENV, DEFAULT_JWKS_REFRESH_SECS)?,
            )?),
            timeout,
            jwks_fetch_timeout: fetch_timeout(&get, timeout)?,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&get, PORT_ENV, DEFAULT_PORT)?,
            auth,
            log_format: parse_or(&get, LOG_FORMAT_ENV, LogFormat::default())?,
            seed_file: get(SEED_FILE_ENV).map(PathBuf::from),
        })
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: HOST_ENV,
                reason: e.to_string(),
            })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

/// A key set fetch must give up before the authentication deadline, so a
/// hanging provider still leaves time to answer from the stale cache.
fn fetch_timeout(
    get: &impl Fn(&str) -> Option<String>,
    deadline: Duration,
) -> Result<Duration, ConfigError> {
    match get(AUTH_JWKS_FETCH_TIMEOUT_MS_ENV) {
        None => {
            let default = Duration::from_millis(DEFAULT_JWKS_FETCH_TIMEOUT_MS);
            Ok(default.min(deadline / 2))
        }
        Some(_) => {
            let millis = positive(
                AUTH_JWKS_FETCH_TIMEOUT_MS_ENV,
                parse_or(get, AUTH_JWKS_FETCH_TIMEOUT_MS_ENV, DEFAULT_JWKS_FETCH_TIMEOUT_MS)?,
            )?;
            let timeout = Duration::from_millis(millis);
            if timeout >= deadline {
                return Err(ConfigError::Invalid {
                    var: AUTH_JWKS_FETCH_TIMEOUT_MS_ENV,
                    reason: format!("must be below {AUTH_TIMEOUT_MS_ENV}"),
                });
            }
            Ok(timeout)
        }
    }
}

fn positive(var: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
