// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Marketplace Gate - authentication, identity and authorization
//!
//! Turns identity provider bearer tokens into trusted internal identities,
//! lets designated operators act as another user, and answers per-project
//! permission questions before protected operations run.
//!
//! ## Modules
//!
//! - `auth` - Token verification, key set cache, impersonation, request context
//! - `identity` - Mapping external identities to internal users
//! - `permissions` - Project lead, access and repository checks
//! - `projects` - Protected project operations
//! - `storage` - Storage collaborator contracts and the in-memory adapter
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod models;
pub mod permissions;
pub mod projects;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;
