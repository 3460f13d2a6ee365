// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use std::collections::BTreeSet;

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Auth, AuthenticatedPrincipal, Role};

/// Response for GET /v1/me
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    /// Internal user id of the effective user
    pub id: Uuid,
    /// GitHub numeric user id
    pub github_user_id: i64,
    pub login: String,
    pub avatar_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub roles: BTreeSet<Role>,
    /// Whether an operator is acting as this user
    pub is_impersonating: bool,
    /// Login of the operator, when impersonating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impersonator_login: Option<String>,
    pub onboarding_accepted: bool,
    pub terms_accepted: bool,
}

impl From<&AuthenticatedPrincipal> for MeResponse {
    fn from(principal: &AuthenticatedPrincipal) -> Self {
        let user = principal.effective_user();
        Self {
            id: user.id,
            github_user_id: user.external_user_id,
            login: user.login.clone(),
            avatar_url: user.avatar_url.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            is_impersonating: principal.is_impersonating(),
            impersonator_login: principal.impersonator().map(|u| u.login.clone()),
            onboarding_accepted: user.onboarding_accepted,
            terms_accepted: user.terms_accepted,
        }
    }
}

/// Get the current authenticated user's information.
///
/// While impersonating, this is the impersonated user.
#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = MeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_me(Auth(principal): Auth) -> Json<MeResponse> {
    Json(MeResponse::from(principal.as_ref()))
}
