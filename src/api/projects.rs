// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::OptionalAuth,
    error::ApiError,
    models::{LinkedRepo, Project},
    state::AppState,
};

pub const MAX_SHORT_DESCRIPTION_LEN: usize = 250;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    /// New short description (at most 250 characters)
    pub short_description: String,
}

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project details", body = Project),
        (status = 403, description = "Project is private and the caller has no access")
    )
)]
pub async fn get_project(
    OptionalAuth(ctx): OptionalAuth,
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.projects.get_by_id(&ctx, project_id).await?))
}

#[utoipa::path(
    get,
    path = "/v1/projects/slug/{slug}",
    tag = "Projects",
    params(
        ("slug" = String, Path, description = "Project slug")
    ),
    responses(
        (status = 200, description = "Project details", body = Project),
        (status = 403, description = "Project is private and the caller has no access")
    )
)]
pub async fn get_project_by_slug(
    OptionalAuth(ctx): OptionalAuth,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.projects.get_by_slug(&ctx, &slug).await?))
}

#[utoipa::path(
    patch,
    path = "/v1/projects/{project_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project ID")
    ),
    request_body = UpdateProjectRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated project", body = Project),
        (status = 400, description = "Invalid description"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a project lead")
    )
)]
pub async fn update_project(
    OptionalAuth(ctx): OptionalAuth,
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let description = request.short_description.trim();
    if description.chars().count() > MAX_SHORT_DESCRIPTION_LEN {
        return Err(ApiError::bad_request(format!(
            "Short description must be at most {MAX_SHORT_DESCRIPTION_LEN} characters"
        )));
    }

    let project = state
        .projects
        .update_description(&ctx, project_id, description)
        .await?;
    Ok(Json(project))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/repos/{repo_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project ID"),
        ("repo_id" = i64, Path, description = "GitHub repository ID")
    ),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Repository link", body = LinkedRepo),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not a project lead, or repository not linked")
    )
)]
pub async fn get_linked_repo(
    OptionalAuth(ctx): OptionalAuth,
    State(state): State<AppState>,
    Path((project_id, repo_id)): Path<(Uuid, i64)>,
) -> Result<Json<LinkedRepo>, ApiError> {
    Ok(Json(
        state
            .projects
            .get_linked_repo(&ctx, project_id, repo_id)
            .await?,
    ))
}
