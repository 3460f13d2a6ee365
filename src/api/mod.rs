// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{middleware, routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{self, Role},
    models::{LinkedRepo, Project, ProjectVisibility},
    state::AppState,
};

pub mod health;
pub mod projects;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/me", get(users::get_me))
        .route(
            "/projects/{project_id}",
            get(projects::get_project).patch(projects::update_project),
        )
        .route("/projects/slug/{slug}", get(projects::get_project_by_slug))
        .route(
            "/projects/{project_id}/repos/{repo_id}",
            get(projects::get_linked_repo),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::authenticate,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Registers the bearer token scheme referenced by `security(("bearer" = []))`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::get_me,
        projects::get_project,
        projects::get_project_by_slug,
        projects::update_project,
        projects::get_linked_repo
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            users::MeResponse,
            projects::UpdateProjectRequest,
            Project,
            ProjectVisibility,
            LinkedRepo,
            Role
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "Current user"),
        (name = "Projects", description = "Project reads and lead-only updates")
    )
)]
struct ApiDoc;
