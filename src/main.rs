// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use marketplace_gate::{
    api::router,
    auth::{Authenticator, JwksManager, TokenVerifier},
    config::{Config, LogFormat},
    identity::{IdentityResolver, LoggingUserObserver},
    logging,
    projects::ProjectService,
    state::AppState,
    storage::{InMemoryStore, Seed},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = logging::init(LogFormat::default());
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(config.log_format) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let auth = &config.auth;

    let jwks = JwksManager::new(auth.jwks_url.as_str(), auth.jwks_fetch_timeout)?
        .with_cache_ttl(auth.jwks_cache_ttl);
    let mut verifier =
        TokenVerifier::new(jwks.clone(), auth.issuer.clone()).with_leeway(auth.leeway);
    if let Some(audience) = &auth.audience {
        verifier = verifier.with_audience(audience.clone());
    }

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &config.seed_file {
        let summary = Seed::from_file(path)?.apply(&store).await?;
        tracing::info!(
            path = %path.display(),
            users = summary.users,
            projects = summary.projects,
            "Seed data loaded"
        );
    }
    let resolver = IdentityResolver::new(store.clone(), Arc::new(LoggingUserObserver));
    let authenticator = Authenticator::new(verifier, resolver).with_deadline(auth.timeout);
    let state = AppState::new(authenticator, ProjectService::new(store));

    let shutdown = CancellationToken::new();
    let refresh_task = jwks.spawn_refresh_task(auth.jwks_refresh_interval, shutdown.clone());

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        jwks_url = %auth.jwks_url,
        issuer = %auth.issuer,
        "Marketplace gate listening (docs at /docs)"
    );

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    if let Err(e) = refresh_task.await {
        tracing::warn!(error = %e, "Key set refresh task ended abnormally");
    }
    served?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
