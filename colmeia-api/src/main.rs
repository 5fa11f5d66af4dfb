//! Colmeia API Server Entry Point
//!
//! Bootstraps configuration, connects both stores and the identity provider,
//! and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use colmeia_api::config::{AiConfig, ApiConfig};
use colmeia_api::jobs::{orphan_sweep_task, OrphanSweepConfig};
use colmeia_api::telemetry::{init_tracer, TelemetryConfig};
use colmeia_api::{
    create_api_router, validate_for_production, AiClient, ApiError, ApiResult, AppState,
    DbConfig, PgStore, SharedDocuments, SharedIdentity, SharedRelational,
};
use colmeia_firebase::{FirebaseApp, FirebaseConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    let telemetry = init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let firebase_config = FirebaseConfig::from_env();
    let ai_config = AiConfig::from_env();
    let db_config = DbConfig::from_env();

    if api_config.is_production() {
        validate_for_production(&api_config, &firebase_config, &ai_config)?;
    }

    let firebase = FirebaseApp::from_config(&firebase_config)?;
    tracing::info!(project_id = %firebase.project_id, "Firebase clients ready");

    let pg = PgStore::from_config(&db_config)?;
    pg.apply_migrations().await?;

    let relational: SharedRelational = Arc::new(pg);
    let documents: SharedDocuments = firebase.firestore.clone();
    let identity: SharedIdentity = firebase.auth.clone();

    let ai = AiClient::from_config(&ai_config)?;
    if ai.is_none() {
        tracing::warn!("AI_API_BASE_URL not set, AI routes will answer 503");
    }

    let state = AppState::new(relational.clone(), documents.clone(), identity, ai);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_config = OrphanSweepConfig::from_env();
    let sweep = if sweep_config.enabled {
        Some(tokio::spawn(orphan_sweep_task(
            relational,
            documents,
            sweep_config,
            shutdown_rx,
        )))
    } else {
        tracing::info!("Orphan sweep disabled");
        None
    };

    let app = create_api_router(state, &api_config);
    let addr = api_config.socket_addr()?;
    tracing::info!(%addr, environment = %api_config.environment, "Starting Colmeia API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweep {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Orphan sweep task did not stop cleanly");
        }
    }

    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
