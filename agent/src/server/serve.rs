//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DeployerError;
use crate::server::handlers::{
    backups_handler, build_handler, checkout_handler, configuration_handler, deploy_handler,
    full_deploy_handler, health_handler, logs_handler, restart_handler, rollback_handler,
    root_handler, server_health_handler, services_handler, status_handler, stop_handler,
    verify_handler, version_handler,
};
use crate::server::state::ServerState;

/// All routes with their shared state
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Service info
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/v1/configuration", get(configuration_handler))
        // Pipeline stages
        .route("/api/v1/repository/checkout/{name}", post(checkout_handler))
        .route("/api/v1/build/application/{name}", post(build_handler))
        .route("/api/v1/artifact/verify/{name}", post(verify_handler))
        .route("/api/v1/deployment/deploy/{name}", post(deploy_handler))
        .route("/api/v1/deployment/backups/{name}", get(backups_handler))
        .route("/api/v1/deployment/rollback/{name}", post(rollback_handler))
        .route(
            "/api/v1/deployment/workflow/full-deploy/{name}",
            post(full_deploy_handler),
        )
        // Service control
        .route("/api/v1/application/restart/{name}", post(restart_handler))
        .route("/api/v1/application/stop/{name}", post(stop_handler))
        .route("/api/v1/application/status/{name}", get(status_handler))
        .route("/api/v1/application/logs/{name}", get(logs_handler))
        // Host
        .route("/api/v1/server/services", get(services_handler))
        .route("/api/v1/server/health", get(server_health_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployerError>>, DeployerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
