//! HTTP request handlers
//!
//! Handlers only translate between HTTP and `Deployer` calls. Stage failures
//! are 200 responses with `success: false`; faults become error envelopes.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{
    ApiResponse, ErrorResponse, HealthResponse, LogsQuery, LogsResponse, RollbackRequest,
    RootResponse, VersionResponse,
};
use tracing::{error, warn};

use crate::deploy::stage::StageResult;
use crate::errors::{DeployerError, ErrorKind};
use crate::server::state::ServerState;
use crate::utils::version_info;

const SERVICE_NAME: &str = "app-deployer";

type ApiResult<T> = Result<Json<ApiResponse<T>>, DeployerError>;

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidName => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound | ErrorKind::ServiceNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Busy => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for DeployerError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, Json(ErrorResponse::new(kind.as_str(), self.to_string()))).into_response()
    }
}

fn stage_response(result: StageResult) -> Json<ApiResponse<StageResult>> {
    Json(ApiResponse::new(result.success, result))
}

/// Root handler
pub async fn root_handler() -> impl IntoResponse {
    Json(RootResponse {
        service: SERVICE_NAME.to_string(),
        version: version_info().version,
        status: "running".to_string(),
    })
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: state.deployer.health().to_string(),
        service: SERVICE_NAME.to_string(),
        version: version_info().version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

pub async fn configuration_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.deployer.configuration()))
}

pub async fn checkout_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<StageResult> {
    Ok(stage_response(state.deployer.checkout(&name).await?))
}

pub async fn build_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<StageResult> {
    Ok(stage_response(state.deployer.build(&name).await?))
}

pub async fn verify_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<StageResult> {
    Ok(stage_response(state.deployer.verify_artifact(&name).await?))
}

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<StageResult> {
    Ok(stage_response(state.deployer.deploy(&name).await?))
}

pub async fn backups_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, DeployerError> {
    Ok(Json(ApiResponse::ok(state.deployer.backups(&name).await?)))
}

/// The body is optional; an empty body restores the newest backup
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RollbackRequest::default()
    } else {
        match serde_json::from_slice::<RollbackRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("BadRequest", format!("invalid body: {}", e))),
                )
                    .into_response()
            }
        }
    };

    match state
        .deployer
        .rollback(&name, request.backup.as_deref())
        .await
    {
        Ok(result) => stage_response(result).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn restart_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<StageResult> {
    Ok(stage_response(state.deployer.restart(&name).await?))
}

pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<StageResult> {
    Ok(stage_response(state.deployer.stop(&name).await?))
}

pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, DeployerError> {
    Ok(Json(ApiResponse::ok(state.deployer.status(&name).await?)))
}

pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogsResponse> {
    let lines = query.lines.map(|n| u32::try_from(n).unwrap_or(u32::MAX));
    let logs = state.deployer.logs(&name, lines).await?;
    Ok(Json(ApiResponse::ok(LogsResponse {
        service: logs.service,
        lines_requested: logs.lines_requested,
        lines_returned: logs.lines_returned,
        logs: logs.logs,
    })))
}

pub async fn services_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, DeployerError> {
    Ok(Json(ApiResponse::ok(state.deployer.running_services().await?)))
}

pub async fn server_health_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, DeployerError> {
    Ok(Json(ApiResponse::ok(state.deployer.health_summary().await?)))
}

pub async fn full_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, DeployerError> {
    let report = state.deployer.full_deploy(&name).await?;
    Ok(Json(ApiResponse::new(report.success, report)))
}
