//! Service control stage (systemd)

use std::collections::HashMap;

use tracing::{info, warn};

use crate::deploy::command::{CommandOutcome, CommandSpec};
use crate::deploy::stage::{
    ServiceState, ServiceStatus, Stage, StageDetails, StageRecorder, StageResult,
};
use crate::deploy::StageContext;
use crate::errors::{DeployerError, ErrorKind};
use crate::registry::ApplicationSpec;

/// systemctl exit status for an unknown unit
const EXIT_UNIT_NOT_FOUND: i32 = 5;

/// Restart the unit, waiting for systemd's job to complete
pub async fn restart(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> Result<StageResult, DeployerError> {
    control(ctx, spec, Stage::Restart, "restart").await
}

/// Stop the unit, waiting for systemd's job to complete
pub async fn stop(ctx: &StageContext, spec: &ApplicationSpec) -> Result<StageResult, DeployerError> {
    control(ctx, spec, Stage::Stop, "stop").await
}

async fn control(
    ctx: &StageContext,
    spec: &ApplicationSpec,
    stage: Stage,
    action: &str,
) -> Result<StageResult, DeployerError> {
    let mut recorder = StageRecorder::new(stage);
    let cmd = CommandSpec::new("systemctl", [action, spec.service_name.as_str()])
        .timeout(ctx.timeouts.service);

    info!(application = %spec.name, "Running systemctl {} {}", action, spec.service_name);
    let outcome = ctx.runner.run(&cmd).await?;
    if !recorder.record(&outcome) {
        let kind = if unit_missing(&outcome) {
            ErrorKind::ServiceNotFound
        } else {
            ErrorKind::ExecutionFailed
        };
        warn!(
            application = %spec.name,
            exit_code = ?outcome.exit_code,
            "systemctl {} {} failed",
            action,
            spec.service_name
        );
        return Ok(recorder.command_failed(&cmd, &outcome, kind));
    }

    info!(application = %spec.name, "Service {} {} completed", spec.service_name, action);
    Ok(recorder.success(None))
}

fn unit_missing(outcome: &CommandOutcome) -> bool {
    if outcome.timed_out {
        return false;
    }
    let stderr = outcome.stderr.to_lowercase();
    outcome.exit_code == Some(EXIT_UNIT_NOT_FOUND)
        || stderr.contains("not found")
        || stderr.contains("not loaded")
}

/// Fresh status query. A unit systemd does not know is `ServiceNotFound`,
/// a known but inactive unit is a normal status.
pub async fn status(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> Result<ServiceStatus, DeployerError> {
    let cmd = CommandSpec::new(
        "systemctl",
        [
            "show",
            spec.service_name.as_str(),
            "--no-pager",
            "--property=LoadState,ActiveState,SubState",
        ],
    )
    .timeout(ctx.timeouts.query);

    let outcome = ctx.runner.run(&cmd).await?;
    if outcome.timed_out {
        return Err(DeployerError::Timeout(format!(
            "status query for {} exceeded {:?}",
            spec.service_name,
            cmd.timeout
        )));
    }
    if !outcome.success() {
        if unit_missing(&outcome) {
            return Err(DeployerError::ServiceNotFound(spec.service_name.clone()));
        }
        return Err(DeployerError::ExecutionFailed(format!(
            "`{}` exited with code {:?}: {}",
            cmd.display(),
            outcome.exit_code,
            outcome.stderr.trim()
        )));
    }

    parse_show(&spec.service_name, &outcome.stdout)
}

/// Status query wrapped as a stage, used as the pipeline's final snapshot
pub async fn status_stage(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> (StageResult, Option<ServiceStatus>) {
    let recorder = StageRecorder::new(Stage::Status);
    match status(ctx, spec).await {
        Ok(status) => {
            let mut result = recorder.success(Some(StageDetails::Service(status.clone())));
            result.stdout = status.raw_output.clone();
            (result, Some(status))
        }
        Err(e) => {
            warn!(application = %spec.name, "Status query failed: {}", e);
            (recorder.failure(e.kind(), e.to_string()), None)
        }
    }
}

/// Parse `systemctl show --property=...` output
pub fn parse_show(service: &str, raw: &str) -> Result<ServiceStatus, DeployerError> {
    let props: HashMap<&str, &str> = raw
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    if props.get("LoadState").copied() == Some("not-found") {
        return Err(DeployerError::ServiceNotFound(service.to_string()));
    }

    let active_state = props.get("ActiveState").copied().unwrap_or("");
    let state = match active_state {
        "active" | "reloading" => ServiceState::Running,
        "activating" => ServiceState::Starting,
        "deactivating" => ServiceState::Stopping,
        "inactive" => ServiceState::Stopped,
        "failed" => ServiceState::Failed,
        _ => ServiceState::Unknown,
    };

    Ok(ServiceStatus {
        service: service.to_string(),
        active: matches!(active_state, "active" | "reloading"),
        state,
        raw_output: raw.to_string(),
    })
}
