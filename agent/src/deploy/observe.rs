//! Read-only introspection: service logs, running units, host health

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::deploy::command::CommandSpec;
use crate::deploy::{LogLimits, StageContext};
use crate::errors::DeployerError;
use crate::registry::ApplicationSpec;
use crate::telemetry::{self, SystemMetrics};
use crate::utils::tail_lines;

/// Recent journal lines for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLogs {
    pub service: String,
    pub lines_requested: u32,
    pub lines_returned: usize,
    pub logs: String,
}

/// Units systemd reports as running
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningServices {
    pub services: Vec<String>,
    pub raw_output: String,
}

/// Host health snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub load_average: String,
    pub memory: String,
    pub disk: String,
    pub cpu: String,
    pub metrics: SystemMetrics,
}

/// Requested line count clamped into the configured bounds
pub fn clamp_lines(requested: Option<u32>, limits: &LogLimits) -> u32 {
    requested
        .unwrap_or(limits.default_lines)
        .clamp(limits.min_lines, limits.max_lines)
}

/// `journalctl -u <unit> -n <lines>`; `lines` must already be clamped
pub async fn logs(
    ctx: &StageContext,
    spec: &ApplicationSpec,
    lines: u32,
) -> Result<ServiceLogs, DeployerError> {
    let cmd = CommandSpec::new(
        "journalctl",
        [
            "-u".to_string(),
            spec.service_name.clone(),
            "-n".to_string(),
            lines.to_string(),
            "--no-pager".to_string(),
        ],
    )
    .timeout(ctx.timeouts.query);

    let stdout = query(ctx, &cmd).await?;
    let (logs, lines_returned) = tail_lines(&stdout, lines as usize);
    debug!(application = %spec.name, lines_returned, "Fetched service logs");

    Ok(ServiceLogs {
        service: spec.service_name.clone(),
        lines_requested: lines,
        lines_returned,
        logs,
    })
}

pub async fn running_services(ctx: &StageContext) -> Result<RunningServices, DeployerError> {
    let cmd = CommandSpec::new(
        "systemctl",
        [
            "list-units",
            "--type=service",
            "--state=running",
            "--no-pager",
            "--plain",
            "--no-legend",
        ],
    )
    .timeout(ctx.timeouts.query);

    let raw_output = query(ctx, &cmd).await?;
    Ok(RunningServices {
        services: parse_unit_list(&raw_output),
        raw_output,
    })
}

/// Unit names from `systemctl list-units --plain --no-legend` output
pub fn parse_unit_list(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|unit| unit.ends_with(".service"))
        .map(str::to_string)
        .collect()
}

pub async fn health_summary(ctx: &StageContext) -> Result<HealthSummary, DeployerError> {
    let timeout = ctx.timeouts.query;
    let host_cmd = |program: &str, args: &[&str]| {
        CommandSpec::new(program, args.iter().copied()).timeout(timeout)
    };

    let (load_average, memory, disk, cpu) = tokio::join!(
        best_effort(ctx, host_cmd("uptime", &[])),
        best_effort(ctx, host_cmd("free", &["-h"])),
        best_effort(ctx, host_cmd("df", &["-h"])),
        best_effort(ctx, host_cmd("vmstat", &["1", "2"])),
    );

    let metrics = tokio::task::spawn_blocking(telemetry::collect_metrics)
        .await
        .map_err(|e| DeployerError::Internal(format!("metrics collection failed: {}", e)))?;

    Ok(HealthSummary {
        load_average,
        memory,
        disk,
        cpu,
        metrics,
    })
}

async fn query(ctx: &StageContext, cmd: &CommandSpec) -> Result<String, DeployerError> {
    let outcome = ctx.runner.run(cmd).await?;
    if outcome.timed_out {
        return Err(DeployerError::Timeout(format!(
            "`{}` exceeded {:?}",
            cmd.display(),
            cmd.timeout
        )));
    }
    if !outcome.success() {
        return Err(DeployerError::ExecutionFailed(format!(
            "`{}` exited with code {:?}: {}",
            cmd.display(),
            outcome.exit_code,
            outcome.stderr.trim()
        )));
    }
    Ok(outcome.stdout)
}

async fn best_effort(ctx: &StageContext, cmd: CommandSpec) -> String {
    match query(ctx, &cmd).await {
        Ok(stdout) => stdout,
        Err(e) => {
            warn!("Health command failed: {}", e);
            format!("unavailable: {}", e)
        }
    }
}
