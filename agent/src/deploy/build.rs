//! Build stage

use tracing::{info, warn};

use crate::deploy::command::CommandSpec;
use crate::deploy::stage::{Stage, StageRecorder, StageResult};
use crate::deploy::StageContext;
use crate::errors::{DeployerError, ErrorKind};
use crate::registry::ApplicationSpec;

/// Run the configured build command inside the workspace. Output is passed
/// through verbatim; only the exit code decides success.
pub async fn build(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> Result<StageResult, DeployerError> {
    let mut recorder = StageRecorder::new(Stage::Build);

    let workspace_ready = ctx
        .fs
        .metadata(&spec.workspace_path)
        .await?
        .map(|m| m.is_dir)
        .unwrap_or(false);
    if !workspace_ready {
        return Ok(recorder.failure(
            ErrorKind::RepositoryError,
            format!(
                "workspace {} is missing, run checkout first",
                spec.workspace_path.display()
            ),
        ));
    }

    let Some(cmd) = CommandSpec::from_argv(&spec.build_command) else {
        return Ok(recorder.failure(ErrorKind::ConfigError, "build command is empty"));
    };
    let cmd = cmd
        .current_dir(&spec.workspace_path)
        .timeout(ctx.timeouts.build);

    info!(application = %spec.name, "Building with `{}`", cmd.display());
    let outcome = ctx.runner.run(&cmd).await?;
    if !recorder.record(&outcome) {
        warn!(
            application = %spec.name,
            exit_code = ?outcome.exit_code,
            timed_out = outcome.timed_out,
            "Build failed"
        );
        return Ok(recorder.command_failed(&cmd, &outcome, ErrorKind::ExecutionFailed));
    }

    info!(
        application = %spec.name,
        duration_ms = outcome.duration.as_millis() as u64,
        "Build succeeded"
    );
    Ok(recorder.success(None))
}
