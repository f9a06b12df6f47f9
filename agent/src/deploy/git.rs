//! Repository stage: clone or fast-forward an application's workspace

use tracing::{info, warn};

use crate::deploy::command::CommandSpec;
use crate::deploy::stage::{Stage, StageRecorder, StageResult};
use crate::deploy::StageContext;
use crate::errors::{DeployerError, ErrorKind};
use crate::registry::ApplicationSpec;

/// Clone the repository if the workspace is absent, otherwise fetch and
/// fast-forward it. An existing path that is not a checkout of the expected
/// remote is reported as a failure and left untouched.
pub async fn checkout(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> Result<StageResult, DeployerError> {
    let mut recorder = StageRecorder::new(Stage::Checkout);
    let workspace = &spec.workspace_path;
    let timeout = ctx.timeouts.git;

    match ctx.fs.metadata(workspace).await? {
        None => {
            info!(
                application = %spec.name,
                "Cloning {} (branch: {}) to {}",
                spec.repo_url,
                spec.branch,
                workspace.display()
            );
            if let Some(parent) = workspace.parent() {
                ctx.fs.create_dir_all(parent).await?;
            }

            let clone = CommandSpec::new(
                "git",
                [
                    "clone".to_string(),
                    "--branch".to_string(),
                    spec.branch.clone(),
                    "--single-branch".to_string(),
                    "--".to_string(),
                    spec.repo_url.clone(),
                    workspace.to_string_lossy().into_owned(),
                ],
            )
            .timeout(timeout);

            let outcome = ctx.runner.run(&clone).await?;
            if !recorder.record(&outcome) {
                warn!(application = %spec.name, "Git clone failed");
                return Ok(recorder.command_failed(&clone, &outcome, ErrorKind::RepositoryError));
            }
        }
        Some(meta) if !meta.is_dir => {
            return Ok(recorder.failure(
                ErrorKind::RepositoryError,
                format!("{} exists but is not a directory", workspace.display()),
            ));
        }
        Some(_) => {
            if let Err(reason) = verify_checkout(ctx, spec).await? {
                warn!(application = %spec.name, "Refusing to update workspace: {}", reason);
                return Ok(recorder.failure(ErrorKind::RepositoryError, reason));
            }

            info!(
                application = %spec.name,
                "Updating {} to latest {}",
                workspace.display(),
                spec.branch
            );
            let steps = [
                vec!["fetch", "origin", spec.branch.as_str()],
                vec!["checkout", spec.branch.as_str()],
                vec!["merge", "--ff-only", "FETCH_HEAD"],
            ];
            for args in steps {
                let cmd = CommandSpec::new("git", args)
                    .current_dir(workspace)
                    .timeout(timeout);
                let outcome = ctx.runner.run(&cmd).await?;
                if !recorder.record(&outcome) {
                    warn!(application = %spec.name, "`{}` failed", cmd.display());
                    return Ok(recorder.command_failed(&cmd, &outcome, ErrorKind::RepositoryError));
                }
            }
        }
    }

    info!(application = %spec.name, "Successfully synced repository");
    Ok(recorder.success(None))
}

/// `Ok(Err(reason))` when the workspace is not a checkout of `spec.repo_url`
async fn verify_checkout(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> Result<Result<(), String>, DeployerError> {
    let workspace = &spec.workspace_path;
    let timeout = ctx.timeouts.query;

    let git_dir = CommandSpec::new("git", ["rev-parse", "--git-dir"])
        .current_dir(workspace)
        .timeout(timeout);
    let outcome = ctx.runner.run(&git_dir).await?;
    if !outcome.success() || outcome.stdout.trim() != ".git" {
        return Ok(Err(format!(
            "{} is not the root of a git checkout",
            workspace.display()
        )));
    }

    let remote = CommandSpec::new("git", ["remote", "get-url", "origin"])
        .current_dir(workspace)
        .timeout(timeout);
    let outcome = ctx.runner.run(&remote).await?;
    if !outcome.success() {
        return Ok(Err(format!(
            "{} has no 'origin' remote: {}",
            workspace.display(),
            outcome.stderr.trim()
        )));
    }

    let actual = outcome.stdout.trim();
    if normalize_remote(actual) != normalize_remote(&spec.repo_url) {
        return Ok(Err(format!(
            "{} tracks {} instead of the configured repository",
            workspace.display(),
            crate::utils::redact_url(actual)
        )));
    }
    Ok(Ok(()))
}

fn normalize_remote(url: &str) -> &str {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url)
}
