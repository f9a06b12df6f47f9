//! Deployment stage: install a verified artifact with a mandatory backup
//!
//! The live file is always moved aside before it is overwritten. If the copy
//! fails the backup is moved back, so the live path never stays empty. When
//! that restore fails as well the result carries `DeployCorrupted`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::deploy::artifact;
use crate::deploy::stage::{Stage, StageDetails, StageRecorder, StageResult};
use crate::deploy::StageContext;
use crate::errors::{DeployerError, ErrorKind};
use crate::filesys::ops::FileOps;
use crate::registry::ApplicationSpec;

const BACKUP_SUFFIX: &str = ".bak";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// A backup file beside the live artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
}

fn live_file_name(deploy_path: &Path) -> Result<String, DeployerError> {
    deploy_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            DeployerError::ConfigError(format!(
                "deploy path {} has no file name",
                deploy_path.display()
            ))
        })
}

/// `<deploy_path>.<timestamp>.bak`
pub fn backup_path(deploy_path: &Path, at: DateTime<Utc>) -> Result<PathBuf, DeployerError> {
    let name = live_file_name(deploy_path)?;
    Ok(deploy_path.with_file_name(format!(
        "{}.{}{}",
        name,
        at.format(BACKUP_TIMESTAMP_FORMAT),
        BACKUP_SUFFIX
    )))
}

/// Timestamp of a backup file name belonging to `live_name`
pub fn parse_backup_name(live_name: &str, candidate: &str) -> Option<DateTime<Utc>> {
    let stamp = candidate
        .strip_prefix(live_name)?
        .strip_prefix('.')?
        .strip_suffix(BACKUP_SUFFIX)?;
    ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(stamp, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Backups of the application's live artifact, newest first
pub async fn list_backups(
    fs: &dyn FileOps,
    spec: &ApplicationSpec,
) -> Result<Vec<BackupInfo>, DeployerError> {
    let live_name = live_file_name(&spec.deploy_path)?;
    let Some(dir) = spec.deploy_path.parent() else {
        return Ok(Vec::new());
    };

    let mut backups: Vec<BackupInfo> = fs
        .list_files(dir)
        .await?
        .into_iter()
        .filter_map(|entry| {
            let name = entry.path.file_name()?.to_string_lossy().into_owned();
            let timestamp = parse_backup_name(&live_name, &name)?;
            Some(BackupInfo {
                name,
                path: entry.path,
                timestamp,
                size_bytes: entry.meta.size,
            })
        })
        .collect();

    backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.name.cmp(&a.name)));
    Ok(backups)
}

/// A fresh backup path, strictly later than every existing backup
async fn next_backup_path(
    fs: &dyn FileOps,
    spec: &ApplicationSpec,
) -> Result<PathBuf, DeployerError> {
    let step = chrono::Duration::microseconds(1);
    let mut at = Utc::now();
    if let Some(latest) = list_backups(fs, spec).await?.first() {
        if at <= latest.timestamp {
            at = latest.timestamp + step;
        }
    }
    loop {
        let candidate = backup_path(&spec.deploy_path, at)?;
        if !fs.exists(&candidate).await? {
            return Ok(candidate);
        }
        at += step;
    }
}

/// Deployment stage
pub async fn deploy(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> Result<StageResult, DeployerError> {
    let recorder = StageRecorder::new(Stage::Deploy);

    // A verification from an earlier call may be stale.
    let artifact = match artifact::inspect(ctx.fs.as_ref(), spec).await? {
        Ok(artifact) => artifact,
        Err(rejection) => {
            warn!(application = %spec.name, "Refusing to deploy: {}", rejection.message);
            return Ok(recorder.failure(rejection.kind, rejection.message));
        }
    };

    info!(
        application = %spec.name,
        "Deploying {} to {}",
        artifact.path.display(),
        spec.deploy_path.display()
    );
    install(ctx.fs.as_ref(), spec, recorder, &artifact.path).await
}

/// Restore a backup as the live artifact. The current live file is itself
/// backed up first; the restored backup stays on disk.
pub async fn rollback(
    ctx: &StageContext,
    spec: &ApplicationSpec,
    backup: Option<&str>,
) -> Result<StageResult, DeployerError> {
    let recorder = StageRecorder::new(Stage::Rollback);
    let backups = list_backups(ctx.fs.as_ref(), spec).await?;

    let chosen = match backup {
        Some(name) => backups.iter().find(|b| b.name == name),
        None => backups.first(),
    };
    let Some(chosen) = chosen.cloned() else {
        let message = match backup {
            Some(name) => format!("backup '{}' not found for {}", name, spec.name),
            None => format!("no backups found for {}", spec.name),
        };
        return Ok(recorder.failure(ErrorKind::ArtifactMissing, message));
    };

    info!(
        application = %spec.name,
        "Rolling back {} to {}",
        spec.deploy_path.display(),
        chosen.name
    );
    install(ctx.fs.as_ref(), spec, recorder, &chosen.path).await
}

async fn install(
    fs: &dyn FileOps,
    spec: &ApplicationSpec,
    recorder: StageRecorder,
    source: &Path,
) -> Result<StageResult, DeployerError> {
    let live = &spec.deploy_path;
    if let Some(parent) = live.parent() {
        fs.create_dir_all(parent).await?;
    }

    let backup = match fs.metadata(live).await? {
        Some(meta) if meta.is_dir => {
            return Ok(recorder.failure(
                ErrorKind::ExecutionFailed,
                format!("{} is a directory", live.display()),
            ));
        }
        Some(_) => {
            let backup = next_backup_path(fs, spec).await?;
            info!(application = %spec.name, "Backing up {} to {}", live.display(), backup.display());
            fs.rename(live, &backup).await?;
            Some(backup)
        }
        None => None,
    };

    if let Err(copy_err) = fs.copy(source, live).await {
        warn!(application = %spec.name, "Copy to {} failed: {}", live.display(), copy_err);
        let result = match &backup {
            Some(backup) => match fs.rename(backup, live).await {
                Ok(()) => recorder.failure(
                    ErrorKind::ExecutionFailed,
                    format!(
                        "copy failed: {}; previous artifact restored from {}",
                        copy_err,
                        backup.display()
                    ),
                ),
                Err(restore_err) => {
                    error!(
                        application = %spec.name,
                        "Restoring {} from {} failed, operator action required: {}",
                        live.display(),
                        backup.display(),
                        restore_err
                    );
                    recorder.failure(
                        ErrorKind::DeployCorrupted,
                        format!(
                            "copy failed: {}; restoring {} failed: {}",
                            copy_err,
                            backup.display(),
                            restore_err
                        ),
                    )
                }
            },
            None => {
                if let Err(e) = fs.remove_file(live).await {
                    warn!("Failed to remove partial file {}: {}", live.display(), e);
                }
                recorder.failure(ErrorKind::ExecutionFailed, format!("copy failed: {}", copy_err))
            }
        };
        return Ok(result);
    }

    let details = StageDetails::Release {
        deployed_to: live.clone(),
        backup: backup.clone(),
        source: source.to_path_buf(),
    };

    if let Some(link) = &spec.symlink {
        if let Err(e) = relink(fs, live, link).await {
            warn!(application = %spec.name, "Failed to update symlink {}: {}", link.display(), e);
            return Ok(recorder.failure_with(
                ErrorKind::ExecutionFailed,
                format!("artifact deployed but symlink {} not updated: {}", link.display(), e),
                Some(details),
            ));
        }
    }

    info!(application = %spec.name, "Artifact deployed to {}", live.display());
    Ok(recorder.success(Some(details)))
}

async fn relink(fs: &dyn FileOps, target: &Path, link: &Path) -> Result<(), DeployerError> {
    fs.remove_file(link).await?;
    fs.symlink(target, link).await
}
