//! Artifact verification stage

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::deploy::stage::{Stage, StageDetails, StageRecorder, StageResult};
use crate::deploy::StageContext;
use crate::errors::{DeployerError, ErrorKind};
use crate::filesys::ops::FileOps;
use crate::registry::ApplicationSpec;

/// A build output that passed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

impl From<VerifiedArtifact> for StageDetails {
    fn from(artifact: VerifiedArtifact) -> Self {
        StageDetails::Artifact {
            path: artifact.path,
            size_bytes: artifact.size_bytes,
            sha256: artifact.sha256,
        }
    }
}

/// Why an artifact was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: ErrorKind,
    pub message: String,
}

impl Rejection {
    fn new(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

fn has_glob(name: &str) -> bool {
    name.contains(['*', '?', '['])
}

/// Resolve the artifact path. A glob in the final component selects the most
/// recently modified match.
pub async fn resolve(
    fs: &dyn FileOps,
    spec: &ApplicationSpec,
) -> Result<Option<PathBuf>, DeployerError> {
    let location = spec.artifact_location();
    let file_name = match location.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return Ok(None),
    };

    if !has_glob(&file_name) {
        return Ok(fs.exists(&location).await?.then_some(location));
    }

    let pattern = glob::Pattern::new(&file_name)
        .map_err(|e| DeployerError::ConfigError(format!("{}: {}", spec.name, e)))?;
    let parent = location.parent().unwrap_or_else(|| Path::new("."));

    let mut matches: Vec<_> = fs
        .list_files(parent)
        .await?
        .into_iter()
        .filter(|entry| {
            entry
                .path
                .file_name()
                .map(|n| pattern.matches(&n.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();

    matches.sort_by(|a, b| {
        b.meta
            .modified
            .cmp(&a.meta.modified)
            .then_with(|| b.path.cmp(&a.path))
    });
    if matches.len() > 1 {
        info!(
            application = %spec.name,
            "{} artifacts match {}, using the newest",
            matches.len(),
            file_name
        );
    }
    Ok(matches.into_iter().next().map(|entry| entry.path))
}

/// Check existence, size and (optionally) type of the artifact
pub async fn inspect(
    fs: &dyn FileOps,
    spec: &ApplicationSpec,
) -> Result<Result<VerifiedArtifact, Rejection>, DeployerError> {
    let location = spec.artifact_location();
    let Some(path) = resolve(fs, spec).await? else {
        return Ok(Err(Rejection::new(
            ErrorKind::ArtifactMissing,
            format!("no artifact at {}", location.display()),
        )));
    };

    let meta = match fs.metadata(&path).await? {
        Some(meta) if !meta.is_dir => meta,
        _ => {
            return Ok(Err(Rejection::new(
                ErrorKind::ArtifactMissing,
                format!("{} is not a file", path.display()),
            )))
        }
    };
    if meta.size == 0 {
        return Ok(Err(Rejection::new(
            ErrorKind::ArtifactEmpty,
            format!("{} is empty", path.display()),
        )));
    }

    if let Some(magic) = spec.artifact_kind.magic() {
        let head = fs.read_head(&path, magic.len()).await?;
        if head != magic {
            return Ok(Err(Rejection::new(
                ErrorKind::ArtifactMismatch,
                format!(
                    "{} is not a {:?} artifact",
                    path.display(),
                    spec.artifact_kind
                ),
            )));
        }
    }

    let sha256 = fs.sha256(&path).await?;
    Ok(Ok(VerifiedArtifact {
        path,
        size_bytes: meta.size,
        sha256,
    }))
}

/// Verification stage
pub async fn verify(
    ctx: &StageContext,
    spec: &ApplicationSpec,
) -> Result<StageResult, DeployerError> {
    let recorder = StageRecorder::new(Stage::Verify);

    match inspect(ctx.fs.as_ref(), spec).await? {
        Ok(artifact) => {
            info!(
                application = %spec.name,
                size_bytes = artifact.size_bytes,
                "Verified artifact {}",
                artifact.path.display()
            );
            Ok(recorder.success(Some(artifact.into())))
        }
        Err(rejection) => {
            warn!(application = %spec.name, "Artifact rejected: {}", rejection.message);
            Ok(recorder.failure(rejection.kind, rejection.message))
        }
    }
}
