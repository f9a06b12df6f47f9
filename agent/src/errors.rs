//! Error types for the deployer agent

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the deployer agent
///
/// Stage-level command failures never surface here: they are reported as
/// `StageResult` values. This type carries lookup failures, lock contention
/// and environment faults.
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Invalid application name: {0}")]
    InvalidName(String),

    #[error("Application busy: {0}")]
    Busy(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),

    #[error("Artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("Artifact empty: {0}")]
    ArtifactEmpty(String),

    #[error("Artifact type mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("Deployment corrupted, operator action required: {0}")]
    DeployCorrupted(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable error tag carried by stage results and API error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidName,
    Busy,
    Timeout,
    RepositoryError,
    ArtifactMissing,
    ArtifactEmpty,
    ArtifactMismatch,
    DeployCorrupted,
    ServiceNotFound,
    ExecutionFailed,
    ConfigError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidName => "InvalidName",
            ErrorKind::Busy => "Busy",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::RepositoryError => "RepositoryError",
            ErrorKind::ArtifactMissing => "ArtifactMissing",
            ErrorKind::ArtifactEmpty => "ArtifactEmpty",
            ErrorKind::ArtifactMismatch => "ArtifactMismatch",
            ErrorKind::DeployCorrupted => "DeployCorrupted",
            ErrorKind::ServiceNotFound => "ServiceNotFound",
            ErrorKind::ExecutionFailed => "ExecutionFailed",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DeployerError {
    /// Tag used when this error is rendered to a caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployerError::NotFound(_) => ErrorKind::NotFound,
            DeployerError::InvalidName(_) => ErrorKind::InvalidName,
            DeployerError::Busy(_) => ErrorKind::Busy,
            DeployerError::Timeout(_) => ErrorKind::Timeout,
            DeployerError::RepositoryError(_) => ErrorKind::RepositoryError,
            DeployerError::ArtifactMissing(_) => ErrorKind::ArtifactMissing,
            DeployerError::ArtifactEmpty(_) => ErrorKind::ArtifactEmpty,
            DeployerError::ArtifactMismatch(_) => ErrorKind::ArtifactMismatch,
            DeployerError::DeployCorrupted(_) => ErrorKind::DeployCorrupted,
            DeployerError::ServiceNotFound(_) => ErrorKind::ServiceNotFound,
            DeployerError::ExecutionFailed(_) | DeployerError::SpawnError(_) => {
                ErrorKind::ExecutionFailed
            }
            DeployerError::ConfigError(_) | DeployerError::JsonError(_) => ErrorKind::ConfigError,
            DeployerError::IoError(_)
            | DeployerError::ServerError(_)
            | DeployerError::ShutdownError(_)
            | DeployerError::Internal(_) => ErrorKind::Internal,
        }
    }
}
