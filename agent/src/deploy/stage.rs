//! Stage identifiers and results

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::deploy::command::{CommandOutcome, CommandSpec};
use crate::errors::{DeployerError, ErrorKind};

/// One step of the deployment pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Checkout,
    Build,
    Verify,
    Deploy,
    Restart,
    Stop,
    Status,
    Rollback,
}

impl Stage {
    /// Stages of the full-deploy pipeline that must succeed, in order
    pub const PIPELINE: [Stage; 5] = [
        Stage::Checkout,
        Stage::Build,
        Stage::Verify,
        Stage::Deploy,
        Stage::Restart,
    ];

    /// Next required pipeline stage, `None` after Restart
    pub fn next(&self) -> Option<Stage> {
        let idx = Self::PIPELINE.iter().position(|s| s == self)?;
        Self::PIPELINE.get(idx + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Checkout => "checkout",
            Stage::Build => "build",
            Stage::Verify => "verify",
            Stage::Deploy => "deploy",
            Stage::Restart => "restart",
            Stage::Stop => "stop",
            Stage::Status => "status",
            Stage::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service snapshot returned by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub active: bool,
    pub state: ServiceState,
    pub raw_output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Starting,
    Stopping,
    Stopped,
    Failed,
    Unknown,
}

/// Stage specific payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageDetails {
    Artifact {
        path: PathBuf,
        size_bytes: u64,
        sha256: String,
    },
    Release {
        deployed_to: PathBuf,
        backup: Option<PathBuf>,
        source: PathBuf,
    },
    Service(ServiceStatus),
}

/// Outcome of a single stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
    pub details: Option<StageDetails>,
}

impl StageResult {
    /// Failed result built from a fault raised while running `stage`
    pub fn from_error(stage: Stage, err: &DeployerError, duration: Duration) -> Self {
        Self {
            stage,
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: duration.as_millis() as u64,
            error: Some(err.kind()),
            message: Some(err.to_string()),
            details: None,
        }
    }
}

/// Accumulates command output for a stage that may run several commands
pub struct StageRecorder {
    stage: Stage,
    started: Instant,
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
}

impl StageRecorder {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            started: Instant::now(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        }
    }

    /// Append a command's output; returns whether it succeeded
    pub fn record(&mut self, outcome: &CommandOutcome) -> bool {
        push_text(&mut self.stdout, &outcome.stdout);
        push_text(&mut self.stderr, &outcome.stderr);
        self.exit_code = outcome.exit_code;
        outcome.success()
    }

    /// Fail the stage for a command that exited non-zero or timed out
    pub fn command_failed(
        self,
        cmd: &CommandSpec,
        outcome: &CommandOutcome,
        kind: ErrorKind,
    ) -> StageResult {
        if outcome.timed_out {
            let message = format!(
                "`{}` timed out after {:?}",
                cmd.display(),
                cmd.timeout
            );
            return self.failure(ErrorKind::Timeout, message);
        }
        let message = format!(
            "`{}` exited with code {}",
            cmd.display(),
            outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        self.failure(kind, message)
    }

    pub fn success(self, details: Option<StageDetails>) -> StageResult {
        self.finish(true, None, None, details)
    }

    pub fn failure(self, kind: ErrorKind, message: impl Into<String>) -> StageResult {
        self.finish(false, Some(kind), Some(message.into()), None)
    }

    pub fn failure_with(
        self,
        kind: ErrorKind,
        message: impl Into<String>,
        details: Option<StageDetails>,
    ) -> StageResult {
        self.finish(false, Some(kind), Some(message.into()), details)
    }

    fn finish(
        self,
        success: bool,
        error: Option<ErrorKind>,
        message: Option<String>,
        details: Option<StageDetails>,
    ) -> StageResult {
        StageResult {
            stage: self.stage,
            success,
            exit_code: self.exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
            duration_ms: self.started.elapsed().as_millis() as u64,
            error,
            message,
            details,
        }
    }
}

fn push_text(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(text);
}
