//! Deployment workflow engine
//!
//! `Deployer` is the single entry point for every remote operation. It
//! resolves the application, takes the per-application lock for mutating
//! operations and dispatches to the stage modules.

pub mod artifact;
pub mod build;
pub mod command;
pub mod fsm;
pub mod git;
pub mod locks;
pub mod observe;
pub mod release;
pub mod service;
pub mod stage;
pub mod workflow;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::errors::DeployerError;
use crate::filesys::ops::{FileOps, LocalFs};
use crate::registry::{ApplicationSpec, ApplicationSummary, Registry};

use self::command::{CommandRunner, ProcessRunner, DEFAULT_OUTPUT_CAP};
use self::locks::{AppGuard, AppLocks};
use self::observe::{HealthSummary, RunningServices, ServiceLogs};
use self::release::BackupInfo;
use self::stage::{ServiceStatus, StageResult};
use self::workflow::{WorkflowExecutor, WorkflowReport};

/// Timeouts per command family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    pub git: Duration,
    pub build: Duration,
    pub service: Duration,
    pub query: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            git: Duration::from_secs(600),
            build: Duration::from_secs(1800),
            service: Duration::from_secs(120),
            query: Duration::from_secs(30),
        }
    }
}

/// Bounds for journal line requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLimits {
    pub default_lines: u32,
    pub min_lines: u32,
    pub max_lines: u32,
}

impl Default for LogLimits {
    fn default() -> Self {
        Self {
            default_lines: 100,
            min_lines: 1,
            max_lines: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployerOptions {
    pub timeouts: CommandTimeouts,
    pub log_limits: LogLimits,
    /// How long a mutating call waits for the application lock
    pub lock_wait: Duration,
    pub output_cap: usize,
}

impl Default for DeployerOptions {
    fn default() -> Self {
        Self {
            timeouts: CommandTimeouts::default(),
            log_limits: LogLimits::default(),
            lock_wait: Duration::from_secs(30),
            output_cap: DEFAULT_OUTPUT_CAP,
        }
    }
}

/// What every stage needs to touch the outside world
#[derive(Clone)]
pub struct StageContext {
    pub runner: Arc<dyn CommandRunner>,
    pub fs: Arc<dyn FileOps>,
    pub timeouts: CommandTimeouts,
}

/// Core facade
pub struct Deployer {
    registry: Arc<Registry>,
    ctx: StageContext,
    locks: AppLocks,
    options: DeployerOptions,
}

impl Deployer {
    pub fn new(
        registry: Arc<Registry>,
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileOps>,
        options: DeployerOptions,
    ) -> Self {
        Self {
            registry,
            ctx: StageContext {
                runner,
                fs,
                timeouts: options.timeouts,
            },
            locks: AppLocks::new(),
            options,
        }
    }

    /// Deployer backed by real processes and the local filesystem
    pub fn with_system(registry: Arc<Registry>, options: DeployerOptions) -> Self {
        let runner = Arc::new(ProcessRunner::new(options.output_cap));
        Self::new(registry, runner, Arc::new(LocalFs::new()), options)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &DeployerOptions {
        &self.options
    }

    /// Liveness of the core; the registry is an immutable snapshot so once
    /// constructed it is always reachable
    pub fn health(&self) -> &'static str {
        "healthy"
    }

    pub fn configuration(&self) -> Vec<ApplicationSummary> {
        self.registry.summaries()
    }

    async fn lock(&self, name: &str) -> Result<(&ApplicationSpec, AppGuard), DeployerError> {
        let spec = self.registry.get(name)?;
        let guard = self.locks.acquire(&spec.name, self.options.lock_wait).await?;
        Ok((spec, guard))
    }

    pub async fn checkout(&self, name: &str) -> Result<StageResult, DeployerError> {
        let (spec, _guard) = self.lock(name).await?;
        git::checkout(&self.ctx, spec).await
    }

    pub async fn build(&self, name: &str) -> Result<StageResult, DeployerError> {
        let (spec, _guard) = self.lock(name).await?;
        build::build(&self.ctx, spec).await
    }

    pub async fn verify_artifact(&self, name: &str) -> Result<StageResult, DeployerError> {
        let spec = self.registry.get(name)?;
        artifact::verify(&self.ctx, spec).await
    }

    pub async fn deploy(&self, name: &str) -> Result<StageResult, DeployerError> {
        let (spec, _guard) = self.lock(name).await?;
        release::deploy(&self.ctx, spec).await
    }

    pub async fn backups(&self, name: &str) -> Result<Vec<BackupInfo>, DeployerError> {
        let spec = self.registry.get(name)?;
        release::list_backups(self.ctx.fs.as_ref(), spec).await
    }

    pub async fn rollback(
        &self,
        name: &str,
        backup: Option<&str>,
    ) -> Result<StageResult, DeployerError> {
        let (spec, _guard) = self.lock(name).await?;
        release::rollback(&self.ctx, spec, backup).await
    }

    pub async fn restart(&self, name: &str) -> Result<StageResult, DeployerError> {
        let (spec, _guard) = self.lock(name).await?;
        service::restart(&self.ctx, spec).await
    }

    pub async fn stop(&self, name: &str) -> Result<StageResult, DeployerError> {
        let (spec, _guard) = self.lock(name).await?;
        service::stop(&self.ctx, spec).await
    }

    pub async fn status(&self, name: &str) -> Result<ServiceStatus, DeployerError> {
        let spec = self.registry.get(name)?;
        service::status(&self.ctx, spec).await
    }

    /// Journal tail; `lines` is clamped, never rejected
    pub async fn logs(&self, name: &str, lines: Option<u32>) -> Result<ServiceLogs, DeployerError> {
        let spec = self.registry.get(name)?;
        let lines = observe::clamp_lines(lines, &self.options.log_limits);
        observe::logs(&self.ctx, spec, lines).await
    }

    pub async fn running_services(&self) -> Result<RunningServices, DeployerError> {
        observe::running_services(&self.ctx).await
    }

    pub async fn health_summary(&self) -> Result<HealthSummary, DeployerError> {
        observe::health_summary(&self.ctx).await
    }

    /// Checkout, build, verify, deploy and restart under one lock
    pub async fn full_deploy(&self, name: &str) -> Result<WorkflowReport, DeployerError> {
        let (spec, _guard) = self.lock(name).await?;
        info!(application = %spec.name, "Full deployment requested");
        WorkflowExecutor::new(&self.ctx, spec).run().await
    }
}
