//! Full-deploy workflow executor

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineState};
use crate::deploy::stage::{ServiceStatus, Stage, StageResult};
use crate::deploy::{artifact, build, git, release, service, StageContext};
use crate::errors::DeployerError;
use crate::registry::ApplicationSpec;

/// Outcome of one full-deploy run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub run_id: Uuid,
    pub application: String,
    pub stages: Vec<StageResult>,
    pub success: bool,
    pub failed_at: Option<Stage>,
    pub service_status: Option<ServiceStatus>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowReport {
    /// Result of `stage`, if it ran
    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

/// Runs checkout, build, verify, deploy and restart in order, stopping at the
/// first failure, then records a status snapshot. The caller holds the
/// application lock.
pub struct WorkflowExecutor<'a> {
    ctx: &'a StageContext,
    spec: &'a ApplicationSpec,
    fsm: PipelineFsm,
}

impl<'a> WorkflowExecutor<'a> {
    pub fn new(ctx: &'a StageContext, spec: &'a ApplicationSpec) -> Self {
        Self {
            ctx,
            spec,
            fsm: PipelineFsm::new(),
        }
    }

    /// Get the current pipeline state
    pub fn state(&self) -> PipelineState {
        self.fsm.state()
    }

    pub async fn run(mut self) -> Result<WorkflowReport, DeployerError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut stages = Vec::with_capacity(Stage::PIPELINE.len() + 1);

        info!(application = %self.spec.name, %run_id, "Starting full deployment");
        self.transition(PipelineEvent::Begin)?;

        while let Some(stage) = self.fsm.current_stage() {
            let result = self.run_stage(stage).await;
            let event = if result.success {
                info!(
                    application = %self.spec.name,
                    stage = %stage,
                    duration_ms = result.duration_ms,
                    "Stage succeeded"
                );
                PipelineEvent::StageSucceeded
            } else {
                warn!(
                    application = %self.spec.name,
                    stage = %stage,
                    exit_code = ?result.exit_code,
                    duration_ms = result.duration_ms,
                    "Stage failed: {}",
                    result.message.as_deref().unwrap_or("unknown error")
                );
                PipelineEvent::StageFailed(result.message.clone().unwrap_or_default())
            };
            stages.push(result);
            self.transition(event)?;
        }

        // Snapshot only; never affects the outcome.
        let (status_result, service_status) = service::status_stage(self.ctx, self.spec).await;
        stages.push(status_result);

        let failed_at = match self.fsm.state() {
            PipelineState::Failed(stage) => Some(stage),
            _ => None,
        };
        let success = self.fsm.state() == PipelineState::Completed;

        if success {
            info!(application = %self.spec.name, %run_id, "Full deployment completed");
        } else {
            warn!(
                application = %self.spec.name,
                %run_id,
                failed_at = ?failed_at,
                "Full deployment failed"
            );
        }

        Ok(WorkflowReport {
            run_id,
            application: self.spec.name.clone(),
            stages,
            success,
            failed_at,
            service_status,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn transition(&mut self, event: PipelineEvent) -> Result<(), DeployerError> {
        self.fsm.process(event).map_err(DeployerError::Internal)
    }

    async fn run_stage(&self, stage: Stage) -> StageResult {
        let started = Instant::now();
        let (ctx, spec) = (self.ctx, self.spec);
        let result = match stage {
            Stage::Checkout => git::checkout(ctx, spec).await,
            Stage::Build => build::build(ctx, spec).await,
            Stage::Verify => artifact::verify(ctx, spec).await,
            Stage::Deploy => release::deploy(ctx, spec).await,
            Stage::Restart => service::restart(ctx, spec).await,
            other => Err(DeployerError::Internal(format!(
                "{} is not a pipeline stage",
                other
            ))),
        };

        result.unwrap_or_else(|e| {
            error!(application = %spec.name, stage = %stage, "Stage fault: {}", e);
            StageResult::from_error(stage, &e, started.elapsed())
        })
    }
}
