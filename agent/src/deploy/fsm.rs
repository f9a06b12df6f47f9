//! Finite State Machine for the full-deploy pipeline

use serde::{Deserialize, Serialize};

use crate::deploy::stage::Stage;

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum PipelineState {
    /// Not started
    Idle,

    /// A required stage is executing
    Running(Stage),

    /// Every required stage succeeded
    Completed,

    /// The given stage failed; later stages are skipped
    Failed(Stage),
}

/// Pipeline event
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Start the first stage
    Begin,

    /// The running stage succeeded
    StageSucceeded,

    /// The running stage failed
    StageFailed(String),
}

/// Pipeline FSM
#[derive(Debug, Clone)]
pub struct PipelineFsm {
    state: PipelineState,
    error: Option<String>,
}

impl PipelineFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Stage currently executing, if any
    pub fn current_stage(&self) -> Option<Stage> {
        match self.state {
            PipelineState::Running(stage) => Some(stage),
            _ => None,
        }
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Completed | PipelineState::Failed(_)
        )
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PipelineEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (PipelineState::Idle, PipelineEvent::Begin) => {
                PipelineState::Running(Stage::PIPELINE[0])
            }

            (PipelineState::Running(stage), PipelineEvent::StageSucceeded) => {
                match stage.next() {
                    Some(next) => PipelineState::Running(next),
                    None => PipelineState::Completed,
                }
            }
            (PipelineState::Running(stage), PipelineEvent::StageFailed(err)) => {
                self.error = Some(err.clone());
                PipelineState::Failed(*stage)
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for PipelineFsm {
    fn default() -> Self {
        Self::new()
    }
}
