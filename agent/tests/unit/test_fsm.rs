//! FSM unit tests

use app_deployer::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineState};
use app_deployer::deploy::stage::Stage;

#[test]
fn test_fsm_initial_state() {
    let fsm = PipelineFsm::new();
    assert_eq!(fsm.state(), PipelineState::Idle);
    assert!(fsm.error().is_none());
    assert!(fsm.current_stage().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Begin).unwrap();
    let mut visited = Vec::new();
    while let Some(stage) = fsm.current_stage() {
        visited.push(stage);
        fsm.process(PipelineEvent::StageSucceeded).unwrap();
    }

    assert_eq!(visited, Stage::PIPELINE.to_vec());
    assert_eq!(fsm.state(), PipelineState::Completed);
    assert!(fsm.is_terminal());
}

#[test]
fn test_fsm_failure_stops_pipeline() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Begin).unwrap();
    fsm.process(PipelineEvent::StageSucceeded).unwrap();
    fsm.process(PipelineEvent::StageFailed("make: *** [build] Error 2".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), PipelineState::Failed(Stage::Build));
    assert_eq!(fsm.error(), Some("make: *** [build] Error 2"));
    assert!(fsm.current_stage().is_none());
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = PipelineFsm::new();

    // Cannot report a stage result before starting
    assert!(fsm.process(PipelineEvent::StageSucceeded).is_err());
    assert!(fsm
        .process(PipelineEvent::StageFailed("x".to_string()))
        .is_err());

    fsm.process(PipelineEvent::Begin).unwrap();
    // Cannot start twice
    assert!(fsm.process(PipelineEvent::Begin).is_err());

    fsm.process(PipelineEvent::StageFailed("x".to_string()))
        .unwrap();
    // Terminal states accept nothing
    assert!(fsm.process(PipelineEvent::StageSucceeded).is_err());
    assert!(fsm.process(PipelineEvent::Begin).is_err());
    assert_eq!(fsm.state(), PipelineState::Failed(Stage::Checkout));
}

#[test]
fn test_fsm_state_serialization() {
    let json = serde_json::to_value(PipelineState::Failed(Stage::Verify)).unwrap();
    assert_eq!(json, serde_json::json!({"state": "failed", "stage": "verify"}));

    let json = serde_json::to_value(PipelineState::Idle).unwrap();
    assert_eq!(json, serde_json::json!({"state": "idle"}));
}
