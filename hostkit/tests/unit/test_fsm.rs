//! FSM unit tests

use hostkit::deploy::fsm::{DeployEvent, DeployFsm, DeployPhase};

fn advance_to_recording(fsm: &mut DeployFsm) {
    fsm.process(DeployEvent::Start).unwrap();
    fsm.process(DeployEvent::Admitted).unwrap();
    fsm.process(DeployEvent::Classified).unwrap();
    fsm.process(DeployEvent::Synced).unwrap();
}

#[test]
fn test_fsm_initial_state() {
    let fsm = DeployFsm::new();
    assert_eq!(fsm.phase(), DeployPhase::Pending);
    assert!(fsm.failed_in().is_none());
    assert!(!fsm.mutation_started());
}

#[test]
fn test_fsm_migration_flow() {
    let mut fsm = DeployFsm::new();
    advance_to_recording(&mut fsm);
    assert_eq!(fsm.phase(), DeployPhase::Recording);

    fsm.process(DeployEvent::Recorded { migrate: true }).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Migrating);

    fsm.process(DeployEvent::Migrated).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Completed);
    assert!(fsm.phase().is_terminal());
}

#[test]
fn test_fsm_sync_failure_counts_as_mutation() {
    let mut fsm = DeployFsm::new();
    fsm.process(DeployEvent::Start).unwrap();
    fsm.process(DeployEvent::Admitted).unwrap();
    fsm.process(DeployEvent::Classified).unwrap();
    fsm.process(DeployEvent::Fail).unwrap();

    assert_eq!(fsm.phase(), DeployPhase::Failed);
    assert_eq!(fsm.failed_in(), Some(DeployPhase::Syncing));
    assert!(fsm.mutation_started());
}

#[test]
fn test_fsm_migration_failure_counts_as_mutation() {
    let mut fsm = DeployFsm::new();
    advance_to_recording(&mut fsm);
    fsm.process(DeployEvent::Recorded { migrate: true }).unwrap();
    fsm.process(DeployEvent::Fail).unwrap();

    assert_eq!(fsm.failed_in(), Some(DeployPhase::Migrating));
    assert!(fsm.mutation_started());
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeployFsm::new();
    assert!(fsm.process(DeployEvent::Synced).is_err());
    assert_eq!(fsm.phase(), DeployPhase::Pending);
}

#[test]
fn test_fsm_terminal_states_reject_failures() {
    let mut fsm = DeployFsm::new();
    advance_to_recording(&mut fsm);
    fsm.process(DeployEvent::Recorded { migrate: false }).unwrap();
    assert!(fsm.process(DeployEvent::Fail).is_err());
    assert_eq!(fsm.phase(), DeployPhase::Completed);
}

#[test]
fn test_phase_serializes_lowercase() {
    let json = serde_json::to_string(&DeployPhase::Migrating).unwrap();
    assert_eq!(json, "\"migrating\"");
}
