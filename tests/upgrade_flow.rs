//! Rolling upgrade sequencing: initiation gates, per-leg progress,
//! the replication verification probe, and the down-pod timeout.

use pairguard::harness::{
    healthy_active_snapshot, healthy_standby_snapshot, MemoryEvents, RecordingOrchestrator,
    RecordingRunner, ScriptedAgent,
};
use pairguard::upgrade::{check_standby_leg, init_upgrade};
use pairguard::{
    Config, PairState, PodAnswer, ReconcileStatus, Supervisor, TaskStatus, UpgradeLeg,
    UpgradeOutcome, UpgradePhase, UpgradeTable,
};

fn normal_pair() -> ReconcileStatus {
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::Normal, 0);
    status.pods[0].set_state(PodAnswer::Healthy, 0);
    status.pods[1].set_state(PodAnswer::Healthy, 0);
    status
}

#[test]
fn standby_leg_initiation_deletes_the_standby_and_stamps_statuses() {
    let mut status = normal_pair();
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    let table = UpgradeTable::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    init_upgrade(
        UpgradeLeg::Standby,
        &mut status,
        &snaps,
        &Config::default(),
        &table,
        &mut orch,
        &mut events,
        1_000,
    )
    .expect("initiation");

    assert_eq!(orch.deleted, vec!["db-1".to_string()]);
    assert_eq!(status.upgrade.phase, Some(UpgradePhase::UpgradingStandby));
    assert_eq!(status.upgrade.active_status, Some(TaskStatus::Waiting));
    assert_eq!(status.upgrade.standby_status, Some(TaskStatus::DeleteStandby));
    assert_eq!(status.upgrade.upgrade_start_time, 1_000);
}

#[test]
fn initiation_refuses_a_pair_that_is_not_normal() {
    let mut status = normal_pair();
    status.set_pair_state(PairState::StandbyDown, 0);
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    let table = UpgradeTable::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let err = init_upgrade(
        UpgradeLeg::Standby,
        &mut status,
        &snaps,
        &Config::default(),
        &table,
        &mut orch,
        &mut events,
        1_000,
    );
    assert!(err.is_err());
    assert!(orch.deleted.is_empty());
    assert!(events.contains("Cannot initiate the upgrade"));
}

#[test]
fn initiation_refuses_mismatched_releases() {
    let mut status = normal_pair();
    let mut old_standby = healthy_standby_snapshot();
    old_standby.release = "22.1.1.0.0".to_string();
    let snaps = vec![healthy_active_snapshot(), old_standby];
    let table = UpgradeTable::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let err = init_upgrade(
        UpgradeLeg::Standby,
        &mut status,
        &snaps,
        &Config::default(),
        &table,
        &mut orch,
        &mut events,
        1_000,
    );
    assert!(err.is_err());
    assert!(orch.deleted.is_empty());
}

#[test]
fn failed_delete_latches_the_retry_flag() {
    let mut status = normal_pair();
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    let table = UpgradeTable::new();
    let mut orch = RecordingOrchestrator {
        fail: true,
        ..RecordingOrchestrator::default()
    };
    let mut events = MemoryEvents::new();

    let err = init_upgrade(
        UpgradeLeg::Standby,
        &mut status,
        &snaps,
        &Config::default(),
        &table,
        &mut orch,
        &mut events,
        1_000,
    );
    assert!(err.is_err());
    assert!(status.upgrade.image_update_pending);
}

#[test]
fn standby_success_while_active_waits_advances_to_the_active_leg() {
    // The table cell the whole sequencing pivots on.
    let table = UpgradeTable::new();
    assert_eq!(
        table.next(
            UpgradePhase::UpgradingStandby,
            TaskStatus::Waiting,
            TaskStatus::Success
        ),
        UpgradeOutcome::Phase(UpgradePhase::UpgradingActive)
    );
}

#[test]
fn return_to_normal_runs_the_replication_probe_before_success() {
    let mut status = normal_pair();
    status.set_pair_state(PairState::StandbyDown, 0);
    status.upgrade.phase = Some(UpgradePhase::UpgradingStandby);
    status.upgrade.active_status = Some(TaskStatus::Waiting);
    status.upgrade.standby_status = Some(TaskStatus::Processing);
    status.upgrade.standby_start_time = 500;
    status.upgrade.last_phase_switch = 500;

    let table = UpgradeTable::new();
    let mut agent = ScriptedAgent::new();
    let mut events = MemoryEvents::new();

    let outcome = check_standby_leg(
        &mut status,
        &Config::default(),
        &table,
        &mut agent,
        &mut events,
        PairState::Normal,
        600,
    );

    assert_eq!(agent.verifications, 1);
    assert_eq!(status.upgrade.standby_status, Some(TaskStatus::Success));
    assert_eq!(outcome, UpgradeOutcome::Phase(UpgradePhase::UpgradingActive));
}

#[test]
fn failed_probe_routes_to_manual_intervention() {
    let mut status = normal_pair();
    status.set_pair_state(PairState::StandbyCatchup, 0);
    status.upgrade.phase = Some(UpgradePhase::UpgradingStandby);
    status.upgrade.active_status = Some(TaskStatus::Waiting);
    status.upgrade.standby_status = Some(TaskStatus::Processing);
    status.upgrade.last_phase_switch = 500;

    let table = UpgradeTable::new();
    let mut agent = ScriptedAgent::new();
    agent.verify_ok = false;
    let mut events = MemoryEvents::new();

    let outcome = check_standby_leg(
        &mut status,
        &Config::default(),
        &table,
        &mut agent,
        &mut events,
        PairState::Normal,
        600,
    );

    assert_eq!(outcome, UpgradeOutcome::ManualIntervention);
    assert_eq!(status.upgrade.standby_status, Some(TaskStatus::Failed));
    assert_eq!(status.upgrade.fail_count, 1);
}

#[test]
fn a_pod_down_past_the_window_fails_its_leg() {
    let mut status = normal_pair();
    status.set_pair_state(PairState::StandbyDown, 0);
    status.pods[1].set_state(PodAnswer::Down, 0);
    status.upgrade.phase = Some(UpgradePhase::UpgradingStandby);
    status.upgrade.active_status = Some(TaskStatus::Waiting);
    status.upgrade.standby_status = Some(TaskStatus::Processing);
    status.upgrade.last_phase_switch = 1_000;

    let table = UpgradeTable::new();
    let mut agent = ScriptedAgent::new();
    let mut events = MemoryEvents::new();

    // Inside the window: nothing forced.
    let outcome = check_standby_leg(
        &mut status,
        &Config::default(),
        &table,
        &mut agent,
        &mut events,
        PairState::StandbyDown,
        1_000 + 600,
    );
    assert_ne!(outcome, UpgradeOutcome::ManualIntervention);
    assert_eq!(status.upgrade.standby_status, Some(TaskStatus::Processing));

    // One past the window: the leg is failed.
    let outcome = check_standby_leg(
        &mut status,
        &Config::default(),
        &table,
        &mut agent,
        &mut events,
        PairState::StandbyDown,
        1_000 + 601,
    );
    assert_eq!(outcome, UpgradeOutcome::ManualIntervention);
    assert_eq!(status.upgrade.standby_status, Some(TaskStatus::Failed));
}

#[test]
fn a_zero_window_disables_the_timeout() {
    let mut status = normal_pair();
    status.set_pair_state(PairState::StandbyDown, 0);
    status.pods[1].set_state(PodAnswer::Down, 0);
    status.upgrade.phase = Some(UpgradePhase::UpgradingStandby);
    status.upgrade.active_status = Some(TaskStatus::Waiting);
    status.upgrade.standby_status = Some(TaskStatus::Processing);
    status.upgrade.last_phase_switch = 1_000;

    let cfg = Config {
        upgrade_down_pod_timeout_secs: 0,
        ..Config::default()
    };
    let table = UpgradeTable::new();
    let mut agent = ScriptedAgent::new();
    let mut events = MemoryEvents::new();

    let outcome = check_standby_leg(
        &mut status,
        &cfg,
        &table,
        &mut agent,
        &mut events,
        PairState::StandbyDown,
        u64::MAX / 2,
    );
    assert_ne!(outcome, UpgradeOutcome::ManualIntervention);
}

#[test]
fn supervisor_starts_the_standby_leg_on_request() {
    let sup = Supervisor::new(Config::default());
    let mut status = normal_pair();
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    let report = sup
        .tick(
            &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, true, 2_000,
        )
        .unwrap();

    assert!(report.upgrade_initiated);
    assert_eq!(orch.deleted, vec!["db-1".to_string()]);
    assert_eq!(status.upgrade.phase, Some(UpgradePhase::UpgradingStandby));
}

#[test]
fn completion_resets_the_upgrade_status() {
    // Drive the active leg's last tick: the pair comes back to Normal
    // with both statuses success-bound.
    let sup = Supervisor::new(Config::default());
    let mut status = normal_pair();
    status.set_pair_state(PairState::StandbyDown, 0);
    status.pods[0].set_state(PodAnswer::Healthy, 0);
    status.pods[1].set_state(PodAnswer::CatchingUp, 0);
    status.upgrade.phase = Some(UpgradePhase::UpgradingActive);
    status.upgrade.active_status = Some(TaskStatus::Processing);
    status.upgrade.standby_status = Some(TaskStatus::Success);
    status.upgrade.upgrade_start_time = 100;
    status.upgrade.active_start_time = 150;
    status.upgrade.last_phase_switch = 150;

    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    // The standby rebuild consults the compatibility list mid-upgrade;
    // identical releases always pass.
    agent.local_list =
        Some(r#"{"schemaVersion":"1","version":"1","validUpgrades":[]}"#.to_string());
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    // Both sides report healthy; the pair table says Normal, the
    // probe passes, and the active leg closes out.
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    sup.tick(
        &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, false, 1_000,
    )
    .unwrap();

    assert_eq!(status.pair_state, PairState::Normal);
    assert!(!status.upgrade.in_progress());
    assert_eq!(status.upgrade.active_status, None);
    assert!(events.contains("Upgrade completed"));
    assert_eq!(agent.verifications, 1);
}
