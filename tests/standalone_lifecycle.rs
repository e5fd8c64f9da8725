//! Standalone (non-replicated) member lifecycle: first boot, steady
//! state, repair after a crash, and reexamine after a failed upgrade.

use pairguard::harness::{
    dead_snapshot, healthy_standalone_snapshot, MemoryEvents, RecordingOrchestrator,
    RecordingRunner, ScriptedAgent,
};
use pairguard::{
    Action, Config, DbState, EvalCtx, PodAnswer, PodSnapshot, ReconcileStatus, ReplicaReadiness,
    Supervisor,
};

fn run_flow(
    status: &mut ReconcileStatus,
    snap: PodSnapshot,
    runner: &mut RecordingRunner,
) -> PodAnswer {
    let cfg = Config::standalone();
    let snaps = vec![snap];
    let (_, flow) = pairguard::select_flow(&cfg, status, 0).expect("flow");
    let mut agent = ScriptedAgent::new();
    let mut events = MemoryEvents::new();
    let mut ctx = EvalCtx {
        pod: 0,
        snaps: &snaps,
        status,
        runner: &mut *runner,
        agent: &mut agent,
        events: &mut events,
        cfg: &cfg,
        now: 500,
    };
    flow(&mut ctx).answer
}

#[test]
fn first_boot_creates_and_opens_the_database() {
    let mut status = ReconcileStatus::new_standalone("solo", 1);
    let mut runner = RecordingRunner::new();

    let mut snap = healthy_standalone_snapshot();
    snap.db = DbState::None;
    snap.db_open = false;

    let answer = run_flow(&mut status, snap, &mut runner);
    assert_eq!(answer, PodAnswer::Normal);
    assert_eq!(runner.count(Action::CreateDb), 1);
    assert_eq!(runner.count(Action::OpenDb), 1);
}

#[test]
fn failed_create_is_terminal() {
    let mut status = ReconcileStatus::new_standalone("solo", 1);
    let mut runner = RecordingRunner::new().fail_on(Action::CreateDb);

    let mut snap = healthy_standalone_snapshot();
    snap.db = DbState::None;
    snap.db_open = false;

    let answer = run_flow(&mut status, snap, &mut runner);
    assert_eq!(answer, PodAnswer::Terminal);
    assert_eq!(runner.count(Action::OpenDb), 0);
}

#[test]
fn down_member_reloads_an_unloaded_database() {
    let mut status = ReconcileStatus::new_standalone("solo", 1);
    status.pods[0].set_state(PodAnswer::Down, 0);
    status.pods[0].last_time_reachable = 490;
    let mut runner = RecordingRunner::new();

    let mut snap = healthy_standalone_snapshot();
    snap.db = DbState::Unloaded;
    snap.db_open = false;

    let answer = run_flow(&mut status, snap, &mut runner);
    assert_eq!(answer, PodAnswer::Normal);
    assert_eq!(runner.count(Action::LoadDb), 1);
    assert_eq!(runner.count(Action::OpenDb), 1);
}

#[test]
fn vanished_database_is_terminal() {
    let mut status = ReconcileStatus::new_standalone("solo", 1);
    status.pods[0].set_state(PodAnswer::Down, 0);
    let mut runner = RecordingRunner::new();

    let mut snap = healthy_standalone_snapshot();
    snap.db = DbState::None;

    let answer = run_flow(&mut status, snap, &mut runner);
    assert_eq!(answer, PodAnswer::Terminal);
    assert!(runner.calls.is_empty());
}

#[test]
fn failed_upgrade_marker_requires_an_operator() {
    let mut status = ReconcileStatus::new_standalone("solo", 1);
    status.pods[0].set_state(PodAnswer::Down, 0);
    let mut runner = RecordingRunner::new();

    let mut snap = healthy_standalone_snapshot();
    snap.upgrade_failed_marker = true;

    let answer = run_flow(&mut status, snap, &mut runner);
    assert_eq!(answer, PodAnswer::ManualInterventionRequired);
    assert!(runner.calls.is_empty());
}

#[test]
fn reexamine_clears_a_stale_upgrade_marker() {
    let mut status = ReconcileStatus::new_standalone("solo", 1);
    status.pods[0].set_state(PodAnswer::Reexamine, 0);
    let mut runner = RecordingRunner::new();

    // Image and installed release agree again; the marker is stale.
    let mut snap = healthy_standalone_snapshot();
    snap.upgrade_failed_marker = true;

    let answer = run_flow(&mut status, snap, &mut runner);
    assert_eq!(answer, PodAnswer::Normal);
    assert_eq!(runner.count(Action::RemoveUpgradeFailedMarker), 1);
}

#[test]
fn reexamine_keeps_a_real_release_mismatch_quarantined() {
    let mut status = ReconcileStatus::new_standalone("solo", 1);
    status.pods[0].set_state(PodAnswer::Reexamine, 0);
    let mut runner = RecordingRunner::new();

    let mut snap = healthy_standalone_snapshot();
    snap.upgrade_failed_marker = true;
    snap.image_release = "22.1.1.9.0".to_string();

    let answer = run_flow(&mut status, snap, &mut runner);
    assert_eq!(answer, PodAnswer::ManualInterventionRequired);
    assert_eq!(runner.count(Action::RemoveUpgradeFailedMarker), 0);
}

#[test]
fn supervisor_summarizes_replica_readiness() {
    let cfg = Config {
        replicas: 2,
        ..Config::standalone()
    };
    let sup = Supervisor::new(cfg);
    let mut status = ReconcileStatus::new_standalone("solo", 2);
    status.pods[0].set_state(PodAnswer::Normal, 0);
    status.pods[1].set_state(PodAnswer::Normal, 0);
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let snaps = vec![healthy_standalone_snapshot(), healthy_standalone_snapshot()];
    sup.tick(
        &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, false, 100,
    )
    .unwrap();
    assert_eq!(status.replica_readiness, ReplicaReadiness::AllReplicasReady);

    let snaps = vec![healthy_standalone_snapshot(), dead_snapshot()];
    sup.tick(
        &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, false, 200,
    )
    .unwrap();
    assert_eq!(status.replica_readiness, ReplicaReadiness::SomeReplicasReady);

    // A brief agent blip inside the timeout keeps the member Normal.
    let mut flaky = healthy_standalone_snapshot();
    flaky.agent_up = false;
    let snaps = vec![flaky, dead_snapshot()];
    sup.tick(
        &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, false, 210,
    )
    .unwrap();
    assert_eq!(status.pods[0].state, PodAnswer::Normal);
}
