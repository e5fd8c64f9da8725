//! Idempotent resumption of the standby recovery task. Duplicating a
//! multi-gigabyte database is a long asynchronous operation; a restart
//! of the supervisor must pick the task up where it stopped, not run
//! finished steps twice.

use pairguard::harness::{
    healthy_active_snapshot, healthy_standby_snapshot, MemoryEvents, RecordingRunner,
    ScriptedAgent,
};
use pairguard::{
    Action, AsyncTaskStatus, Config, EvalCtx, PairState, PodAnswer, ReconcileStatus, TaskPhase,
};
use uuid::Uuid;

fn run_standby_repair(
    status: &mut ReconcileStatus,
    runner: &mut RecordingRunner,
    agent: &mut ScriptedAgent,
) -> PodAnswer {
    let cfg = Config::default();
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    let (name, flow) = pairguard::select_flow(&cfg, status, 1).expect("flow selected");
    assert_eq!(name, "standby_down_standby");
    let mut events = MemoryEvents::new();
    let mut ctx = EvalCtx {
        pod: 1,
        snaps: &snaps,
        status,
        runner,
        agent,
        events: &mut events,
        cfg: &cfg,
        now: 1_000,
    };
    flow(&mut ctx).answer
}

/// A status mid-recovery: the persisted task and the agent's async
/// record agree, the async task is finished and clean.
fn mid_recovery_status(destroy_done: bool, duplicate_done: bool) -> ReconcileStatus {
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::StandbyDown, 0);
    status.pods[0].set_state(PodAnswer::Healthy, 0);
    status.recovery.phase = TaskPhase::Pending;
    status.recovery.id = Some(Uuid::new_v4());
    status.recovery.async_id = Some("async-7".to_string());
    status.recovery.pod_name = "db-1".to_string();
    status.recovery.destroy_db = destroy_done;
    status.recovery.rep_duplicate = duplicate_done;
    status.recovery.start_rep_agent = false;
    status.async_cursor.id = Some("async-7".to_string());
    status.async_cursor.host = "db-1".to_string();
    status.async_cursor.pod_name = "db-1".to_string();
    status
}

fn agreeing_agent() -> ScriptedAgent {
    let mut agent = ScriptedAgent::new();
    agent.async_status = Some(AsyncTaskStatus {
        id: "async-7".to_string(),
        running: false,
        errno: None,
    });
    agent
}

#[test]
fn finished_steps_are_not_reissued() {
    let mut status = mid_recovery_status(true, true);
    let mut runner = RecordingRunner::new();
    let mut agent = agreeing_agent();

    let answer = run_standby_repair(&mut status, &mut runner, &mut agent);

    assert_eq!(runner.count(Action::DestroyDb), 0);
    assert_eq!(runner.count(Action::RepDuplicate), 0);
    assert_eq!(runner.count(Action::StartRepAgent), 1);
    assert_eq!(answer, PodAnswer::Healthy);
    assert_eq!(status.recovery.phase, TaskPhase::Complete);
    assert!(status.recovery.start_rep_agent);
}

#[test]
fn resumption_restarts_after_the_last_finished_step() {
    let mut status = mid_recovery_status(true, false);
    let mut runner = RecordingRunner::new();
    let mut agent = agreeing_agent();

    run_standby_repair(&mut status, &mut runner, &mut agent);

    assert_eq!(runner.count(Action::DestroyDb), 0, "destroy already done");
    assert_eq!(runner.count(Action::RepDuplicate), 1);
    assert_eq!(runner.count(Action::StartRepAgent), 1);
}

#[test]
fn a_different_pod_gets_a_fresh_task() {
    // The async record points at a pod that no longer exists; the
    // recovery must start over from the top.
    let mut status = mid_recovery_status(true, true);
    status.async_cursor.pod_name = "db-1-old".to_string();
    let mut runner = RecordingRunner::new();
    let mut agent = agreeing_agent();

    run_standby_repair(&mut status, &mut runner, &mut agent);

    assert_eq!(runner.count(Action::DestroyDb), 1);
    assert_eq!(runner.count(Action::RepDuplicate), 1);
    assert_eq!(runner.count(Action::StartRepAgent), 1);
}

#[test]
fn a_still_running_async_task_is_not_resumed() {
    let mut status = mid_recovery_status(true, true);
    let mut runner = RecordingRunner::new();
    let mut agent = agreeing_agent();
    agent.async_status = Some(AsyncTaskStatus {
        id: "async-7".to_string(),
        running: true,
        errno: None,
    });

    run_standby_repair(&mut status, &mut runner, &mut agent);

    // Not resumable, so a fresh task begins with a fresh destroy.
    assert_eq!(runner.count(Action::DestroyDb), 1);
}

#[test]
fn duplicate_failure_abandons_the_task_and_counts() {
    let mut status = mid_recovery_status(false, false);
    let mut runner = RecordingRunner::new().fail_on(Action::RepDuplicate);
    let mut agent = agreeing_agent();

    let answer = run_standby_repair(&mut status, &mut runner, &mut agent);

    assert_eq!(answer, PodAnswer::Down);
    assert_eq!(status.rep_start_fail_count, 1);
    assert_eq!(status.recovery.phase, TaskPhase::Complete);
    assert_eq!(runner.count(Action::StartRepAgent), 0, "stops at the failure");
}
