//! End-to-end pair lifecycle: initialization, active failure, automatic
//! failover, standby rebuild, and the composition special cases.

use pairguard::harness::{
    dead_snapshot, healthy_active_snapshot, healthy_standby_snapshot, MemoryEvents,
    RecordingOrchestrator, RecordingRunner, ScriptedAgent,
};
use pairguard::{
    Action, BothDownBehavior, Config, PairState, PodAnswer, PodSnapshot, ReconcileStatus,
    RepState, Role, Supervisor,
};

fn tick(
    sup: &Supervisor,
    status: &mut ReconcileStatus,
    snaps: &[PodSnapshot],
    runner: &mut RecordingRunner,
    agent: &mut ScriptedAgent,
    orch: &mut RecordingOrchestrator,
    events: &mut MemoryEvents,
    now: u64,
) {
    sup.tick(status, snaps, runner, agent, orch, events, false, now)
        .expect("tick");
}

#[test]
fn pair_initializes_then_fails_over_then_rebuilds() {
    let sup = Supervisor::new(Config::default());
    let mut status = ReconcileStatus::new_pair("db");
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    // Both members come up clean.
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 100);
    assert_eq!(status.pair_state, PairState::Normal);

    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 110);
    assert_eq!(status.pair_state, PairState::Normal);
    assert!(status.pods[0].ready && status.pods[1].ready);

    // The active's pod vanishes.
    let snaps = vec![dead_snapshot(), healthy_standby_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 120);
    assert_eq!(status.pair_state, PairState::ActiveDown);

    // The standby is promoted; the table commissions the failover and
    // the intended roles flip.
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 130);
    assert_eq!(status.pair_state, PairState::ActiveTakeover);
    assert_eq!(status.pods[0].intended, Role::Standby);
    assert_eq!(status.pods[1].intended, Role::Active);
    assert_eq!(runner.count(Action::RepStateSetActive), 1);

    // Takeover settles; the dead side becomes the standby to rebuild.
    let snaps = vec![dead_snapshot(), healthy_active_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 140);
    assert_eq!(status.pair_state, PairState::StandbyDown);
    assert_eq!(runner.count(Action::RepStateSave), 1);

    // The old active comes back empty and is rebuilt from its peer.
    let mut reborn = healthy_standby_snapshot();
    reborn.rep_state = RepState::Recovering;
    let snaps = vec![reborn, healthy_active_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 150);
    assert_eq!(status.pair_state, PairState::StandbyStarting);
    assert_eq!(runner.count(Action::DestroyDb), 1);
    assert_eq!(runner.count(Action::RepDuplicate), 1);
    assert_eq!(runner.count(Action::StartRepAgent), 1);

    // Replication reaches STANDBY; the pair is whole again.
    let snaps = vec![healthy_standby_snapshot(), healthy_active_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 160);
    assert_eq!(status.pair_state, PairState::Normal);
}

#[test]
fn peer_down_splits_by_which_side_died() {
    // The standby reports healthy while the active is gone.
    let sup = Supervisor::new(Config::default());
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::Normal, 0);
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let snaps = vec![dead_snapshot(), healthy_standby_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::ActiveDown);

    // The mirror case: healthy active, dead standby. The active takes
    // over alone on the way to a standby rebuild.
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::Normal, 0);
    let snaps = vec![healthy_active_snapshot(), dead_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::ActiveTakeover);
}

#[test]
fn terminal_standby_escalates_to_manual_intervention() {
    let sup = Supervisor::new(Config::default());
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::Normal, 0);
    status.pods[0].set_state(PodAnswer::Healthy, 0);
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    // A standby whose instance vanished answers Terminal; a healthy
    // active next to a terminal standby cannot be auto-repaired.
    let mut broken = healthy_standby_snapshot();
    broken.instance = pairguard::InstanceState::Missing;
    // Instance checks on the normal standby report Down rather than
    // Terminal, so force the terminal answer through a missing
    // instance during standby repair.
    status.set_pair_state(PairState::StandbyDown, 0);
    let snaps = vec![healthy_active_snapshot(), broken];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::ManualInterventionRequired);
}

#[test]
fn manual_intervention_holds_until_reexamine() {
    let sup = Supervisor::new(Config::default());
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::ManualInterventionRequired, 0);
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::ManualInterventionRequired);
    assert!(runner.calls.is_empty(), "no action while quarantined");

    sup.trigger_reexamine(&mut status, &mut events, 20);
    assert_eq!(status.pair_state, PairState::Reexamine);

    // Both sides classify cleanly; the pair returns to Normal.
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 30);
    assert_eq!(status.pair_state, PairState::Normal);
    assert_eq!(status.pods[0].intended, Role::Active);
    assert_eq!(status.pods[1].intended, Role::Standby);
}

#[test]
fn reexamine_promotes_a_lone_idle_database() {
    let sup = Supervisor::new(Config::default());
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::Reexamine, 0);
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    // Pod 0: loaded and open but idle, no scheme. Pod 1: gone.
    let mut idle = healthy_active_snapshot();
    idle.rep_scheme = pairguard::RepSchemeState::None;
    idle.rep_agent = pairguard::RepAgentState::NotRunning;
    idle.rep_state = RepState::Idle;
    let snaps = vec![idle, dead_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::ConfiguringActive);
    assert_eq!(status.pods[0].intended, Role::Active);
    assert_eq!(status.pods[1].intended, Role::Standby);
}

#[test]
fn both_down_bypasses_the_table() {
    // The table cell for (BothDown, Down, Unknown) says wait, but the
    // decision routine runs first; with manual behavior it escalates
    // regardless of the answers.
    let cfg = Config {
        both_down_behavior: BothDownBehavior::Manual,
        ..Config::default()
    };
    let sup = Supervisor::new(cfg);
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::BothDown, 0);
    status.pods[0].set_state(PodAnswer::Down, 0);
    status.pods[1].set_state(PodAnswer::Unknown, 0);
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let snaps = vec![dead_snapshot(), dead_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::ManualInterventionRequired);
}

#[test]
fn both_down_best_ranking_waits_for_the_surviving_writer() {
    let sup = Supervisor::new(Config::default());
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::BothDown, 0);
    status.pods[0].set_state(PodAnswer::Down, 0);
    status.pods[1].set_state(PodAnswer::Down, 0);
    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    // Asynchronous replication: the active is always ahead.
    let snaps = vec![dead_snapshot(), dead_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::WaitingForActive);
    assert_eq!(status.pods[0].intended, Role::Active);
    assert_eq!(status.pods[1].intended, Role::Standby);
}

#[test]
fn authorization_failure_fails_the_pair() {
    let sup = Supervisor::new(Config::default());
    let mut status = ReconcileStatus::new_pair("db");
    status.set_pair_state(PairState::ActiveDown, 0);
    let mut runner = RecordingRunner::new().unauthorized_on(Action::RepStateSetActive);
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();

    let snaps = vec![dead_snapshot(), healthy_standby_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 10);
    assert_eq!(status.pair_state, PairState::Failed);

    // Failed is absorbing: nothing moves it back.
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];
    tick(&sup, &mut status, &snaps, &mut runner, &mut agent, &mut orch, &mut events, 20);
    assert_eq!(status.pair_state, PairState::Failed);
}
