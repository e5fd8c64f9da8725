//! Persist-at-end-of-tick: the status survives a supervisor restart,
//! and a conflicting write from the orchestration layer surfaces
//! instead of being clobbered.

use pairguard::harness::{
    healthy_active_snapshot, healthy_standby_snapshot, MemoryEvents, RecordingOrchestrator,
    RecordingRunner, ScriptedAgent,
};
use pairguard::{
    Config, FileStatusStore, PairState, ReconcileStatus, StatusStore, StoreError, Supervisor,
};
use tempfile::tempdir;

#[test]
fn status_survives_a_supervisor_restart() {
    let dir = tempdir().unwrap();
    let mut store = FileStatusStore::new(dir.path().join("db.status.json"));
    store.save(&ReconcileStatus::new_pair("db"), 0).unwrap();

    let mut runner = RecordingRunner::new();
    let mut agent = ScriptedAgent::new();
    let mut orch = RecordingOrchestrator::default();
    let mut events = MemoryEvents::new();
    let snaps = vec![healthy_active_snapshot(), healthy_standby_snapshot()];

    {
        let sup = Supervisor::new(Config::default());
        sup.reconcile(
            &mut store, &snaps, &mut runner, &mut agent, &mut orch, &mut events, false, 100,
        )
        .unwrap();
    }

    // A different supervisor instance picks the object up where the
    // first one left it.
    let sup = Supervisor::new(Config::default());
    let report = sup
        .reconcile(
            &mut store, &snaps, &mut runner, &mut agent, &mut orch, &mut events, false, 200,
        )
        .unwrap();
    assert_eq!(report.pair_state, PairState::Normal);

    let loaded = store.load().unwrap();
    assert_eq!(loaded.status.pair_state, PairState::Normal);
    assert_eq!(loaded.revision, 3);
}

#[test]
fn conflicting_revision_aborts_the_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.status.json");
    let mut store = FileStatusStore::new(path.clone());
    store.save(&ReconcileStatus::new_pair("db"), 0).unwrap();

    let versioned = store.load().unwrap();

    // Another writer lands in between.
    let mut interloper = FileStatusStore::new(path);
    interloper.save(&versioned.status, versioned.revision).unwrap();

    match store.save(&versioned.status, versioned.revision) {
        Err(StoreError::Conflict { .. }) => {}
        other => panic!("expected a conflict, got {:?}", other),
    }
}
