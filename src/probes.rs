//! Liveness predicates shared by every per-pod evaluator.
//!
//! Each predicate is a pure function of one snapshot, the pod's
//! persisted record, and the caller-supplied clock. The only side
//! effect in the module is the reachability stamp.

use crate::config::Config;
use crate::observe::PodSnapshot;
use crate::status::PodRecord;
use log::debug;
use thiserror::Error;

/// Why a pod is not reachable. Callers mostly branch on the boolean
/// result and keep this only as a diagnostic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Unreachability {
    #[error("pod not running")]
    NotRunning,
    #[error("pod running but agent down")]
    AgentDown,
}

/// Does the orchestrator report the pod as running?
pub fn is_running(snap: &PodSnapshot) -> bool {
    snap.running
}

/// A pod is reachable when it is running and its in-pod agent is
/// answering. On success the record's reachability stamp is refreshed;
/// the unreachable timeout measures against that stamp.
pub fn is_reachable(
    snap: &PodSnapshot,
    record: &mut PodRecord,
    now: u64,
) -> Result<(), Unreachability> {
    if !is_running(snap) {
        return Err(Unreachability::NotRunning);
    }
    if !snap.agent_up {
        return Err(Unreachability::AgentDown);
    }
    record.last_time_reachable = now;
    Ok(())
}

/// A quiescing pod is mid-teardown; it will either come back clean or
/// vanish. Evaluators must take no corrective action while this holds.
pub fn is_quiescing(snap: &PodSnapshot, record: &mut PodRecord, now: u64) -> bool {
    if is_reachable(snap, record, now).is_err() {
        return false;
    }
    if snap.quiescing {
        debug!("pod {} quiescing", record.name);
    }
    snap.quiescing
}

/// Has an unreachable pod been unreachable past the configured timeout?
/// Returns the elapsed seconds when exceeded. A pod that has never been
/// reachable (stamp zero) is still booting and never times out. The
/// boundary is strict: `elapsed == timeout` has not yet timed out.
pub fn unreachable_timeout_exceeded(record: &PodRecord, cfg: &Config, now: u64) -> Option<u64> {
    if record.last_time_reachable == 0 {
        return None;
    }
    let elapsed = now.saturating_sub(record.last_time_reachable);
    if elapsed > cfg.unreachable_timeout_secs {
        debug!(
            "pod {} unreachable for {}s (timeout {}s)",
            record.name, elapsed, cfg.unreachable_timeout_secs
        );
        Some(elapsed)
    } else {
        None
    }
}

/// Has the pod sat in a non-terminal replication state past the
/// configured timeout? False while the pod is unreachable or quiescing;
/// there is no point piling a second escalation onto a pod we cannot
/// even see.
pub fn rep_state_timeout_exceeded(
    snap: &PodSnapshot,
    record: &mut PodRecord,
    cfg: &Config,
    now: u64,
) -> bool {
    if is_reachable(snap, record, now).is_err() {
        return false;
    }
    if is_quiescing(snap, record, now) {
        return false;
    }
    let elapsed = now.saturating_sub(record.last_time_rep_state_changed);
    debug!(
        "pod {} rep state last changed {}s ago (timeout {}s)",
        record.name, elapsed, cfg.rep_state_timeout_secs
    );
    elapsed > cfg.rep_state_timeout_secs
}
