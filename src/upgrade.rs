//! Rolling image upgrade of a replicated pair.
//!
//! The sequence is standby first, then active: delete the target pod so
//! the orchestrator recreates it on the new image, let the ordinary
//! repair machinery resynchronize it, prove replication with an
//! insert/observe round trip, then do the other side. Progress is a
//! three-key state machine over [`UpgradeStatus`], advanced once per
//! tick by the per-leg checkers below.

use crate::actions::{AgentGateway, EventKind, EventSink, Orchestrator, OrchestratorError};
use crate::config::{Config, UpgradeStrategy};
use crate::observe::PodSnapshot;
use crate::state::{PairState, Role};
use crate::status::ReconcileStatus;
use crate::table::{UpgradeOutcome, UpgradeTable};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Phase of an automated upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradePhase {
    UpgradingStandby,
    UpgradingActive,
    Complete,
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Per-side task status during an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    DeleteActive,
    DeleteStandby,
    /// Pod recreation in progress; waiting for the pair to work its way
    /// back to Normal.
    Processing,
    CatchingUp,
    Failed,
    Success,
    /// The active side idles in this status while the standby leg runs.
    Waiting,
    Unknown,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The full task-status domain, for totality sweeps.
pub const TASK_STATUS_DOMAIN: [TaskStatus; 8] = [
    TaskStatus::DeleteActive,
    TaskStatus::DeleteStandby,
    TaskStatus::Processing,
    TaskStatus::CatchingUp,
    TaskStatus::Failed,
    TaskStatus::Success,
    TaskStatus::Waiting,
    TaskStatus::Unknown,
];

/// Which leg of the upgrade to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeLeg {
    Active,
    Standby,
}

/// Persisted upgrade progress. Empty (`phase == None`) whenever no
/// upgrade is in flight; reset on completion or abandonment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeStatus {
    pub phase: Option<UpgradePhase>,
    pub prev_phase: Option<UpgradePhase>,
    pub active_status: Option<TaskStatus>,
    pub standby_status: Option<TaskStatus>,
    pub upgrade_start_time: u64,
    pub active_start_time: u64,
    pub standby_start_time: u64,
    pub last_phase_switch: u64,
    /// Set when the pod delete failed for a retryable reason; the
    /// supervisor keeps retrying the initiation until it sticks.
    pub image_update_pending: bool,
    pub fail_count: u32,
}

impl UpgradeStatus {
    pub fn in_progress(&self) -> bool {
        self.phase.is_some()
    }

    /// End the upgrade by returning every field to its zero value.
    pub fn reset(&mut self) {
        *self = UpgradeStatus::default();
    }

    fn set_phase(&mut self, phase: UpgradePhase, now: u64) {
        if self.phase != Some(phase) {
            self.prev_phase = self.phase;
            self.phase = Some(phase);
            self.last_phase_switch = now;
            info!("upgrade phase set to {}", phase);
        }
    }
}

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("cannot initiate upgrade, pair state is {0}")]
    NotNormal(PairState),
    #[error("upgrade strategy is manual")]
    StrategyManual,
    #[error("release mismatch: {0} vs {1}")]
    ReleaseMismatch(String, String),
    #[error("cannot delete pod {0}: {1}")]
    DeleteFailed(String, String),
    #[error("pair has no designated active")]
    NoDesignatedActive,
    #[error("upgrade compatibility list unusable: {0}")]
    BadCompatibilityList(String),
    #[error("release {0} is not patch compatible with {1}")]
    NotPatchCompatible(String, String),
}

/// Begin one leg of the upgrade: delete the target pod and stamp the
/// per-side statuses. Only legal from pair state `Normal` under the
/// automatic strategy, and (for the first leg) only when both sides run
/// the same release.
pub fn init_upgrade(
    leg: UpgradeLeg,
    status: &mut ReconcileStatus,
    snaps: &[PodSnapshot],
    cfg: &Config,
    table: &UpgradeTable,
    orchestrator: &mut dyn Orchestrator,
    events: &mut dyn EventSink,
    now: u64,
) -> Result<(), UpgradeError> {
    if status.pair_state != PairState::Normal {
        let msg = format!(
            "Cannot initiate the upgrade, pair state not Normal (state={})",
            status.pair_state
        );
        events.publish(EventKind::UpgradeError, &msg, true);
        return Err(UpgradeError::NotNormal(status.pair_state));
    }
    if cfg.upgrade_strategy != UpgradeStrategy::Auto {
        debug!("upgrade strategy is manual; not initiating");
        return Err(UpgradeError::StrategyManual);
    }

    let wanted = match leg {
        UpgradeLeg::Active => Role::Active,
        UpgradeLeg::Standby => Role::Standby,
    };
    let pod = status
        .pods
        .iter()
        .position(|p| p.intended == wanted)
        .ok_or(UpgradeError::NoDesignatedActive)?;
    let other = if pod == 0 { 1 } else { 0 };
    let pod_name = status.pods[pod].name.clone();

    // Before the first leg both instances must already agree on the
    // installed release; an upgrade is not how you repair skew.
    if status.upgrade.standby_status.is_none() && snaps[pod].release != snaps[other].release {
        let msg = format!(
            "Release mismatch, pod {}={} pod {}={}, upgrade cancelled",
            pod, snaps[pod].release, other, snaps[other].release
        );
        events.publish(EventKind::UpgradeError, &msg, true);
        return Err(UpgradeError::ReleaseMismatch(
            snaps[pod].release.clone(),
            snaps[other].release.clone(),
        ));
    }

    if let Err(err) = orchestrator.delete_pod(&pod_name) {
        let msg = format!("Cannot delete pod {}: {}", pod_name, err);
        match err {
            OrchestratorError::Unauthorized(_) => {
                events.publish(EventKind::FailedUpgrade, &msg, true);
            }
            OrchestratorError::Other(_) => {
                // Keep retrying until the delete goes through.
                status.upgrade.image_update_pending = true;
                events.publish(EventKind::UpgradeError, &msg, false);
            }
        }
        return Err(UpgradeError::DeleteFailed(pod_name, msg));
    }

    info!("deleted {:?} pod {} for upgrade", leg, pod_name);
    status.upgrade.image_update_pending = false;
    if status.upgrade.upgrade_start_time == 0 {
        status.upgrade.upgrade_start_time = now;
    }

    match leg {
        UpgradeLeg::Active => {
            status.upgrade.active_start_time = now;
            if status.upgrade.standby_status.is_none() {
                // Should never be empty at active-leg invocation; the
                // table cannot key on nothing.
                warn!("standby status empty at active upgrade initiation, set to unknown");
                status.upgrade.standby_status = Some(TaskStatus::Unknown);
            }
            status.upgrade.active_status = Some(TaskStatus::DeleteActive);
            if let UpgradeOutcome::Phase(p) = table.next(
                UpgradePhase::UpgradingActive,
                TaskStatus::DeleteActive,
                status.upgrade.standby_status.unwrap_or(TaskStatus::Unknown),
            ) {
                status.upgrade.set_phase(p, now);
            }
        }
        UpgradeLeg::Standby => {
            status.upgrade.standby_start_time = now;
            status.upgrade.active_status = Some(TaskStatus::Waiting);
            status.upgrade.standby_status = Some(TaskStatus::DeleteStandby);
            if let UpgradeOutcome::Phase(p) = table.next(
                UpgradePhase::UpgradingStandby,
                TaskStatus::Waiting,
                TaskStatus::DeleteStandby,
            ) {
                status.upgrade.set_phase(p, now);
            }
        }
    }

    events.publish(
        EventKind::Upgrade,
        &format!("Deleted pod {} during upgrade", pod_name),
        false,
    );
    Ok(())
}

fn leg_roles(status: &ReconcileStatus) -> Option<(usize, usize)> {
    status.intended_active()
}

/// Seconds the pair has sat in its current upgrade phase.
fn phase_age(status: &ReconcileStatus, now: u64) -> Option<u64> {
    if status.upgrade.last_phase_switch == 0 {
        None
    } else {
        Some(now.saturating_sub(status.upgrade.last_phase_switch))
    }
}

/// Has the deleted side been Down past the configured window? Zero
/// disables the timeout.
fn down_timed_out(status: &ReconcileStatus, pod: usize, cfg: &Config, now: u64) -> bool {
    if cfg.upgrade_down_pod_timeout_secs == 0 {
        return false;
    }
    if status.pods[pod].state != crate::answer::PodAnswer::Down {
        return false;
    }
    match phase_age(status, now) {
        Some(age) if age > cfg.upgrade_down_pod_timeout_secs => true,
        Some(age) => {
            debug!(
                "upgrade pod down for {}s, timeout in {}s",
                age,
                cfg.upgrade_down_pod_timeout_secs - age
            );
            false
        }
        None => false,
    }
}

/// Advance the standby leg by one tick. `candidate` is the pair state
/// the table just computed for this tick, not yet committed.
pub fn check_standby_leg(
    status: &mut ReconcileStatus,
    cfg: &Config,
    table: &UpgradeTable,
    agent: &mut dyn AgentGateway,
    events: &mut dyn EventSink,
    candidate: PairState,
    now: u64,
) -> UpgradeOutcome {
    let Some((active, standby)) = leg_roles(status) else {
        return UpgradeOutcome::ManualIntervention;
    };
    let Some(phase) = status.upgrade.phase else {
        return UpgradeOutcome::Unmapped;
    };

    if down_timed_out(status, standby, cfg, now) {
        status.upgrade.standby_status = Some(TaskStatus::Failed);
        status.upgrade.fail_count += 1;
        events.publish(
            EventKind::UpgradeError,
            "standby upgrade unsuccessful: pod down past timeout",
            true,
        );
        return UpgradeOutcome::ManualIntervention;
    }

    if status.pair_state != candidate {
        if status.upgrade.standby_status == Some(TaskStatus::DeleteStandby)
            && status.pods[standby].state != crate::answer::PodAnswer::Healthy
        {
            // Delete confirmed; the recreate-and-resync cycle is underway.
            status.upgrade.standby_status = Some(TaskStatus::Processing);
            info!("standby upgrade processing; pair moving to {}", candidate);
        }
        status.upgrade.set_phase(UpgradePhase::UpgradingStandby, now);
    }

    // Once the pair climbs back to Normal from the standby-repair
    // states, prove the upgraded standby actually replicates before
    // calling the leg done.
    if matches!(
        status.pair_state,
        PairState::StandbyDown | PairState::StandbyStarting | PairState::StandbyCatchup
    ) && candidate == PairState::Normal
    {
        match agent.verify_replication(active, standby) {
            Err(err) => {
                status.upgrade.standby_status = Some(TaskStatus::Failed);
                status.upgrade.fail_count += 1;
                events.publish(EventKind::UpgradeError, &err.to_string(), true);
                return UpgradeOutcome::ManualIntervention;
            }
            Ok(()) => {
                status.upgrade.standby_status = Some(TaskStatus::Success);
                let elapsed = now.saturating_sub(status.upgrade.standby_start_time);
                info!("standby upgrade completed in {}s", elapsed);
            }
        }
    }

    let outcome = table.next(
        phase,
        status.upgrade.active_status.unwrap_or(TaskStatus::Unknown),
        status.upgrade.standby_status.unwrap_or(TaskStatus::Unknown),
    );
    if let UpgradeOutcome::Phase(p) = outcome {
        status.upgrade.set_phase(p, now);
    }
    outcome
}

/// Advance the active leg by one tick. By the time this runs the
/// failover has flipped the roles, so the recreated pod is the pair's
/// new standby.
pub fn check_active_leg(
    status: &mut ReconcileStatus,
    cfg: &Config,
    table: &UpgradeTable,
    agent: &mut dyn AgentGateway,
    events: &mut dyn EventSink,
    candidate: PairState,
    now: u64,
) -> UpgradeOutcome {
    let Some((active, standby)) = leg_roles(status) else {
        return UpgradeOutcome::ManualIntervention;
    };
    let Some(phase) = status.upgrade.phase else {
        return UpgradeOutcome::Unmapped;
    };

    if down_timed_out(status, standby, cfg, now) {
        status.upgrade.active_status = Some(TaskStatus::Failed);
        status.upgrade.fail_count += 1;
        events.publish(
            EventKind::UpgradeError,
            "active upgrade unsuccessful: pod down past timeout",
            true,
        );
        return UpgradeOutcome::ManualIntervention;
    }

    if status.pair_state != candidate {
        if status.upgrade.active_status == Some(TaskStatus::DeleteActive)
            && status.pods[standby].state != crate::answer::PodAnswer::Healthy
        {
            status.upgrade.active_status = Some(TaskStatus::Processing);
            info!("active upgrade processing; pair moving to {}", candidate);
        }
        status.upgrade.set_phase(UpgradePhase::UpgradingActive, now);
    }

    if matches!(
        status.pair_state,
        PairState::StandbyDown | PairState::StandbyStarting | PairState::StandbyCatchup
    ) && candidate == PairState::Normal
    {
        match agent.verify_replication(active, standby) {
            Err(err) => {
                status.upgrade.active_status = Some(TaskStatus::Failed);
                status.upgrade.fail_count += 1;
                events.publish(EventKind::Error, &err.to_string(), true);
                return UpgradeOutcome::ManualIntervention;
            }
            Ok(()) => {
                status.upgrade.active_status = Some(TaskStatus::Success);
                let elapsed = now.saturating_sub(status.upgrade.active_start_time);
                info!("active upgrade completed in {}s", elapsed);
            }
        }
    }

    let outcome = table.next(
        phase,
        status.upgrade.active_status.unwrap_or(TaskStatus::Unknown),
        status.upgrade.standby_status.unwrap_or(TaskStatus::Unknown),
    );
    if let UpgradeOutcome::Phase(p) = outcome {
        status.upgrade.set_phase(p, now);
    }
    outcome
}

// ---------------------------------------------------------------------
// Patch compatibility lists
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CompatHeader {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompatListV1 {
    #[serde(rename = "validUpgrades", default)]
    valid_upgrades: Vec<ValidUpgradeV1>,
}

#[derive(Debug, Deserialize)]
struct ValidUpgradeV1 {
    from: String,
    to: String,
    classic: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CompatListV2 {
    #[serde(rename = "validUpgrades", default)]
    valid_upgrades: Vec<ValidUpgradeV2>,
}

#[derive(Debug, Deserialize)]
struct ValidUpgradeV2 {
    from: String,
    to: String,
    classic: Option<ClassicCompatV2>,
}

#[derive(Debug, Deserialize)]
struct ClassicCompatV2 {
    online: Option<OnlineCompatV2>,
}

#[derive(Debug, Deserialize, Default)]
struct OnlineCompatV2 {
    inverse: Option<bool>,
}

/// The `version` field of a compatibility list, used to pick the newest
/// of the two sides' lists.
pub fn compat_list_version(json: &str) -> Result<String, UpgradeError> {
    let header: CompatHeader = serde_json::from_str(json)
        .map_err(|e| UpgradeError::BadCompatibilityList(e.to_string()))?;
    header
        .version
        .ok_or_else(|| UpgradeError::BadCompatibilityList("no version field".to_string()))
}

fn compat_schema_version(json: &str) -> Result<Option<String>, UpgradeError> {
    let header: CompatHeader = serde_json::from_str(json)
        .map_err(|e| UpgradeError::BadCompatibilityList(e.to_string()))?;
    Ok(header.schema_version)
}

/// Does `list_json` permit running `active_release` against
/// `standby_release` in one pair? Identical releases are always
/// compatible; otherwise the list's entries decide. Schema v2 entries
/// are one-directional unless marked `inverse`.
pub fn is_patch_compatible(
    list_json: &str,
    active_release: &str,
    standby_release: &str,
) -> Result<bool, UpgradeError> {
    if active_release == standby_release {
        return Ok(true);
    }

    let schema = compat_schema_version(list_json)?;
    match schema.as_deref() {
        Some("1") | None => {
            if let Ok(list) = serde_json::from_str::<CompatListV1>(list_json) {
                for v in &list.valid_upgrades {
                    let mentions_active = v.from == active_release || v.to == active_release;
                    let mentions_standby = v.to == standby_release || v.from == standby_release;
                    if mentions_active && mentions_standby {
                        if v.classic.is_none() {
                            debug!(
                                "classic not defined for {} to {}, pair unsupported",
                                v.from, v.to
                            );
                        } else {
                            return Ok(true);
                        }
                    }
                }
            }
            if schema.is_none() {
                // Schema unknown; give the v2 reading a chance too.
                return is_patch_compatible_v2(list_json, active_release, standby_release);
            }
            Ok(false)
        }
        Some("2") => is_patch_compatible_v2(list_json, active_release, standby_release),
        Some(other) => Err(UpgradeError::BadCompatibilityList(format!(
            "unknown schema version {}",
            other
        ))),
    }
}

fn is_patch_compatible_v2(
    list_json: &str,
    active_release: &str,
    standby_release: &str,
) -> Result<bool, UpgradeError> {
    let list: CompatListV2 = serde_json::from_str(list_json)
        .map_err(|e| UpgradeError::BadCompatibilityList(e.to_string()))?;
    for v in &list.valid_upgrades {
        let inverse = v
            .classic
            .as_ref()
            .and_then(|c| c.online.as_ref())
            .and_then(|o| o.inverse)
            .unwrap_or(false);
        let matched = if inverse {
            (v.from == active_release || v.to == active_release)
                && (v.to == standby_release || v.from == standby_release)
        } else {
            v.from == active_release && v.to == standby_release
        };
        if matched {
            if v.classic.is_none() {
                debug!(
                    "classic not defined for {} to {}, pair unsupported",
                    v.from, v.to
                );
            } else {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// The standby-leg gate: before the recreated standby is rebuilt onto a
/// possibly different release, prove the two releases may replicate
/// with each other. Prefers the newest list either side publishes,
/// consults both on legacy releases that do not bump the list version,
/// and falls back to the operator's bundled list when the agents
/// predate the mechanism.
pub fn patch_compatibility_gate(
    snaps: &[PodSnapshot],
    active: usize,
    standby: usize,
    agent: &mut dyn AgentGateway,
    events: &mut dyn EventSink,
) -> Result<(), UpgradeError> {
    let active_release = snaps[active].release.clone();
    let standby_release = snaps[standby].release.clone();

    let standby_list = match agent.upgrade_list(standby) {
        Ok(list) => list,
        Err(err) => {
            events.publish(
                EventKind::UpgradeError,
                "error reading upgrade compatibility list on standby",
                true,
            );
            debug!("standby upgrade list fetch failed: {}", err);
            None
        }
    };
    let active_list = match agent.upgrade_list(active) {
        Ok(list) => list,
        Err(err) => {
            events.publish(
                EventKind::UpgradeError,
                "error reading upgrade compatibility list on active",
                true,
            );
            debug!("active upgrade list fetch failed: {}", err);
            None
        }
    };

    let standby_ver = standby_list.as_deref().and_then(|l| compat_list_version(l).ok());
    let active_ver = active_list.as_deref().and_then(|l| compat_list_version(l).ok());

    let mut lists: Vec<String> = Vec::new();
    match (&standby_ver, &active_ver) {
        (Some(sv), Some(av)) => {
            if sv == av && active_release.starts_with("18") {
                // Legacy releases do not bump the list version, so we
                // cannot tell which list is newer; consult both.
                lists.push(active_list.clone().unwrap_or_default());
                lists.push(standby_list.clone().unwrap_or_default());
            } else if sv > av {
                lists.push(standby_list.clone().unwrap_or_default());
            } else {
                lists.push(active_list.clone().unwrap_or_default());
            }
        }
        (Some(_), None) => lists.push(standby_list.clone().unwrap_or_default()),
        (None, Some(_)) => lists.push(active_list.clone().unwrap_or_default()),
        (None, None) => {}
    }

    if lists.is_empty() {
        info!("no upgrade lists available from the pair, using the local list");
        match agent.local_upgrade_list() {
            Ok(local) => lists.push(local),
            Err(err) => {
                let msg = "error processing local upgrade compatibility list";
                events.publish(EventKind::UpgradeError, msg, true);
                return Err(UpgradeError::BadCompatibilityList(err.to_string()));
            }
        }
    }

    for list in &lists {
        match is_patch_compatible(list, &active_release, &standby_release) {
            Ok(true) => {
                info!(
                    "release {} is patch compatible with {}",
                    active_release, standby_release
                );
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => debug!("compatibility list rejected: {}", err),
        }
    }

    let msg = "error determining upgrade patch compatibility";
    events.publish(EventKind::UpgradeError, msg, true);
    Err(UpgradeError::NotPatchCompatible(
        active_release,
        standby_release,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const V2_LIST: &str = r#"{
        "schemaVersion": "2",
        "version": "5",
        "validUpgrades": [
            {"from": "22.1.1.1.0", "to": "22.1.1.2.0",
             "classic": {"online": {"inverse": false}}},
            {"from": "22.1.1.3.0", "to": "22.1.1.4.0",
             "classic": {"online": {"inverse": true}}},
            {"from": "22.1.1.5.0", "to": "22.1.1.6.0"}
        ]
    }"#;

    #[test]
    fn same_release_is_always_compatible() {
        assert!(is_patch_compatible(V2_LIST, "9.9.9.9.9", "9.9.9.9.9").unwrap());
    }

    #[test]
    fn v2_inverse_false_is_one_directional() {
        assert!(is_patch_compatible(V2_LIST, "22.1.1.1.0", "22.1.1.2.0").unwrap());
        assert!(!is_patch_compatible(V2_LIST, "22.1.1.2.0", "22.1.1.1.0").unwrap());
    }

    #[test]
    fn v2_inverse_true_allows_both_directions() {
        assert!(is_patch_compatible(V2_LIST, "22.1.1.3.0", "22.1.1.4.0").unwrap());
        assert!(is_patch_compatible(V2_LIST, "22.1.1.4.0", "22.1.1.3.0").unwrap());
    }

    #[test]
    fn entry_without_classic_is_unsupported() {
        assert!(!is_patch_compatible(V2_LIST, "22.1.1.5.0", "22.1.1.6.0").unwrap());
    }

    #[test]
    fn v1_list_matches_either_direction() {
        let v1 = r#"{
            "schemaVersion": "1",
            "version": "3",
            "validUpgrades": [
                {"from": "18.1.4.1.0", "to": "18.1.4.2.0", "classic": {}}
            ]
        }"#;
        assert!(is_patch_compatible(v1, "18.1.4.1.0", "18.1.4.2.0").unwrap());
        assert!(is_patch_compatible(v1, "18.1.4.2.0", "18.1.4.1.0").unwrap());
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let bad = r#"{"schemaVersion": "7", "version": "1", "validUpgrades": []}"#;
        assert!(matches!(
            is_patch_compatible(bad, "a", "b"),
            Err(UpgradeError::BadCompatibilityList(_))
        ));
    }

    #[test]
    fn list_version_extraction() {
        assert_eq!(compat_list_version(V2_LIST).unwrap(), "5");
        assert!(compat_list_version("{}").is_err());
    }

    #[test]
    fn reset_returns_to_empty() {
        let mut up = UpgradeStatus {
            phase: Some(UpgradePhase::UpgradingStandby),
            active_status: Some(TaskStatus::Waiting),
            standby_status: Some(TaskStatus::Processing),
            upgrade_start_time: 10,
            ..UpgradeStatus::default()
        };
        up.reset();
        assert!(!up.in_progress());
        assert_eq!(up.active_status, None);
        assert_eq!(up.upgrade_start_time, 0);
    }
}
