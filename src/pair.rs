//! Pair-level composition: folding the two pods' answers and the
//! current pair state into the next pair state.
//!
//! The transition table does most of the work; this module owns the
//! parts that deliberately bypass or post-process it. The both-down
//! decision runs before any lookup, the failover sentinel is committed
//! by flipping the intended roles, a reexamine resolves by pairing the
//! two pods' classifications, and the upgrade checkers piggyback on the
//! freshly computed (not yet committed) state.

use crate::actions::{ActionRunner, AgentGateway, EventKind, EventSink};
use crate::answer::PodAnswer;
use crate::config::{BothDownBehavior, Config};
use crate::observe::{PodSnapshot, RepState};
use crate::state::{PairState, Role};
use crate::status::ReconcileStatus;
use crate::table::{Outcome, PairTable, UpgradeOutcome, UpgradeTable};
use crate::upgrade::{self, TaskStatus, UpgradePhase};
use log::{debug, info, warn};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleResolveError {
    #[error("could not determine active nor standby")]
    Undetermined,
}

/// Which pod is the active and which the standby right now, judged by
/// the live replication states. When only one side is conclusive the
/// other is inferred.
pub fn current_active_standby(snaps: &[PodSnapshot]) -> Result<(usize, usize), RoleResolveError> {
    let mut active = None;
    let mut standby = None;
    for (i, snap) in snaps.iter().enumerate().take(2) {
        match snap.rep_state {
            RepState::Active => active = Some(i),
            RepState::Standby => standby = Some(i),
            _ => {}
        }
    }
    match (active, standby) {
        (Some(a), Some(s)) => Ok((a, s)),
        (Some(a), None) => Ok((a, if a == 0 { 1 } else { 0 })),
        (None, Some(s)) => Ok((if s == 0 { 1 } else { 0 }, s)),
        (None, None) => Err(RoleResolveError::Undetermined),
    }
}

/// The injectable pair engine: both tables, built once.
#[derive(Debug, Default)]
pub struct PairEngine {
    table: PairTable,
    upgrade_table: UpgradeTable,
}

impl PairEngine {
    pub fn new() -> Self {
        PairEngine {
            table: PairTable::new(),
            upgrade_table: UpgradeTable::new(),
        }
    }

    pub fn table(&self) -> &PairTable {
        &self.table
    }

    pub fn upgrade_table(&self) -> &UpgradeTable {
        &self.upgrade_table
    }

    /// Reassess the pair after both pods have answered this tick.
    /// Commits the new pair state into `status` and returns true when
    /// the standby upgrade leg just finished and the active leg should
    /// begin.
    #[allow(clippy::too_many_arguments)]
    pub fn reassess(
        &self,
        status: &mut ReconcileStatus,
        cfg: &Config,
        runner: &mut dyn ActionRunner,
        agent: &mut dyn AgentGateway,
        events: &mut dyn EventSink,
        someone_other_down: bool,
        someone_healthy: bool,
        now: u64,
    ) -> bool {
        debug!(
            "pair {} pods {} and {}",
            status.pair_state, status.pods[0].state, status.pods[1].state
        );

        let mut upgrade_active = false;

        // One pod was just fixed while its peer still believes the
        // other side is dead. Re-reading the healthy side now would be
        // misleading; clear both and let the next tick see the pair
        // fresh, almost certainly as Normal.
        let new_state = if status.pair_state == PairState::StandbyDown
            && someone_other_down
            && someone_healthy
        {
            debug!("peer disagreement after standby repair; re-polling both sides");
            status.pods[0].set_state(PodAnswer::Unknown, now);
            status.pods[1].set_state(PodAnswer::Unknown, now);
            PairState::Normal
        } else if status.pair_state == PairState::Reexamine {
            self.resolve_reexamine(status, events, now)
        } else {
            let (state, flag) = self.next_state(status, cfg, runner, agent, events, now);
            upgrade_active = flag;
            state
        };

        if status.pair_state != new_state {
            commit_pair_state(status, new_state, events, now);
        } else {
            debug!("pair state {} unchanged", new_state);
        }

        upgrade_active
    }

    fn next_state(
        &self,
        status: &mut ReconcileStatus,
        cfg: &Config,
        runner: &mut dyn ActionRunner,
        agent: &mut dyn AgentGateway,
        events: &mut dyn EventSink,
        now: u64,
    ) -> (PairState, bool) {
        // Both members down: the table row for this state is a
        // placeholder. Decide which instance, if any, may safely become
        // the new active, and route around the lookup entirely.
        if status.pair_state == PairState::BothDown {
            return (self.both_down_decision(status, cfg, events), false);
        }

        let Some((active, standby)) = status.intended_active() else {
            warn!("pair has no designated active; requiring manual intervention");
            return (PairState::ManualInterventionRequired, false);
        };
        let a = status.pods[active].state;
        let s = status.pods[standby].state;

        let mut new_state = match self.table.next(status.pair_state, a, s) {
            Outcome::Next(state) => state,
            Outcome::Failover => {
                // The sole commissioning point for automatic failover:
                // swap the intended roles and take over.
                info!("failover: promoting {}", status.pods[standby].name);
                status.flip_intended_roles();
                PairState::ActiveTakeover
            }
            Outcome::Unmapped => {
                warn!(
                    "no transition for ({}, {}, {}); requiring manual intervention",
                    status.pair_state, a, s
                );
                PairState::ManualInterventionRequired
            }
        };

        let mut upgrade_active = false;

        if status.upgrade.in_progress() {
            let standby_leg = matches!(
                status.upgrade.standby_status,
                Some(TaskStatus::DeleteStandby) | Some(TaskStatus::Processing)
            );
            let active_leg = matches!(
                status.upgrade.active_status,
                Some(TaskStatus::DeleteActive) | Some(TaskStatus::Processing)
            );

            if standby_leg {
                match upgrade::check_standby_leg(
                    status, cfg, &self.upgrade_table, agent, events, new_state, now,
                ) {
                    UpgradeOutcome::Phase(UpgradePhase::UpgradingActive) => {
                        upgrade_active = true;
                        events.publish(EventKind::Upgrade, "Upgrade of standby complete", false);
                    }
                    UpgradeOutcome::ManualIntervention => {
                        new_state = PairState::ManualInterventionRequired;
                    }
                    _ => {}
                }
            } else if active_leg {
                match upgrade::check_active_leg(
                    status, cfg, &self.upgrade_table, agent, events, new_state, now,
                ) {
                    UpgradeOutcome::Phase(UpgradePhase::Complete) => {
                        let elapsed = now.saturating_sub(status.upgrade.upgrade_start_time);
                        events.publish(
                            EventKind::Upgrade,
                            &format!("Upgrade completed in {} secs", elapsed),
                            false,
                        );
                        status.upgrade.reset();
                        // Reopen the database closed during the
                        // pre-upgrade quiesce.
                        if let Some((active_now, _)) = status.intended_active() {
                            let mut params = crate::actions::ActionParams::new();
                            params.insert("dbName".to_string(), status.name.clone());
                            if let Err(err) =
                                runner.run(active_now, crate::actions::Action::OpenDb, &params)
                            {
                                warn!("reopening database after upgrade failed: {}", err);
                            }
                        }
                    }
                    UpgradeOutcome::ManualIntervention => {
                        new_state = PairState::ManualInterventionRequired;
                    }
                    _ => {}
                }
            } else {
                let msg = if status.upgrade.active_status == Some(TaskStatus::Failed) {
                    "Upgrade unsuccessful on the active pod, entering ManualInterventionRequired"
                } else if status.upgrade.standby_status == Some(TaskStatus::Failed) {
                    "Upgrade unsuccessful on the standby pod, entering ManualInterventionRequired"
                } else {
                    "Error determining upgrade state, entering ManualInterventionRequired"
                };
                events.publish(EventKind::UpgradeError, msg, true);
                new_state = PairState::ManualInterventionRequired;
            }
        }

        (new_state, upgrade_active)
    }

    /// Decide the outcome of a both-down situation: which member, if
    /// either, is eligible to become the new active.
    fn both_down_decision(
        &self,
        status: &mut ReconcileStatus,
        cfg: &Config,
        events: &mut dyn EventSink,
    ) -> PairState {
        match cfg.both_down_behavior {
            BothDownBehavior::Manual => PairState::ManualInterventionRequired,
            BothDownBehavior::Best => match both_down_ranking(status) {
                None => {
                    events.publish(
                        EventKind::StateChange,
                        "Cannot determine which database is ahead; operator must decide",
                        true,
                    );
                    PairState::ManualInterventionRequired
                }
                Some((best, worst)) => {
                    status.pods[best].set_intended(Role::Active);
                    status.pods[worst].set_intended(Role::Standby);
                    let msg = format!(
                        "Based on replication configuration {} will be the new active; its previous role was {}",
                        status.pods[best].name, status.pods[best].prev_intended
                    );
                    events.publish(EventKind::StateChange, &msg, true);
                    PairState::WaitingForActive
                }
            },
        }
    }

    /// Pair up the two pods' reexamine classifications.
    fn resolve_reexamine(
        &self,
        status: &mut ReconcileStatus,
        events: &mut dyn EventSink,
        now: u64,
    ) -> PairState {
        let s0 = status.pods[0].state;
        let s1 = status.pods[1].state;
        match s0 {
            PodAnswer::HealthyActive | PodAnswer::Healthy => match s1 {
                // A failed standby-first upgrade leaves an untouched,
                // plainly Healthy active; that pairs up fine too.
                PodAnswer::HealthyStandby => {
                    status.pods[0].set_intended(Role::Active);
                    status.pods[1].set_intended(Role::Standby);
                    self.finish_reexamined_upgrade(status, events, now);
                    PairState::Normal
                }
                PodAnswer::CatchingUp => {
                    status.upgrade.standby_status = Some(TaskStatus::CatchingUp);
                    debug!("standby still catching up; staying in reexamine");
                    PairState::Reexamine
                }
                _ => {
                    if status.upgrade.in_progress() {
                        events.publish(
                            EventKind::UpgradeError,
                            "Waiting for standby; trigger another reexamine to retry",
                            true,
                        );
                    }
                    PairState::ManualInterventionRequired
                }
            },
            PodAnswer::HealthyStandby => match s1 {
                PodAnswer::Healthy | PodAnswer::HealthyActive => {
                    status.pods[1].set_intended(Role::Active);
                    status.pods[0].set_intended(Role::Standby);
                    self.finish_reexamined_upgrade(status, events, now);
                    PairState::Normal
                }
                _ => PairState::ManualInterventionRequired,
            },
            PodAnswer::HealthyIdle => {
                if s1 == PodAnswer::Down {
                    // The idle database is the only usable one; make it
                    // the new active and rebuild its peer.
                    status.pods[0].set_intended(Role::Active);
                    status.pods[1].set_intended(Role::Standby);
                    PairState::ConfiguringActive
                } else {
                    PairState::ManualInterventionRequired
                }
            }
            PodAnswer::Down => {
                if s1 == PodAnswer::HealthyIdle {
                    status.pods[1].set_intended(Role::Active);
                    status.pods[0].set_intended(Role::Standby);
                    PairState::ConfiguringActive
                } else {
                    PairState::ManualInterventionRequired
                }
            }
            _ => PairState::ManualInterventionRequired,
        }
    }

    fn finish_reexamined_upgrade(
        &self,
        status: &mut ReconcileStatus,
        events: &mut dyn EventSink,
        now: u64,
    ) {
        if status.upgrade.in_progress() {
            let elapsed = now.saturating_sub(status.upgrade.upgrade_start_time);
            info!("failed upgrade resolved in {}s", elapsed);
            events.publish(
                EventKind::Upgrade,
                "Recovery from upgrade failure complete",
                false,
            );
            status.upgrade.reset();
        }
    }
}

/// Rank the two members of a down pair by who is most likely ahead.
/// With asynchronous replication the active always is. Twosafe commits
/// on the standby first, so the standby usually is, unless the previous
/// pair state says the active had already taken over; and twosafe with
/// return disabled or local commit makes the answer unknowable.
fn both_down_ranking(status: &ReconcileStatus) -> Option<(usize, usize)> {
    #[derive(PartialEq)]
    enum Ahead {
        Active,
        Standby,
        Unknown,
    }

    let ahead = if status.using_twosafe {
        match status.prev_pair_state {
            Some(PairState::ActiveDown) => Ahead::Standby,
            Some(PairState::ActiveTakeover)
            | Some(PairState::StandbyStarting)
            | Some(PairState::StandbyDown) => Ahead::Active,
            Some(PairState::Normal) => {
                if status.both_down_recovery_ineligible {
                    Ahead::Unknown
                } else {
                    Ahead::Standby
                }
            }
            other => {
                debug!("no ranking rule for previous pair state {:?}", other);
                Ahead::Unknown
            }
        }
    } else {
        Ahead::Active
    };

    let (active, standby) = status.intended_active()?;
    match ahead {
        Ahead::Active => Some((active, standby)),
        Ahead::Standby => Some((standby, active)),
        Ahead::Unknown => None,
    }
}

/// Commit a new pair state with history and an audit event. Leaving
/// Normal is always worth a warning.
pub fn commit_pair_state(
    status: &mut ReconcileStatus,
    new_state: PairState,
    events: &mut dyn EventSink,
    now: u64,
) {
    if new_state != PairState::Initializing {
        let warning = status.pair_state == PairState::Normal;
        let kind = if new_state == PairState::Failed {
            EventKind::FailedCreate
        } else {
            EventKind::StateChange
        };
        let msg = format!("Pair was {}, now {}", status.pair_state, new_state);
        events.publish(kind, &msg, warning);
    }
    status.set_pair_state(new_state, now);
    info!("pair state set to {}", new_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::NullEvents;
    use crate::observe::PodSnapshot;

    fn snap_with(rep_state: RepState) -> PodSnapshot {
        PodSnapshot {
            rep_state,
            ..PodSnapshot::absent()
        }
    }

    #[test]
    fn role_resolution_prefers_live_rep_states() {
        let snaps = vec![snap_with(RepState::Standby), snap_with(RepState::Active)];
        assert_eq!(current_active_standby(&snaps), Ok((1, 0)));
    }

    #[test]
    fn role_resolution_infers_the_missing_side() {
        let snaps = vec![snap_with(RepState::Idle), snap_with(RepState::Standby)];
        assert_eq!(current_active_standby(&snaps), Ok((0, 1)));

        let snaps = vec![snap_with(RepState::Active), snap_with(RepState::Failed)];
        assert_eq!(current_active_standby(&snaps), Ok((0, 1)));
    }

    #[test]
    fn role_resolution_fails_with_no_evidence() {
        let snaps = vec![snap_with(RepState::Idle), snap_with(RepState::Unknown)];
        assert_eq!(
            current_active_standby(&snaps),
            Err(RoleResolveError::Undetermined)
        );
    }

    #[test]
    fn twosafe_ranking_trusts_the_standby_after_active_down() {
        let mut status = ReconcileStatus::new_pair("db");
        status.using_twosafe = true;
        status.prev_pair_state = Some(PairState::ActiveDown);
        // pod 0 intended active, so the standby (pod 1) ranks first
        assert_eq!(both_down_ranking(&status), Some((1, 0)));
    }

    #[test]
    fn async_ranking_always_trusts_the_active() {
        let mut status = ReconcileStatus::new_pair("db");
        status.prev_pair_state = Some(PairState::ActiveDown);
        assert_eq!(both_down_ranking(&status), Some((0, 1)));
    }

    #[test]
    fn ineligible_twosafe_pair_cannot_be_ranked() {
        let mut status = ReconcileStatus::new_pair("db");
        status.using_twosafe = true;
        status.both_down_recovery_ineligible = true;
        status.prev_pair_state = Some(PairState::Normal);
        assert_eq!(both_down_ranking(&status), None);
    }

    #[test]
    fn commit_records_history_and_stamp() {
        let mut status = ReconcileStatus::new_pair("db");
        let mut events = NullEvents;
        commit_pair_state(&mut status, PairState::Normal, &mut events, 42);
        assert_eq!(status.pair_state, PairState::Normal);
        assert_eq!(status.prev_pair_state, Some(PairState::Initializing));
        assert_eq!(status.last_pair_state_switch, 42);
    }
}
