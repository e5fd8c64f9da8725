//! Evaluators for the replicated active/standby pair.

use super::checks::{
    daemon_gate, down, instance_gate, liveness_gate, missing_is_terminal, open_db_or_terminal,
    start_rep_agent_on_standby, terminal, unknown, unknown_silent, Gate,
};
use super::EvalCtx;
use crate::actions::{Action, EventKind};
use crate::answer::{Assessment, PodAnswer};
use crate::observe::{DaemonState, DbState, RepAgentState, RepPeerState, RepSchemeState, RepState};
use crate::probes;
use crate::state::PairState;
use crate::status::TaskPhase;
use crate::upgrade;
use log::{debug, info};

/// The healthy active under pair state Normal (also the active's check
/// while the standby is being repaired or caught up).
pub(super) fn normal_active(ctx: &mut EvalCtx) -> Assessment {
    match normal_active_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn normal_active_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;
    daemon_gate(ctx, down("daemon down"), unknown("daemon unknown"))?;

    match snap.db {
        DbState::None | DbState::Unloading | DbState::Unloaded => {
            return Err(down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    match snap.rep_scheme {
        RepSchemeState::Exists => {}
        RepSchemeState::None => return Err(down("no replication scheme")),
        RepSchemeState::Unknown => return Err(unknown("replication scheme unknown")),
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => return Err(down("replication agent not running")),
        RepAgentState::Unknown => return Err(unknown("replication agent unknown")),
    }

    match snap.rep_state {
        RepState::Standby | RepState::Failed | RepState::Idle => {
            return Err(down(format!("replication state {}", snap.rep_state)))
        }
        RepState::Recovering => {
            let (cfg, now) = (ctx.cfg, ctx.now);
            return if probes::rep_state_timeout_exceeded(snap, ctx.record(), cfg, now) {
                Err(down("replication state Recovering and timeout exceeded"))
            } else {
                Err(unknown("replication state Recovering"))
            }
        }
        RepState::Active => {}
        RepState::Unknown => return Err(unknown("replication state unknown")),
    }

    match snap.rep_peer {
        RepPeerState::Stop | RepPeerState::Failed => {
            // We are fine; it is the peer that looks dead from here.
            return Err(Assessment::diag(
                PodAnswer::OtherDown,
                true,
                format!("peer state {}", snap.rep_peer),
            ));
        }
        RepPeerState::Pause => {
            return match ctx.run(Action::SetSubStateStart) {
                // May be ready next time.
                Ok(()) => Err(unknown_silent()),
                Err(err) => Err(down(err.to_string())),
            };
        }
        RepPeerState::Start => {}
        RepPeerState::Unknown => return Err(unknown(format!("peer state {}", snap.rep_peer))),
    }

    if !snap.db_open {
        return Err(down("db closed"));
    }

    Ok(Assessment::new(PodAnswer::Healthy, true))
}

/// The healthy standby under pair state Normal.
pub(super) fn normal_standby(ctx: &mut EvalCtx) -> Assessment {
    match normal_standby_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn normal_standby_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    // A standby whose instance went missing is just down; the active is
    // still serving and the repair path can rebuild this side.
    instance_gate(ctx, down("instance missing"), unknown("instance unknown"))?;
    daemon_gate(ctx, down("daemon down"), unknown("daemon unknown"))?;

    match snap.db {
        DbState::None | DbState::Unloading | DbState::Unloaded => {
            return Err(down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    if !snap.db_open {
        return Err(down("db closed"));
    }

    match snap.rep_scheme {
        RepSchemeState::Exists => {}
        RepSchemeState::None => return Err(down("no replication scheme")),
        RepSchemeState::Unknown => return Err(unknown("replication scheme unknown")),
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => return Err(down("replication agent not running")),
        RepAgentState::Unknown => return Err(unknown("replication agent unknown")),
    }

    match snap.rep_state {
        RepState::Standby => {}
        RepState::Recovering => {
            let (cfg, now) = (ctx.cfg, ctx.now);
            return if probes::rep_state_timeout_exceeded(snap, ctx.record(), cfg, now) {
                Err(down("replication state Recovering and timeout exceeded"))
            } else {
                Err(unknown("replication state Recovering"))
            }
        }
        RepState::Idle | RepState::Failed | RepState::Active => {
            return Err(down(format!("replication state {}", snap.rep_state)))
        }
        RepState::Unknown => return Err(unknown("replication state unknown")),
    }

    match snap.rep_peer {
        RepPeerState::Stop => Err(down("peer state Stop")),
        RepPeerState::Failed => Err(Assessment::diag(
            PodAnswer::OtherDown,
            true,
            "peer state Failed",
        )),
        RepPeerState::Pause => match ctx.run(Action::SetSubStateStart) {
            Ok(()) => Err(unknown_silent()),
            Err(err) => Err(down(err.to_string())),
        },
        RepPeerState::Start => Ok(Assessment::new(PodAnswer::Healthy, true)),
        RepPeerState::Unknown => Err(unknown("peer state unknown")),
    }
}

/// Bring a dead standby back to life: destroy whatever is left, copy
/// the database from the active, restart replication. The sequence is
/// recorded in the persisted recovery task so a supervisor restart
/// resumes it instead of re-running finished steps.
pub(super) fn standby_down_standby(ctx: &mut EvalCtx) -> Assessment {
    match standby_down_standby_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn standby_down_standby_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    let pod_name = ctx.record_ref().name.clone();

    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown_silent())?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            info!("standby daemon down, starting it");
            match ctx.run(Action::StartDaemon) {
                Err(err) => return Err(down(err.to_string())),
                Ok(()) => {
                    // Outside an upgrade, give the daemon a tick to
                    // settle; during one, press on.
                    if !ctx.status.upgrade.in_progress() {
                        return Err(unknown_silent());
                    }
                }
            }
        }
        DaemonState::Unknown => return Err(unknown_silent()),
    }

    // During an upgrade the recreated standby may be on a different
    // release; prove the two releases can replicate before rebuilding.
    if ctx.status.upgrade.in_progress() {
        match crate::pair::current_active_standby(ctx.snaps) {
            Err(err) => {
                let msg = format!("cannot determine current pair role assignments: {}", err);
                ctx.event(EventKind::UpgradeError, &msg, true);
                return Err(Assessment::diag(PodAnswer::UpgradeFailed, false, msg));
            }
            Ok((active, standby)) => {
                if let Err(err) = upgrade::patch_compatibility_gate(
                    ctx.snaps,
                    active,
                    standby,
                    &mut *ctx.agent,
                    &mut *ctx.events,
                ) {
                    return Err(Assessment::diag(
                        PodAnswer::UpgradeFailed,
                        false,
                        err.to_string(),
                    ));
                }
            }
        }
    }

    // Ask the agent about the async task we remember. If the pod died
    // mid-task the status object may still believe an operation is
    // pending; we only resume when the agent's record and ours agree.
    let mut agent_task = None;
    if let Some(id) = ctx.status.async_cursor.id.clone() {
        let host = ctx.status.async_cursor.host.clone();
        match ctx.agent.async_task_status(&host, &id) {
            Ok(st) => agent_task = Some(st),
            Err(err) => info!("async status query failed: {}", err),
        }
    }
    let async_pod_match = ctx.status.async_cursor.pod_name == pod_name;
    let ids_agree = {
        let ours = ctx.status.recovery.async_id.as_deref().unwrap_or("");
        let theirs = agent_task.as_ref().map(|t| t.id.as_str()).unwrap_or("");
        ours == theirs
    };
    let resumable = agent_task.is_some()
        && async_pod_match
        && ctx.status.recovery.phase == TaskPhase::Pending
        && ids_agree
        && agent_task
            .as_ref()
            .map(|t| t.errno.is_none() && !t.running)
            .unwrap_or(false);

    if resumable {
        if ctx.status.recovery.destroy_db {
            debug!(
                "recovery task {:?} already destroyed the db",
                ctx.status.recovery.id
            );
        } else {
            let _ = ctx.run(Action::DestroyDb);
            ctx.status.recovery.destroy_db = true;
        }
    } else {
        debug!("starting a fresh standby recovery task");
        ctx.status.recovery.begin(&pod_name);
        let _ = ctx.run(Action::DestroyDb);
        ctx.status.recovery.destroy_db = true;
    }

    let skip_duplicate = async_pod_match && ids_agree && ctx.status.recovery.rep_duplicate;
    if skip_duplicate {
        debug!(
            "recovery task {:?} already duplicated the db",
            ctx.status.recovery.id
        );
    } else if let Err(err) = ctx.run(Action::RepDuplicate) {
        ctx.status.rep_start_fail_count += 1;
        ctx.status.recovery.phase = TaskPhase::Complete;
        let msg = format!(
            "Standby: Duplicate unsuccessful. Count: {}",
            ctx.status.rep_start_fail_count
        );
        ctx.event(EventKind::StateChange, &msg, true);
        return Err(down(err.to_string()));
    } else {
        info!("duplicate successful, starting replication agent");
        ctx.status.recovery.rep_duplicate = true;
    }

    let skip_rep_agent = async_pod_match && ids_agree && ctx.status.recovery.start_rep_agent;
    if skip_rep_agent {
        debug!(
            "recovery task {:?} already started the replication agent",
            ctx.status.recovery.id
        );
    } else {
        start_rep_agent_on_standby(ctx, "Standby")?;
    }

    ctx.status.recovery.phase = TaskPhase::Complete;

    match snap.rep_state {
        RepState::Active | RepState::Failed => {
            ctx.status.rep_start_fail_count += 1;
            let msg = format!(
                "Standby: Replication state incorrect ({}). Count: {}",
                snap.rep_state, ctx.status.rep_start_fail_count
            );
            ctx.event(EventKind::StateChange, &msg, true);
            Err(down(format!("replication state {}", snap.rep_state)))
        }
        RepState::Recovering | RepState::Idle => Err(Assessment::new(PodAnswer::CatchingUp, false)),
        RepState::Standby => {
            if ctx.status.rep_start_fail_count > 0 {
                ctx.status.rep_start_fail_count = 0;
                ctx.event(
                    EventKind::StateChange,
                    "Standby: Replication started successfully",
                    false,
                );
            }
            if ctx.status.upgrade.in_progress() && ctx.status.pair_state == PairState::Reexamine {
                // Recovering from a failed upgrade; report the role so
                // the reexamine resolution can pair it up.
                return Ok(Assessment::new(PodAnswer::HealthyStandby, true));
            }
            Ok(Assessment::new(PodAnswer::Healthy, true))
        }
        RepState::Unknown => Err(unknown_silent()),
    }
}

/// The (former) active while the pair is in ActiveDown: make sure it
/// cannot come back as a second writer. Stop its replication agent and
/// deactivate it; best effort, the node is dead either way.
pub(super) fn active_down_active(ctx: &mut EvalCtx) -> Assessment {
    match active_down_active_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn active_down_active_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;
    daemon_gate(ctx, down("daemon down"), unknown("daemon unknown"))?;

    match snap.db {
        DbState::None | DbState::Unloading | DbState::Unloaded => {
            return Err(down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    match snap.rep_agent {
        RepAgentState::Running => {
            if let Err(err) = ctx.run(Action::StopRepAgent) {
                return Err(down(err.to_string()));
            }
        }
        RepAgentState::NotRunning => {}
        RepAgentState::Unknown => {
            return Err(unknown(format!("replication agent {}", snap.rep_agent)))
        }
    }

    let _ = ctx.run(Action::RepDeactivate);
    Err(Assessment::new(PodAnswer::Down, false))
}

/// The standby while the pair is in ActiveDown: promote it. Healthy
/// here commissions the failover in the pair table.
pub(super) fn active_down_standby(ctx: &mut EvalCtx) -> Assessment {
    match active_down_standby_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn active_down_standby_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;
    daemon_gate(ctx, down("daemon down"), unknown("daemon unknown"))?;

    match snap.db {
        DbState::None | DbState::Unloading | DbState::Unloaded => {
            return Err(down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    match snap.rep_state {
        RepState::Standby | RepState::Idle => {}
        RepState::Failed | RepState::Recovering | RepState::Active => {
            return Err(down(format!("replication state {}", snap.rep_state)))
        }
        RepState::Unknown => return Err(unknown("replication state unknown")),
    }

    match ctx.run(Action::RepStateSetActive) {
        Err(err) => Err(down(err.to_string())),
        // Promotion issued; confirm on the next tick.
        Ok(()) => Ok(Assessment::new(PodAnswer::Healthy, false)),
    }
}

/// Shared tail for the standby flows that are waiting for replication
/// to reach STANDBY after a duplicate.
fn standby_sync_progress(snap: &crate::observe::PodSnapshot) -> Assessment {
    match snap.rep_state {
        RepState::Active | RepState::Failed => down(format!("replication state {}", snap.rep_state)),
        RepState::Recovering | RepState::Idle => Assessment::new(PodAnswer::CatchingUp, false),
        // Not all the way up yet.
        RepState::Standby => Assessment::new(PodAnswer::Healthy, false),
        RepState::Unknown => unknown_silent(),
    }
}

/// The standby after its database was duplicated and replication
/// started; wait for the replication state to switch to STANDBY.
pub(super) fn standby_starting_standby(ctx: &mut EvalCtx) -> Assessment {
    match standby_starting_standby_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn standby_starting_standby_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown_silent())?;
    daemon_gate(ctx, down("daemon down"), unknown_silent())?;

    match snap.db {
        DbState::None | DbState::Unloading | DbState::Unloaded => {
            return Err(down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Unknown => return Err(unknown_silent()),
        DbState::Loaded => {}
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => return Err(down("replication agent not running")),
        RepAgentState::Unknown => return Err(unknown_silent()),
    }

    Ok(standby_sync_progress(snap))
}

/// Like the starting flow, but entered when the fresh standby is known
/// to be replaying a backlog. Reachability alone decides liveness here;
/// the orchestrator's running bit lags during container restarts.
pub(super) fn standby_catchup_standby(ctx: &mut EvalCtx) -> Assessment {
    match standby_catchup_standby_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn standby_catchup_standby_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    let gate = Gate {
        check_running: false,
        ..Gate::standard()
    };
    liveness_gate(ctx, &gate)?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;
    daemon_gate(ctx, down("daemon down"), unknown("daemon unknown"))?;

    match snap.db {
        DbState::None | DbState::Unloading | DbState::Unloaded => {
            return Err(down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => return Err(down("replication agent not running")),
        RepAgentState::Unknown => return Err(unknown("replication agent unknown")),
    }

    Ok(standby_sync_progress(snap))
}

/// The new active right after a failover: persist its replication
/// state so a restart does not resurrect the old topology.
pub(super) fn takeover_active(ctx: &mut EvalCtx) -> Assessment {
    let _ = ctx.run(Action::RepStateSave);
    Assessment::new(PodAnswer::Healthy, true)
}

/// The standby the active declared dead: make sure it is. Stopping the
/// daemon kills everything in the pod, including any applications
/// attached in direct mode.
pub(super) fn kill_dead_standby(ctx: &mut EvalCtx) -> Assessment {
    if !probes::is_running(ctx.snap()) {
        return Assessment::new(PodAnswer::Down, false);
    }
    let _ = ctx.run(Action::StopDaemon);
    Assessment::new(PodAnswer::Down, false)
}

/// The designated new active while the pair waits for it to come back.
/// Healthy here only means reachable with an instance; configuration
/// happens in the next state.
pub(super) fn waiting_active(ctx: &mut EvalCtx) -> Assessment {
    match waiting_active_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn waiting_active_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;
    Ok(Assessment::new(PodAnswer::Healthy, false))
}

/// While waiting for the active, the standby's state is irrelevant.
pub(super) fn waiting_standby(_ctx: &mut EvalCtx) -> Assessment {
    unknown("waiting for active")
}

/// Both members down. The real decision happens in the both-down
/// routine before the table is ever consulted; each pod just restates
/// its persisted state.
pub(super) fn both_down(ctx: &mut EvalCtx) -> Assessment {
    Assessment::new(ctx.record_ref().state, false)
}

/// After an operator reexamine: classify what this pod actually is
/// now. A sane active, a sane standby, an idle-but-usable database, or
/// broken. The resolution step pairs the two classifications up.
pub(super) fn reexamine(ctx: &mut EvalCtx) -> Assessment {
    match reexamine_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn reexamine_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, down("instance missing"), down("instance unknown"))?;
    daemon_gate(ctx, down("daemon down"), down("daemon unknown"))?;

    if snap.db != DbState::Loaded {
        return Err(down(format!("db {}", snap.db)));
    }
    if !snap.db_open {
        return Err(down("db closed"));
    }

    match snap.rep_scheme {
        RepSchemeState::Exists => {}
        RepSchemeState::None => {
            // A loaded, open database with no replication scheme is
            // usable but idle. If it is the only good database left it
            // is the natural candidate for the new active.
            return if snap.rep_agent == RepAgentState::NotRunning
                && snap.rep_state == RepState::Idle
            {
                Err(Assessment::new(PodAnswer::HealthyIdle, false))
            } else {
                Err(down("no replication scheme"))
            };
        }
        RepSchemeState::Unknown => return Err(down("replication scheme unknown")),
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => return Err(down("replication agent not running")),
        RepAgentState::Unknown => return Err(down("replication agent unknown")),
    }

    let role_answer = match snap.rep_state {
        RepState::Active => PodAnswer::HealthyActive,
        RepState::Standby => PodAnswer::HealthyStandby,
        RepState::Recovering | RepState::Idle | RepState::Failed | RepState::Unknown => {
            return Err(down(format!("replication state {}", snap.rep_state)))
        }
    };

    match snap.rep_peer {
        RepPeerState::Start => Ok(Assessment::new(role_answer, false)),
        _ => Err(down(format!("peer state {}", snap.rep_peer))),
    }
}

/// Configure the new active when it already was the active: recreate
/// the replication scheme if needed, make it active, reopen.
pub(super) fn configure_active_from_active(ctx: &mut EvalCtx) -> Assessment {
    match configure_active_from_active_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn configure_active_from_active_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            if let Err(err) = ctx.run(Action::StartDaemon) {
                return Err(terminal(err.to_string()));
            }
        }
        DaemonState::Unknown => return Err(unknown("daemon unknown")),
    }

    match snap.db {
        DbState::Unloaded => {
            if let Err(err) = ctx.run(Action::LoadDb) {
                return Err(terminal(err.to_string()));
            }
        }
        DbState::None | DbState::Unloading => return Err(down(format!("db {}", snap.db))),
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    match snap.rep_scheme {
        RepSchemeState::Exists => {}
        RepSchemeState::None => {
            if let Err(err) = ctx.run(Action::CreateRepScheme) {
                return Err(terminal(err.to_string()));
            }
            if let Err(err) = ctx.run(Action::CreateRepEpilog) {
                // Optional dressing on the scheme; ignore.
                info!("create replication epilog failed: {}", err);
            }
        }
        RepSchemeState::Unknown => return Err(unknown("replication scheme unknown")),
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => {
            if let Err(err) = ctx.run(Action::StartRepAgent) {
                return Err(terminal(err.to_string()));
            }
        }
        RepAgentState::Unknown => return Err(unknown("replication agent unknown")),
    }

    if let Err(err) = ctx.run(Action::RepStateSetActive) {
        return Err(down(err.to_string()));
    }

    open_db_or_terminal(ctx)?;

    if snap.cache_group_count > 0 {
        return match ctx.run(Action::StartCacheAgent) {
            Err(err) => Err(down(err.to_string())),
            Ok(()) => Ok(Assessment::new(PodAnswer::Healthy, false)),
        };
    }

    Ok(Assessment::new(PodAnswer::Healthy, false))
}

/// Configure the new active when it used to be the standby: unpick the
/// old topology (agents, scheme, cache groups) and rebuild it with
/// this side as the writer.
pub(super) fn configure_active_from_standby(ctx: &mut EvalCtx) -> Assessment {
    match configure_active_from_standby_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn configure_active_from_standby_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            if let Err(err) = ctx.run(Action::StartDaemon) {
                return Err(terminal(err.to_string()));
            }
        }
        DaemonState::Unknown => return Err(unknown("daemon unknown")),
    }

    match snap.db {
        DbState::Unloaded => {
            if let Err(err) = ctx.run(Action::LoadDb) {
                return Err(terminal(err.to_string()));
            }
        }
        DbState::None | DbState::Unloading => return Err(down(format!("db {}", snap.db))),
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    match snap.rep_agent {
        RepAgentState::Running => {
            if let Err(err) = ctx.run(Action::StopRepAgent) {
                return Err(terminal(err.to_string()));
            }
        }
        RepAgentState::NotRunning => {}
        RepAgentState::Unknown => return Err(unknown("replication agent unknown")),
    }

    match snap.cache_agent {
        RepAgentState::Running => {
            if let Err(err) = ctx.run(Action::StopCacheAgent) {
                return Err(terminal(err.to_string()));
            }
        }
        RepAgentState::NotRunning => {}
        RepAgentState::Unknown => return Err(unknown("cache agent unknown")),
    }

    // Drop the old scheme, then rebuild from scratch below. The
    // snapshot is not re-read mid-flow; after a successful drop the
    // scheme is treated as gone.
    match snap.rep_scheme {
        RepSchemeState::Exists => {
            if let Err(err) = ctx.run(Action::DropRepScheme) {
                return Err(terminal(err.to_string()));
            }
        }
        RepSchemeState::None => {}
        RepSchemeState::Unknown => return Err(unknown("replication scheme unknown")),
    }

    if snap.cache_group_count > 0 {
        if let Err(err) = ctx.run(Action::DropCacheGroups) {
            return Err(terminal(err.to_string()));
        }
    }
    if snap.has_cache_groups_file {
        if let Err(err) = ctx.run(Action::CreateCacheGroups) {
            return Err(terminal(err.to_string()));
        }
    }

    if let Err(err) = ctx.run(Action::CreateRepScheme) {
        return Err(terminal(err.to_string()));
    }
    if let Err(err) = ctx.run(Action::CreateRepEpilog) {
        info!("create replication epilog failed: {}", err);
    }

    if let Err(err) = ctx.run(Action::RepStateSetActive) {
        return Err(down(err.to_string()));
    }

    if let Err(err) = ctx.run(Action::StartRepAgent) {
        return Err(terminal(err.to_string()));
    }

    open_db_or_terminal(ctx)?;

    if snap.cache_agent == RepAgentState::NotRunning && snap.cache_group_count > 0 {
        if let Err(err) = ctx.run(Action::StartCacheAgent) {
            return Err(down(err.to_string()));
        }
    }

    Ok(Assessment::new(PodAnswer::Healthy, false))
}

/// The standby side while the active is being configured: nothing to
/// do until the active exists again.
pub(super) fn configure_active_standby(_ctx: &mut EvalCtx) -> Assessment {
    unknown("active not configured yet")
}

/// First-boot configuration of the pair's active member.
pub(super) fn initialize_active(ctx: &mut EvalCtx) -> Assessment {
    match initialize_active_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn initialize_active_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::starting(PodAnswer::Down))?;
    let snap = ctx.snap();

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            return match ctx.run(Action::StartDaemon) {
                Err(err) => Err(terminal(err.to_string())),
                Ok(()) => Err(unknown_silent()),
            };
        }
        DaemonState::Unknown => return Err(unknown("daemon unknown")),
    }

    match snap.db {
        DbState::None => {
            if let Err(err) = ctx.run(Action::CreateDb) {
                return Err(terminal(err.to_string()));
            }
        }
        DbState::Unloading | DbState::Unloaded => return Err(down(format!("db {}", snap.db))),
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    open_db_or_terminal(ctx)?;

    if snap.cache_group_count == 0 && snap.has_cache_groups_file {
        return match ctx.run(Action::CreateCacheGroups) {
            Err(err) => Err(terminal(err.to_string())),
            Ok(()) => Err(unknown_silent()),
        };
    }

    match snap.rep_scheme {
        RepSchemeState::Exists => {}
        RepSchemeState::None => {
            if let Err(err) = ctx.run(Action::CreateRepScheme) {
                return Err(terminal(err.to_string()));
            }
            if let Err(err) = ctx.run(Action::CreateRepEpilog) {
                info!("create replication epilog failed: {}", err);
            }
        }
        RepSchemeState::Unknown => return Err(unknown("replication scheme unknown")),
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => return Err(down("replication agent not running")),
        RepAgentState::Unknown => {
            // The agent state is only unknowable here if the scheme was
            // just created; creating it again is harmless and refreshes
            // the agent's view.
            if let Err(err) = ctx.run(Action::CreateRepScheme) {
                return Err(terminal(err.to_string()));
            }
        }
    }

    match snap.rep_peer {
        RepPeerState::Stop | RepPeerState::Failed | RepPeerState::Pause => {
            Err(unknown(format!("peer state {}", snap.rep_peer)))
        }
        // Wait until next tick to call the pair Normal.
        RepPeerState::Start => Ok(Assessment::new(PodAnswer::Healthy, false)),
        RepPeerState::Unknown => Err(unknown("peer state unknown")),
    }
}

/// First-boot configuration of the pair's standby member: wait for the
/// active, then duplicate from it.
pub(super) fn initialize_standby(ctx: &mut EvalCtx) -> Assessment {
    match initialize_standby_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn initialize_standby_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::starting(PodAnswer::Down))?;
    let snap = ctx.snap();
    let peer_state = ctx.status.pods[ctx.peer()].state;

    instance_gate(ctx, missing_is_terminal(), unknown("instance unknown"))?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            return match ctx.run(Action::StartDaemon) {
                Err(err) => Err(terminal(err.to_string())),
                Ok(()) => Err(unknown_silent()),
            };
        }
        DaemonState::Unknown => return Err(unknown("daemon unknown")),
    }

    match snap.db {
        DbState::None => {
            // Only duplicate once the active is actually serving.
            match peer_state {
                PodAnswer::Healthy | PodAnswer::HealthyActive => {
                    let _ = ctx.run(Action::DestroyDb);
                    match ctx.run(Action::RepDuplicate) {
                        Err(err) => Err(terminal(err.to_string())),
                        Ok(()) => Err(unknown_silent()),
                    }
                }
                PodAnswer::Terminal => Err(terminal("active pod is terminal")),
                // No need to report that the active is not up yet.
                PodAnswer::Down | PodAnswer::OtherDown => {
                    Err(Assessment::new(PodAnswer::Down, false))
                }
                PodAnswer::Unknown | PodAnswer::Initializing => Err(unknown_silent()),
                other => Err(terminal(format!("unexpected peer state {}", other))),
            }
        }
        DbState::Loaded => match snap.rep_agent {
            RepAgentState::Running => match snap.rep_state {
                RepState::Standby => Ok(Assessment::new(PodAnswer::Healthy, false)),
                RepState::Failed | RepState::Recovering | RepState::Active => {
                    Err(down(format!("replication state {}", snap.rep_state)))
                }
                RepState::Idle | RepState::Unknown => {
                    Err(unknown(format!("replication state {}", snap.rep_state)))
                }
            },
            RepAgentState::NotRunning => match ctx.run(Action::StartRepAgent) {
                Err(err) => Err(terminal(err.to_string())),
                Ok(()) => Err(unknown_silent()),
            },
            RepAgentState::Unknown => Err(unknown("replication agent unknown")),
        },
        DbState::Unloaded => Err(down("db Unloaded")),
        DbState::Loading | DbState::Transitioning | DbState::Unloading | DbState::Unknown => {
            Err(unknown(format!("db {}", snap.db)))
        }
    }
}
