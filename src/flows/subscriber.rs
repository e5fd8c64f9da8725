//! Evaluators for read-only subscriber replicas.
//!
//! Subscribers repair themselves the same way a dead standby does
//! (destroy, duplicate from the pair, restart replication), but only
//! while the pair itself is Normal; duplicating from a broken pair
//! would copy the problem.

use super::checks::{
    self, daemon_gate, instance_gate, liveness_gate, open_db_or_terminal,
    start_rep_agent_on_standby, Gate,
};
use super::EvalCtx;
use crate::actions::Action;
use crate::answer::{Assessment, PodAnswer};
use crate::observe::{DaemonState, DbState, RepAgentState, RepSchemeState};
use crate::state::PairState;

/// A subscriber slot that has no pod yet.
pub(super) fn not_provisioned(ctx: &mut EvalCtx) -> Assessment {
    if !crate::probes::is_running(ctx.snap()) {
        Assessment::new(PodAnswer::NotProvisioned, false)
    } else {
        Assessment::new(PodAnswer::Down, false)
    }
}

/// Steady-state check of a healthy subscriber.
pub(super) fn normal(ctx: &mut EvalCtx) -> Assessment {
    match normal_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn normal_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(
        ctx,
        checks::missing_is_terminal(),
        checks::unknown("instance unknown"),
    )?;
    daemon_gate(
        ctx,
        checks::down("daemon down"),
        checks::unknown("daemon unknown"),
    )?;

    match snap.db {
        DbState::None => return Err(checks::down("no database")),
        DbState::Unloading | DbState::Unloaded => {
            return Err(checks::down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(checks::unknown(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    if !snap.db_open {
        return Err(checks::down("db closed"));
    }

    match snap.rep_scheme {
        RepSchemeState::None => return Err(checks::down("no replication scheme")),
        RepSchemeState::Exists => {}
        RepSchemeState::Unknown => return Err(checks::unknown("replication scheme unknown")),
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => return Err(checks::down("replication agent not running")),
        RepAgentState::Unknown => return Err(checks::unknown("replication agent unknown")),
    }

    Ok(Assessment::new(PodAnswer::Normal, true))
}

/// Repair a subscriber last seen Down. The eager shape: an unloaded
/// leftover database is also rebuilt, and a successful duplicate keeps
/// going in the same tick.
pub(super) fn repair(ctx: &mut EvalCtx) -> Assessment {
    match recover_inner(ctx, true) {
        Ok(a) | Err(a) => a,
    }
}

/// Re-sync a subscriber that is catching up or came out of a failed
/// state. The cautious shape: only a missing database triggers a
/// duplicate, and a fresh duplicate waits a tick before re-checking.
pub(super) fn resync(ctx: &mut EvalCtx) -> Assessment {
    match recover_inner(ctx, false) {
        Ok(a) | Err(a) => a,
    }
}

fn recover_inner(ctx: &mut EvalCtx, eager: bool) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    instance_gate(
        ctx,
        checks::missing_is_terminal(),
        checks::unknown("instance unknown"),
    )?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            if let Err(err) = ctx.run(Action::StartDaemon) {
                return Err(checks::terminal(err.to_string()));
            }
        }
        DaemonState::Unknown => return Err(checks::unknown("daemon unknown")),
    }

    let rebuildable = snap.db == DbState::None || (eager && snap.db == DbState::Unloaded);
    if rebuildable {
        if ctx.status.pair_state == PairState::Normal {
            // Destroy whatever half-state remains, then copy fresh.
            let _ = ctx.run(Action::DestroyDb);
            if let Err(err) = ctx.run(Action::RepDuplicate) {
                return Err(checks::terminal(err.to_string()));
            }
            if !eager {
                return Err(checks::unknown_silent());
            }
        } else {
            return Err(checks::down(format!("db {}", snap.db)));
        }
    } else {
        match snap.db {
            DbState::None | DbState::Unloading | DbState::Unloaded => {
                return Err(checks::down(format!("db {}", snap.db)))
            }
            DbState::Loading | DbState::Transitioning | DbState::Unknown => {
                return Err(checks::unknown(format!("db {}", snap.db)))
            }
            DbState::Loaded => {}
        }
    }

    match snap.rep_scheme {
        RepSchemeState::None => {
            if eager {
                return Err(checks::down("no replication scheme"));
            }
        }
        RepSchemeState::Exists => {
            if !eager {
                return Err(checks::down("unexpected replication scheme"));
            }
        }
        RepSchemeState::Unknown => return Err(checks::unknown("replication scheme unknown")),
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => {
            start_rep_agent_on_standby(ctx, "Subscriber")?;
        }
        RepAgentState::Unknown => return Err(checks::unknown("replication agent unknown")),
    }

    open_db_or_terminal(ctx)?;

    Ok(Assessment::new(PodAnswer::Normal, true))
}

/// First boot of a subscriber: wait for the pair, duplicate from it.
pub(super) fn initializing(ctx: &mut EvalCtx) -> Assessment {
    match initializing_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn initializing_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::starting(PodAnswer::Initializing))?;
    let snap = ctx.snap();

    instance_gate(
        ctx,
        checks::missing_is_terminal(),
        Assessment::new(PodAnswer::Initializing, false),
    )?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            return match ctx.run(Action::StartDaemon) {
                Err(err) => Err(checks::terminal(err.to_string())),
                Ok(()) => Err(Assessment::new(PodAnswer::Initializing, false)),
            };
        }
        DaemonState::Unknown => {
            return Err(Assessment::diag(
                PodAnswer::Initializing,
                false,
                "daemon unknown",
            ))
        }
    }

    match snap.db {
        DbState::None => {
            if ctx.status.pair_state == PairState::Normal {
                let _ = ctx.run(Action::DestroyDb);
                if let Err(err) = ctx.run(Action::RepDuplicate) {
                    return Err(checks::terminal(err.to_string()));
                }
            } else {
                // No sense duplicating from a pair that is not ready.
                return Err(Assessment::diag(
                    PodAnswer::Initializing,
                    false,
                    format!("pair state {}", ctx.status.pair_state),
                ));
            }
        }
        DbState::Unloading | DbState::Unloaded => {
            return Err(checks::down(format!("db {}", snap.db)))
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(Assessment::diag(
                PodAnswer::Initializing,
                false,
                format!("db {}", snap.db),
            ))
        }
        DbState::Loaded => {}
    }

    match snap.rep_scheme {
        RepSchemeState::None => {}
        RepSchemeState::Exists => return Err(checks::down("unexpected replication scheme")),
        RepSchemeState::Unknown => {
            return Err(Assessment::diag(
                PodAnswer::Initializing,
                false,
                "replication scheme unknown",
            ))
        }
    }

    match snap.rep_agent {
        RepAgentState::Running => {}
        RepAgentState::NotRunning => {
            start_rep_agent_on_standby(ctx, "Subscriber")?;
        }
        RepAgentState::Unknown => {
            return Err(Assessment::diag(
                PodAnswer::Initializing,
                false,
                "replication agent unknown",
            ))
        }
    }

    open_db_or_terminal(ctx)?;

    Ok(Assessment::new(PodAnswer::Normal, true))
}
