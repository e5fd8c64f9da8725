//! Evaluators for standalone (non-replicated) members.

use super::checks::{self, instance_gate, liveness_gate, open_db_or_terminal, Gate};
use super::EvalCtx;
use crate::actions::{Action, EventKind};
use crate::answer::{Assessment, PodAnswer};
use crate::observe::{DaemonState, DbState, RepSchemeState};
use log::debug;

fn manual(msg: impl Into<String>) -> Assessment {
    Assessment::diag(PodAnswer::ManualInterventionRequired, false, msg)
}

/// First boot of a standalone member: start the daemon, create and open
/// the database, load any cache groups.
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
        checks::terminal("instance missing"),
        Assessment::new(PodAnswer::Initializing, false),
    )?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            if let Err(err) = ctx.run(Action::StartDaemon) {
                return Err(checks::terminal(err.to_string()));
            }
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
            if let Err(err) = ctx.run(Action::CreateDb) {
                return Err(checks::terminal(err.to_string()));
            }
        }
        // No reason a fresh database would be unloaded already.
        DbState::Unloading | DbState::Unloaded => {
            return Err(checks::terminal(format!("db {}", snap.db)))
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

    open_db_or_terminal(ctx)?;

    if snap.cache_group_count == 0 && snap.has_cache_groups_file {
        if let Err(err) = ctx.run(Action::CreateCacheGroups) {
            return Err(checks::terminal(err.to_string()));
        }
    }

    Ok(Assessment::new(PodAnswer::Normal, true))
}

/// Steady-state check of a standalone member. This role tolerates an
/// unreachable-but-not-yet-timed-out pod by keeping it Normal; a blip
/// in the agent should not flap readiness.
pub(super) fn normal(ctx: &mut EvalCtx) -> Assessment {
    match normal_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn normal_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    let gate = Gate {
        on_not_running: checks::down("pod not running"),
        on_unreachable: Assessment::new(PodAnswer::Normal, true),
        apply_timeout: true,
        check_running: true,
    };
    liveness_gate(ctx, &gate)?;
    let snap = ctx.snap();

    instance_gate(
        ctx,
        checks::terminal("instance missing"),
        Assessment::diag(PodAnswer::Normal, true, "instance unknown"),
    )?;
    checks::daemon_gate(
        ctx,
        checks::down("daemon down"),
        Assessment::diag(PodAnswer::Normal, true, "daemon unknown"),
    )?;

    match snap.db {
        DbState::None
        | DbState::Unloading
        | DbState::Unloaded
        | DbState::Loading
        | DbState::Transitioning => return Err(checks::down(format!("db {}", snap.db))),
        DbState::Unknown => return Err(Assessment::diag(PodAnswer::Normal, true, "db unknown")),
        DbState::Loaded => {}
    }

    if !snap.db_open {
        return Err(checks::down("db closed"));
    }

    match snap.rep_scheme {
        RepSchemeState::None => {}
        RepSchemeState::Exists => return Err(checks::down("unexpected replication scheme")),
        RepSchemeState::Unknown => {
            return Err(Assessment::diag(
                PodAnswer::Normal,
                true,
                "replication scheme unknown",
            ))
        }
    }

    Ok(Assessment::new(PodAnswer::Normal, true))
}

/// A standalone member that went down: restart what can be restarted.
pub(super) fn down(ctx: &mut EvalCtx) -> Assessment {
    match down_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn down_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    let gate = Gate {
        on_not_running: checks::down("pod not running"),
        // Last time we saw it, it was down; it still is.
        on_unreachable: Assessment::new(PodAnswer::Down, false),
        apply_timeout: true,
        check_running: true,
    };
    liveness_gate(ctx, &gate)?;
    let snap = ctx.snap();

    // A failed in-place upgrade leaves a marker in the pod; nothing
    // here is automatically repairable until an operator reexamines.
    if snap.upgrade_failed_marker {
        let msg = format!("Upgrade failed on pod {}", ctx.record_ref().name);
        ctx.event(EventKind::UpgradeError, &msg, true);
        return Err(manual(msg));
    }

    instance_gate(ctx, checks::terminal("instance missing"), checks::down("instance unknown"))?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            return match ctx.run(Action::StartDaemon) {
                Err(err) => Err(checks::terminal(err.to_string())),
                Ok(()) => Err(Assessment::new(PodAnswer::Down, false)),
            };
        }
        DaemonState::Unknown => return Err(checks::down("daemon unknown")),
    }

    match snap.db {
        DbState::None => return Err(checks::terminal("no database, where did it go?")),
        DbState::Unloading => return Err(checks::down(format!("db {}", snap.db))),
        DbState::Unloaded => {
            debug!("db unloaded, loading it");
            if let Err(err) = ctx.run(Action::LoadDb) {
                return Err(manual(err.to_string()));
            }
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(checks::down(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    if !snap.db_open {
        if let Err(err) = ctx.run_open_db() {
            return Err(manual(err.to_string()));
        }
    }

    Ok(Assessment::new(PodAnswer::Normal, true))
}

/// Terminal is forever for a standalone member.
pub(super) fn terminal(_ctx: &mut EvalCtx) -> Assessment {
    Assessment::new(PodAnswer::Terminal, false)
}

/// The operator says they fixed it; find out. Healthy flips back to
/// Normal, anything wrong flips back to manual intervention.
pub(super) fn reexamine(ctx: &mut EvalCtx) -> Assessment {
    match reexamine_inner(ctx) {
        Ok(a) | Err(a) => a,
    }
}

fn reexamine_inner(ctx: &mut EvalCtx) -> Result<Assessment, Assessment> {
    liveness_gate(ctx, &Gate::standard())?;
    let snap = ctx.snap();

    if snap.upgrade_failed_marker {
        if snap.image_release == snap.release {
            // The image matches what is installed again; the marker is
            // stale and can go.
            if let Err(err) = ctx.run(Action::RemoveUpgradeFailedMarker) {
                return Err(manual(err.to_string()));
            }
        } else {
            let msg = format!("Upgrade failed on pod {}", ctx.record_ref().name);
            ctx.event(EventKind::UpgradeError, &msg, true);
            return Err(manual(msg));
        }
    }

    instance_gate(ctx, checks::terminal("instance missing"), checks::down("instance unknown"))?;

    match snap.daemon {
        DaemonState::Up => {}
        DaemonState::Down => {
            return match ctx.run(Action::StartDaemon) {
                Err(err) => Err(checks::terminal(err.to_string())),
                Ok(()) => Err(Assessment::new(PodAnswer::Down, false)),
            };
        }
        DaemonState::Unknown => return Err(checks::down("daemon unknown")),
    }

    match snap.db {
        DbState::None => return Err(checks::terminal("no database, where did it go?")),
        DbState::Unloading => return Err(checks::down(format!("db {}", snap.db))),
        DbState::Unloaded => {
            if let Err(err) = ctx.run(Action::LoadDb) {
                return Err(manual(err.to_string()));
            }
            return Err(checks::down(format!("db {}", snap.db)));
        }
        DbState::Loading | DbState::Transitioning | DbState::Unknown => {
            return Err(checks::down(format!("db {}", snap.db)))
        }
        DbState::Loaded => {}
    }

    open_db_or_terminal(ctx)?;

    Ok(Assessment::new(PodAnswer::Normal, true))
}
