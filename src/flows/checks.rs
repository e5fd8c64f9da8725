//! Shared check pipeline for the evaluators.
//!
//! Helpers return `Err(Assessment)` when the evaluation is over, so
//! evaluator bodies read as a straight line of `?`s: the first check
//! that decides the tick short-circuits out.

use super::EvalCtx;
use crate::actions::{Action, EventKind};
use crate::answer::{Assessment, PodAnswer};
use crate::observe::{DaemonState, InstanceState};
use crate::probes;

/// How the leading liveness checks answer for a given role.
pub(super) struct Gate {
    /// Answer when the orchestrator does not report the pod running.
    pub on_not_running: Assessment,
    /// Answer while the pod is unreachable but not yet timed out.
    pub on_unreachable: Assessment,
    /// Start-up flows never time out a pod that has not yet spoken.
    pub apply_timeout: bool,
    /// One flow intentionally skips the running check and lets
    /// reachability speak for both.
    pub check_running: bool,
}

impl Gate {
    /// The shape most steady-state flows use: not running is Down,
    /// unreachable waits as Unknown until the timeout says Down.
    pub fn standard() -> Self {
        Gate {
            on_not_running: Assessment::diag(PodAnswer::Down, false, "pod not running"),
            on_unreachable: Assessment::new(PodAnswer::Unknown, false),
            apply_timeout: true,
            check_running: true,
        }
    }

    /// Start-up shape: a pod that has never been reachable is still
    /// booting, not overdue.
    pub fn starting(answer: PodAnswer) -> Self {
        Gate {
            on_not_running: Assessment::new(answer, false),
            on_unreachable: Assessment::new(answer, false),
            apply_timeout: false,
            check_running: true,
        }
    }
}

/// The first three steps of every evaluator: running, reachable (with the
/// unreachable timeout), quiescing. Quiescing always wins: the answer
/// is Unknown and no action may be taken, whatever else the snapshot
/// says.
pub(super) fn liveness_gate(ctx: &mut EvalCtx, gate: &Gate) -> Result<(), Assessment> {
    let (cfg, now) = (ctx.cfg, ctx.now);
    let snap = ctx.snap();
    if gate.check_running && !probes::is_running(snap) {
        return Err(gate.on_not_running.clone());
    }
    if probes::is_reachable(snap, ctx.record(), now).is_err() {
        if gate.apply_timeout {
            if let Some(elapsed) = probes::unreachable_timeout_exceeded(ctx.record_ref(), cfg, now)
            {
                return Err(Assessment::diag(
                    PodAnswer::Down,
                    false,
                    format!("unreachable for {} seconds", elapsed),
                ));
            }
        }
        return Err(gate.on_unreachable.clone());
    }
    if probes::is_quiescing(snap, ctx.record(), now) {
        return Err(Assessment::quiescing());
    }
    Ok(())
}

/// The on-disk instance. Missing is non-recoverable for every role
/// that does not override it; Unknown is the role's "not yet known"
/// answer.
pub(super) fn instance_gate(
    ctx: &EvalCtx,
    on_missing: Assessment,
    on_unknown: Assessment,
) -> Result<(), Assessment> {
    match ctx.snap().instance {
        InstanceState::Exists => Ok(()),
        InstanceState::Missing => Err(on_missing),
        InstanceState::Unknown => Err(on_unknown),
    }
}

/// Missing instance: the on-disk instance vanished; a human must look.
pub(super) fn missing_is_terminal() -> Assessment {
    Assessment::diag(PodAnswer::Terminal, false, "instance missing")
}

/// The daemon check for flows that only observe it.
pub(super) fn daemon_gate(
    ctx: &EvalCtx,
    on_down: Assessment,
    on_unknown: Assessment,
) -> Result<(), Assessment> {
    match ctx.snap().daemon {
        DaemonState::Up => Ok(()),
        DaemonState::Down => Err(on_down),
        DaemonState::Unknown => Err(on_unknown),
    }
}

/// A loaded database that will not open cannot be repaired
/// automatically any further.
pub(super) fn open_db_or_terminal(ctx: &mut EvalCtx) -> Result<(), Assessment> {
    if ctx.snap().db_open {
        return Ok(());
    }
    match ctx.run_open_db() {
        Ok(()) => Ok(()),
        Err(err) => Err(Assessment::diag(
            PodAnswer::Terminal,
            false,
            format!("open failed: {}", err),
        )),
    }
}

/// The standby-side replication restart, shared by every flow that
/// brings a replica back: bumps the fail counter and abandons the
/// recovery task on failure.
pub(super) fn start_rep_agent_on_standby(ctx: &mut EvalCtx, who: &str) -> Result<(), Assessment> {
    match ctx.run(Action::StartRepAgent) {
        Ok(()) => {
            ctx.status.recovery.start_rep_agent = true;
            Ok(())
        }
        Err(err) => {
            ctx.status.rep_start_fail_count += 1;
            ctx.status.recovery.phase = crate::status::TaskPhase::Complete;
            let msg = format!(
                "{}: Starting replication failed. Count: {}",
                who, ctx.status.rep_start_fail_count
            );
            ctx.event(EventKind::StateChange, &msg, true);
            Err(Assessment::diag(PodAnswer::Down, false, err.to_string()))
        }
    }
}

pub(super) fn down(msg: impl Into<String>) -> Assessment {
    Assessment::diag(PodAnswer::Down, false, msg)
}

pub(super) fn unknown(msg: impl Into<String>) -> Assessment {
    Assessment::diag(PodAnswer::Unknown, false, msg)
}

pub(super) fn unknown_silent() -> Assessment {
    Assessment::new(PodAnswer::Unknown, false)
}

pub(super) fn terminal(msg: impl Into<String>) -> Assessment {
    Assessment::diag(PodAnswer::Terminal, false, msg)
}
