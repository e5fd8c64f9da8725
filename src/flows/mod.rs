//! Per-pod flowchart evaluators.
//!
//! One evaluator exists per (topology, pair state, intended role)
//! combination; [`select_flow`] picks which one runs on a pod this
//! tick. Every evaluator shares the same evaluation order: liveness
//! gate first (running, reachable, quiescing), then instance, daemon,
//! database, and replication layers, each either passing through,
//! answering early, or issuing a single remediation action. The shared
//! pieces live in [`checks`].

mod checks;
mod pair;
mod standalone;
mod subscriber;

use crate::actions::{
    Action, ActionError, ActionParams, ActionRunner, AgentGateway, EventKind, EventSink,
};
use crate::answer::Assessment;
use crate::config::Config;
use crate::observe::{PodKind, PodSnapshot};
use crate::state::{PairState, Role};
use crate::status::{PodRecord, ReconcileStatus};
use crate::upgrade::TaskStatus;
use log::debug;

/// Everything an evaluator may look at or act through during one tick.
pub struct EvalCtx<'a> {
    /// Index of the pod under evaluation.
    pub pod: usize,
    /// This tick's snapshots, one per pod, index-aligned with the
    /// status records. Read-only for the whole tick.
    pub snaps: &'a [PodSnapshot],
    pub status: &'a mut ReconcileStatus,
    pub runner: &'a mut dyn ActionRunner,
    pub agent: &'a mut dyn AgentGateway,
    pub events: &'a mut dyn EventSink,
    pub cfg: &'a Config,
    pub now: u64,
}

impl<'a> EvalCtx<'a> {
    pub fn snap(&self) -> &'a PodSnapshot {
        &self.snaps[self.pod]
    }

    pub fn peer(&self) -> usize {
        if self.pod == 0 {
            1
        } else {
            0
        }
    }

    pub fn record(&mut self) -> &mut PodRecord {
        &mut self.status.pods[self.pod]
    }

    pub fn record_ref(&self) -> &PodRecord {
        &self.status.pods[self.pod]
    }

    pub fn run(&mut self, action: Action) -> Result<(), ActionError> {
        self.runner.run(self.pod, action, &ActionParams::new())
    }

    /// Open the database by name.
    pub fn run_open_db(&mut self) -> Result<(), ActionError> {
        let mut params = ActionParams::new();
        params.insert("dbName".to_string(), self.status.name.clone());
        self.runner.run(self.pod, Action::OpenDb, &params)
    }

    pub fn event(&mut self, kind: EventKind, message: &str, warning: bool) {
        self.events.publish(kind, message, warning);
    }
}

/// An evaluator: total over its inputs, returns exactly one assessment.
pub type Flow = fn(&mut EvalCtx) -> Assessment;

/// Pick the flow to run on one pod given the pair state and the pod's
/// own persisted state. `None` means no flow runs this tick (manual
/// intervention, or a state with nothing to do for this role).
pub fn select_flow(
    cfg: &Config,
    status: &ReconcileStatus,
    pod: usize,
) -> Option<(&'static str, Flow)> {
    let record = &status.pods[pod];

    if record.kind == PodKind::Subscriber {
        return select_subscriber_flow(record);
    }

    if !cfg.replicated {
        return select_standalone_flow(record);
    }

    use PairState as S;
    let picked: Option<(&'static str, Flow)> = match status.pair_state {
        S::ConfiguringActive => match record.intended {
            Role::Active => {
                if record.prev_intended == Role::Standby {
                    Some((
                        "configure_active_from_standby",
                        pair::configure_active_from_standby as Flow,
                    ))
                } else {
                    Some((
                        "configure_active_from_active",
                        pair::configure_active_from_active as Flow,
                    ))
                }
            }
            Role::Standby => Some(("configure_active_standby", pair::configure_active_standby)),
            Role::Unassigned => None,
        },
        S::Normal => match record.intended {
            Role::Active => Some(("normal_active", pair::normal_active as Flow)),
            Role::Standby => Some(("normal_standby", pair::normal_standby)),
            Role::Unassigned => None,
        },
        S::BothDown => Some(("both_down", pair::both_down as Flow)),
        S::StandbyDown => match record.intended {
            Role::Active => Some(("normal_active", pair::normal_active as Flow)),
            Role::Standby => Some(("standby_down_standby", pair::standby_down_standby)),
            Role::Unassigned => None,
        },
        S::ActiveTakeover => match record.intended {
            Role::Active => Some(("takeover_active", pair::takeover_active as Flow)),
            Role::Standby => Some(("kill_dead_standby", pair::kill_dead_standby)),
            Role::Unassigned => None,
        },
        S::StandbyStarting => match record.intended {
            Role::Active => Some(("normal_active", pair::normal_active as Flow)),
            Role::Standby => Some((
                "standby_starting_standby",
                pair::standby_starting_standby,
            )),
            Role::Unassigned => None,
        },
        S::StandbyCatchup => match record.intended {
            Role::Active => Some(("normal_active", pair::normal_active as Flow)),
            Role::Standby => Some(("standby_catchup_standby", pair::standby_catchup_standby)),
            Role::Unassigned => None,
        },
        S::Reexamine => {
            if status.upgrade.in_progress() {
                match record.intended {
                    // The active side sat out the failed standby
                    // upgrade; only the standby needs attention.
                    Role::Active => None,
                    Role::Standby => {
                        if status.upgrade.standby_status == Some(TaskStatus::CatchingUp) {
                            Some(("reexamine", pair::reexamine as Flow))
                        } else {
                            Some(("standby_down_standby", pair::standby_down_standby))
                        }
                    }
                    Role::Unassigned => None,
                }
            } else {
                Some(("reexamine", pair::reexamine as Flow))
            }
        }
        S::ManualInterventionRequired => {
            debug!("pair requires manual intervention; running no flow");
            None
        }
        S::WaitingForActive => match record.intended {
            Role::Active => Some(("waiting_active", pair::waiting_active as Flow)),
            Role::Standby => Some(("waiting_standby", pair::waiting_standby)),
            Role::Unassigned => None,
        },
        S::OneDown => None,
        S::ActiveDown => match record.intended {
            Role::Active => Some(("active_down_active", pair::active_down_active as Flow)),
            Role::Standby => Some(("active_down_standby", pair::active_down_standby)),
            Role::Unassigned => None,
        },
        S::Initializing => match record.intended {
            Role::Active => Some(("initialize_active", pair::initialize_active as Flow)),
            Role::Standby => Some(("initialize_standby", pair::initialize_standby)),
            Role::Unassigned => None,
        },
        S::Failed => None,
    };
    picked
}

fn select_standalone_flow(record: &PodRecord) -> Option<(&'static str, Flow)> {
    use crate::answer::PodAnswer as A;
    match record.state {
        A::Initializing => Some(("standalone_initializing", standalone::initializing as Flow)),
        A::Normal => Some(("standalone_normal", standalone::normal)),
        A::Terminal => Some(("standalone_terminal", standalone::terminal)),
        A::Down => Some(("standalone_down", standalone::down)),
        A::Reexamine => Some(("standalone_reexamine", standalone::reexamine)),
        A::ManualInterventionRequired => {
            debug!("pod {} requires manual intervention", record.name);
            None
        }
        _ => None,
    }
}

fn select_subscriber_flow(record: &PodRecord) -> Option<(&'static str, Flow)> {
    use crate::answer::PodAnswer as A;
    match record.state {
        A::Normal => Some(("subscriber_normal", subscriber::normal as Flow)),
        A::NotProvisioned => Some(("subscriber_not_provisioned", subscriber::not_provisioned)),
        A::Down => Some(("subscriber_repair", subscriber::repair)),
        A::Terminal | A::UpgradeFailed => Some(("subscriber_resync", subscriber::resync)),
        A::CatchingUp => Some(("subscriber_resync", subscriber::resync)),
        A::Initializing => Some(("subscriber_initializing", subscriber::initializing)),
        _ => None,
    }
}
