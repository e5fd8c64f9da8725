//! The pair-level and upgrade-level transition tables.
//!
//! Both tables are finite literal specifications: built once by a pure
//! constructor, injected into the engine that consults them, and never
//! mutated afterwards. A lookup is total over the declared domain; a
//! cell with no entry is an explicit [`Outcome::Unmapped`] /
//! [`UpgradeOutcome::Unmapped`] that callers must log as an anomaly and
//! resolve to manual intervention, never a panic.
//!
//! Several cells look asymmetric next to their neighbors (for example
//! `StandbyDown[Down][CatchingUp]` escalating straight to `Failed`
//! while nearby catching-up cells park in `StandbyStarting`). Those
//! asymmetries are deliberate, earned in production incidents; tests
//! pin them so they do not get "repaired" in a refactor.

use crate::answer::PodAnswer;
use crate::state::PairState;
use crate::upgrade::{TaskStatus, UpgradePhase};
use std::collections::HashMap;

/// Result of a pair-table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Next(PairState),
    /// Promote the standby: flip the intended roles and take over.
    /// This table is the sole place failover is ever commissioned.
    Failover,
    /// No entry. A reachable unmapped cell is a logic bug; the caller
    /// logs it and falls back to manual intervention.
    Unmapped,
}

/// Answers that participate in the replicated pair table.
pub const PAIR_ANSWER_DOMAIN: [PodAnswer; 9] = [
    PodAnswer::Healthy,
    PodAnswer::Down,
    PodAnswer::OtherDown,
    PodAnswer::Unknown,
    PodAnswer::Terminal,
    PodAnswer::UpgradeFailed,
    PodAnswer::CatchingUp,
    PodAnswer::HealthyActive,
    PodAnswer::HealthyStandby,
];

/// `(current pair state, active answer, standby answer) -> outcome`.
#[derive(Debug)]
pub struct PairTable {
    cells: HashMap<(PairState, PodAnswer, PodAnswer), Outcome>,
}

impl PairTable {
    pub fn next(&self, state: PairState, active: PodAnswer, standby: PodAnswer) -> Outcome {
        self.cells
            .get(&(state, active, standby))
            .copied()
            .unwrap_or(Outcome::Unmapped)
    }

    pub fn new() -> Self {
        use PairState as S;
        use PodAnswer::{
            CatchingUp as C, Down as D, Healthy as H, OtherDown as OD, Terminal as T,
            Unknown as U, UpgradeFailed as UF,
        };

        let mut cells = HashMap::new();
        let mut set = |s: S, a: PodAnswer, b: PodAnswer, o: Outcome| {
            cells.insert((s, a, b), o);
        };
        let next = Outcome::Next;

        // Failed is a one-way trip: every answer pair stays Failed.
        for a in PAIR_ANSWER_DOMAIN {
            for b in PAIR_ANSWER_DOMAIN {
                set(S::Failed, a, b, next(S::Failed));
            }
        }

        set(S::Initializing, H, H, next(S::Normal));
        set(S::Initializing, H, D, next(S::Initializing));
        set(S::Initializing, H, OD, next(S::Initializing));
        set(S::Initializing, H, U, next(S::Initializing));
        set(S::Initializing, H, T, next(S::Failed));
        set(S::Initializing, D, H, next(S::Initializing));
        set(S::Initializing, D, D, next(S::Initializing));
        set(S::Initializing, D, OD, next(S::Initializing));
        set(S::Initializing, D, U, next(S::Initializing));
        set(S::Initializing, D, T, next(S::Failed));
        set(S::Initializing, OD, H, next(S::Initializing));
        set(S::Initializing, OD, D, next(S::Initializing));
        set(S::Initializing, OD, OD, next(S::Initializing));
        set(S::Initializing, OD, U, next(S::Initializing));
        set(S::Initializing, OD, T, next(S::Failed));
        set(S::Initializing, U, H, next(S::Initializing));
        set(S::Initializing, U, D, next(S::Initializing));
        set(S::Initializing, U, OD, next(S::Initializing));
        set(S::Initializing, U, U, next(S::Initializing));
        set(S::Initializing, U, T, next(S::Failed));
        set(S::Initializing, U, C, next(S::Failed));
        set(S::Initializing, T, H, next(S::Failed));
        set(S::Initializing, T, D, next(S::Failed));
        set(S::Initializing, T, OD, next(S::Failed));
        set(S::Initializing, T, U, next(S::Failed));
        set(S::Initializing, T, T, next(S::Failed));
        set(S::Initializing, T, C, next(S::Failed));
        set(S::Initializing, C, H, next(S::Failed));
        set(S::Initializing, C, D, next(S::Failed));
        set(S::Initializing, C, OD, next(S::Failed));
        set(S::Initializing, C, U, next(S::Failed));
        set(S::Initializing, C, T, next(S::Failed));
        set(S::Initializing, C, C, next(S::Failed));
        // Initializing[Down|OtherDown][CatchingUp] intentionally unmapped.

        set(S::StandbyStarting, H, H, next(S::Normal));
        set(S::StandbyStarting, H, D, next(S::StandbyDown));
        set(S::StandbyStarting, H, OD, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, H, U, next(S::StandbyStarting));
        set(S::StandbyStarting, H, T, next(S::StandbyDown));
        set(S::StandbyStarting, H, C, next(S::StandbyCatchup));
        set(S::StandbyStarting, D, H, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, D, D, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, D, OD, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, D, U, next(S::StandbyStarting));
        set(S::StandbyStarting, D, T, next(S::ManualInterventionRequired));
        // A catching-up standby is not the best copy; we must wait for
        // the active to come back or we lose data. Human decides.
        set(S::StandbyStarting, D, C, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, OD, H, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, OD, D, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, OD, OD, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, OD, U, next(S::StandbyStarting));
        set(S::StandbyStarting, OD, T, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, OD, C, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, U, H, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, U, D, next(S::StandbyStarting));
        set(S::StandbyStarting, U, OD, next(S::StandbyStarting));
        set(S::StandbyStarting, U, U, next(S::StandbyStarting));
        set(S::StandbyStarting, U, T, next(S::StandbyStarting));
        set(S::StandbyStarting, U, C, next(S::StandbyStarting));
        set(S::StandbyStarting, T, H, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, T, D, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, T, OD, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, T, U, next(S::StandbyStarting));
        set(S::StandbyStarting, T, T, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, T, C, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, C, H, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, C, D, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, C, OD, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, C, U, next(S::StandbyStarting));
        set(S::StandbyStarting, C, T, next(S::ManualInterventionRequired));
        set(S::StandbyStarting, C, C, next(S::ManualInterventionRequired));

        // The BothDown row is never consulted at runtime: the both-down
        // decision routine preempts the lookup and routes to
        // WaitingForActive or ManualInterventionRequired itself. The
        // entries exist to keep the table total.
        for a in [H, D, OD, U, T, C] {
            for b in [H, D, OD, U, T, C] {
                set(S::BothDown, a, b, next(S::ManualInterventionRequired));
            }
        }
        // Stay where we are until we know more.
        set(S::BothDown, D, U, next(S::BothDown));

        for a in [H, D, OD, U, T, C] {
            for b in [H, D, OD, U, T, C] {
                set(S::OneDown, a, b, next(S::ManualInterventionRequired));
            }
        }

        set(S::StandbyDown, H, H, next(S::Normal));
        set(S::StandbyDown, H, D, next(S::StandbyDown));
        set(S::StandbyDown, H, OD, next(S::ActiveDown));
        set(S::StandbyDown, H, U, next(S::StandbyDown));
        set(S::StandbyDown, H, T, next(S::ManualInterventionRequired));
        set(S::StandbyDown, H, C, next(S::StandbyStarting));
        // StandbyDown is the holding state during upgrades; a patch
        // incompatibility on either side surfaces here.
        set(S::StandbyDown, H, UF, next(S::ManualInterventionRequired));
        set(S::StandbyDown, UF, H, next(S::ManualInterventionRequired));
        set(S::StandbyDown, D, H, next(S::ActiveDown));
        set(S::StandbyDown, D, D, next(S::BothDown));
        set(S::StandbyDown, D, OD, next(S::ActiveDown));
        set(S::StandbyDown, D, U, next(S::StandbyDown));
        set(S::StandbyDown, D, T, next(S::ManualInterventionRequired));
        set(S::StandbyDown, D, C, next(S::Failed));
        set(S::StandbyDown, OD, H, next(S::StandbyDown));
        set(S::StandbyDown, OD, D, next(S::StandbyDown));
        set(S::StandbyDown, OD, OD, next(S::ManualInterventionRequired));
        set(S::StandbyDown, OD, U, next(S::StandbyDown));
        set(S::StandbyDown, OD, T, next(S::ManualInterventionRequired));
        set(S::StandbyDown, OD, C, next(S::StandbyStarting));
        set(S::StandbyDown, U, H, next(S::StandbyDown));
        set(S::StandbyDown, U, D, next(S::StandbyDown));
        set(S::StandbyDown, U, OD, next(S::StandbyDown));
        set(S::StandbyDown, U, U, next(S::StandbyDown));
        set(S::StandbyDown, U, T, next(S::StandbyDown));
        set(S::StandbyDown, U, C, next(S::StandbyStarting));
        set(S::StandbyDown, T, H, next(S::ManualInterventionRequired));
        set(S::StandbyDown, T, D, next(S::ManualInterventionRequired));
        set(S::StandbyDown, T, OD, next(S::ManualInterventionRequired));
        set(S::StandbyDown, T, U, next(S::StandbyDown));
        set(S::StandbyDown, T, T, next(S::ManualInterventionRequired));
        set(S::StandbyDown, T, C, next(S::ManualInterventionRequired));
        set(S::StandbyDown, C, H, next(S::ManualInterventionRequired));
        set(S::StandbyDown, C, D, next(S::ManualInterventionRequired));
        set(S::StandbyDown, C, OD, next(S::ManualInterventionRequired));
        set(S::StandbyDown, C, U, next(S::StandbyDown));
        set(S::StandbyDown, C, T, next(S::ManualInterventionRequired));
        set(S::StandbyDown, C, C, next(S::ManualInterventionRequired));

        set(S::StandbyCatchup, H, H, next(S::Normal));
        set(S::StandbyCatchup, H, D, next(S::StandbyDown));
        set(S::StandbyCatchup, H, OD, next(S::ActiveDown));
        set(S::StandbyCatchup, H, U, next(S::StandbyCatchup));
        set(S::StandbyCatchup, H, T, next(S::StandbyDown));
        set(S::StandbyCatchup, H, C, next(S::StandbyCatchup));
        set(S::StandbyCatchup, D, H, next(S::ActiveDown));
        set(S::StandbyCatchup, D, D, next(S::BothDown));
        set(S::StandbyCatchup, D, OD, next(S::ActiveDown));
        set(S::StandbyCatchup, D, U, next(S::StandbyCatchup));
        set(S::StandbyCatchup, D, T, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, D, C, next(S::Failed));
        set(S::StandbyCatchup, OD, H, next(S::StandbyCatchup));
        set(S::StandbyCatchup, OD, D, next(S::StandbyDown));
        set(S::StandbyCatchup, OD, OD, next(S::Failed));
        set(S::StandbyCatchup, OD, U, next(S::StandbyCatchup));
        set(S::StandbyCatchup, OD, T, next(S::StandbyDown));
        set(S::StandbyCatchup, OD, C, next(S::StandbyCatchup));
        set(S::StandbyCatchup, U, H, next(S::StandbyCatchup));
        set(S::StandbyCatchup, U, D, next(S::StandbyDown));
        set(S::StandbyCatchup, U, OD, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, U, U, next(S::StandbyCatchup));
        set(S::StandbyCatchup, U, T, next(S::StandbyDown));
        set(S::StandbyCatchup, U, C, next(S::StandbyCatchup));
        set(S::StandbyCatchup, T, H, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, T, D, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, T, OD, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, T, U, next(S::StandbyCatchup));
        set(S::StandbyCatchup, T, T, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, T, C, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, C, H, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, C, D, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, C, OD, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, C, U, next(S::StandbyCatchup));
        set(S::StandbyCatchup, C, T, next(S::ManualInterventionRequired));
        set(S::StandbyCatchup, C, C, next(S::ManualInterventionRequired));

        // Manual intervention holds until the operator reexamines.
        for a in [H, D, OD, U, T, C] {
            for b in [H, D, OD, U, T, C] {
                set(
                    S::ManualInterventionRequired,
                    a,
                    b,
                    next(S::ManualInterventionRequired),
                );
            }
        }

        // In WaitingForActive, "Healthy" for the designated active only
        // means reachable with an instance; the standby is irrelevant.
        for b in [H, D, OD, U, T, C] {
            set(S::WaitingForActive, H, b, next(S::ConfiguringActive));
        }
        for a in [D, OD, U, T, C] {
            for b in [H, D, OD, U, T, C] {
                set(S::WaitingForActive, a, b, next(S::WaitingForActive));
            }
        }

        for a in [H, D, OD, U, T, C] {
            for b in [H, D, OD, U, T, C] {
                set(S::Reexamine, a, b, next(S::ManualInterventionRequired));
            }
        }
        set(S::Reexamine, H, H, next(S::Normal));

        set(S::ConfiguringActive, H, H, next(S::Normal));
        for b in [D, OD, U, T, C] {
            set(S::ConfiguringActive, H, b, next(S::StandbyDown));
        }
        for a in [D, OD, U, T, C] {
            for b in [H, D, OD, U, T, C] {
                set(
                    S::ConfiguringActive,
                    a,
                    b,
                    next(S::ManualInterventionRequired),
                );
            }
        }

        set(S::Normal, H, H, next(S::Normal));
        set(S::Normal, H, D, next(S::ActiveTakeover));
        set(S::Normal, H, OD, next(S::ActiveDown));
        set(S::Normal, H, U, next(S::Normal));
        set(S::Normal, H, T, next(S::ManualInterventionRequired));
        set(S::Normal, H, C, next(S::ManualInterventionRequired));
        set(S::Normal, D, H, next(S::ActiveDown));
        set(S::Normal, D, D, next(S::BothDown));
        set(S::Normal, D, OD, next(S::ManualInterventionRequired));
        set(S::Normal, D, U, next(S::Normal));
        set(S::Normal, D, T, next(S::ManualInterventionRequired));
        set(S::Normal, D, C, next(S::ManualInterventionRequired));
        // Believe the active.
        set(S::Normal, OD, H, next(S::ActiveTakeover));
        set(S::Normal, OD, D, next(S::StandbyDown));
        set(S::Normal, OD, OD, next(S::ManualInterventionRequired));
        set(S::Normal, OD, U, next(S::Normal));
        set(S::Normal, OD, T, next(S::ManualInterventionRequired));
        set(S::Normal, OD, C, next(S::ManualInterventionRequired));
        set(S::Normal, U, H, next(S::Normal));
        set(S::Normal, U, D, next(S::Normal));
        set(S::Normal, U, OD, next(S::Normal));
        set(S::Normal, U, U, next(S::Normal));
        set(S::Normal, U, T, next(S::Normal));
        set(S::Normal, U, C, next(S::Normal));
        set(S::Normal, T, H, next(S::ManualInterventionRequired));
        set(S::Normal, T, D, next(S::ManualInterventionRequired));
        set(S::Normal, T, OD, next(S::ManualInterventionRequired));
        set(S::Normal, T, U, next(S::Normal));
        set(S::Normal, T, T, next(S::ManualInterventionRequired));
        set(S::Normal, T, C, next(S::ManualInterventionRequired));
        set(S::Normal, C, H, next(S::ManualInterventionRequired));
        set(S::Normal, C, D, next(S::ManualInterventionRequired));
        set(S::Normal, C, OD, next(S::ManualInterventionRequired));
        set(S::Normal, C, U, next(S::Normal));
        set(S::Normal, C, T, next(S::ManualInterventionRequired));
        set(S::Normal, C, C, next(S::ManualInterventionRequired));

        set(S::ActiveDown, H, H, Outcome::Failover);
        set(S::ActiveDown, H, D, next(S::ManualInterventionRequired));
        set(S::ActiveDown, H, OD, next(S::ManualInterventionRequired));
        set(S::ActiveDown, H, U, next(S::ActiveDown));
        set(S::ActiveDown, H, T, next(S::ManualInterventionRequired));
        set(S::ActiveDown, H, C, next(S::ManualInterventionRequired));
        set(S::ActiveDown, D, H, Outcome::Failover);
        set(S::ActiveDown, D, D, next(S::BothDown));
        set(S::ActiveDown, D, OD, next(S::ManualInterventionRequired));
        set(S::ActiveDown, D, U, next(S::ActiveDown));
        set(S::ActiveDown, D, T, next(S::ManualInterventionRequired));
        set(S::ActiveDown, D, C, next(S::ManualInterventionRequired));
        set(S::ActiveDown, OD, H, Outcome::Failover);
        set(S::ActiveDown, OD, D, next(S::ManualInterventionRequired));
        set(S::ActiveDown, OD, OD, next(S::ManualInterventionRequired));
        set(S::ActiveDown, OD, U, next(S::ActiveDown));
        set(S::ActiveDown, OD, T, next(S::ManualInterventionRequired));
        set(S::ActiveDown, OD, C, next(S::ManualInterventionRequired));
        set(S::ActiveDown, U, H, Outcome::Failover);
        set(S::ActiveDown, U, D, next(S::BothDown));
        set(S::ActiveDown, U, OD, next(S::ActiveDown));
        set(S::ActiveDown, U, U, next(S::ActiveDown));
        set(S::ActiveDown, U, T, next(S::ActiveDown));
        set(S::ActiveDown, U, C, next(S::ActiveDown));
        set(S::ActiveDown, T, H, Outcome::Failover);
        set(S::ActiveDown, T, D, next(S::BothDown));
        set(S::ActiveDown, T, OD, next(S::ManualInterventionRequired));
        set(S::ActiveDown, T, U, next(S::ActiveDown));
        set(S::ActiveDown, T, T, next(S::ManualInterventionRequired));
        set(S::ActiveDown, T, C, next(S::ManualInterventionRequired));
        set(S::ActiveDown, C, H, Outcome::Failover);
        set(S::ActiveDown, C, D, next(S::ManualInterventionRequired));
        set(S::ActiveDown, C, OD, next(S::ManualInterventionRequired));
        set(S::ActiveDown, C, U, next(S::ActiveDown));
        set(S::ActiveDown, C, T, next(S::ManualInterventionRequired));
        set(S::ActiveDown, C, C, next(S::ManualInterventionRequired));

        set(S::ActiveTakeover, H, H, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, H, D, next(S::StandbyDown));
        set(S::ActiveTakeover, H, OD, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, H, U, next(S::ActiveTakeover));
        set(S::ActiveTakeover, H, T, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, H, C, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, D, H, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, D, D, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, D, OD, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, D, U, next(S::ActiveTakeover));
        set(S::ActiveTakeover, D, T, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, D, C, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, OD, H, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, OD, D, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, OD, OD, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, OD, U, next(S::ActiveTakeover));
        set(S::ActiveTakeover, OD, T, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, OD, C, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, U, H, next(S::ActiveTakeover));
        set(S::ActiveTakeover, U, D, next(S::ActiveTakeover));
        set(S::ActiveTakeover, U, OD, next(S::ActiveTakeover));
        set(S::ActiveTakeover, U, U, next(S::ActiveTakeover));
        set(S::ActiveTakeover, U, T, next(S::ActiveTakeover));
        set(S::ActiveTakeover, U, C, next(S::ActiveTakeover));
        set(S::ActiveTakeover, T, H, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, T, D, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, T, OD, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, T, U, next(S::ActiveTakeover));
        set(S::ActiveTakeover, T, T, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, T, C, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, C, H, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, C, D, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, C, OD, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, C, U, next(S::ActiveTakeover));
        set(S::ActiveTakeover, C, T, next(S::ManualInterventionRequired));
        set(S::ActiveTakeover, C, C, next(S::ManualInterventionRequired));

        PairTable { cells }
    }
}

impl Default for PairTable {
    fn default() -> Self {
        PairTable::new()
    }
}

/// Result of an upgrade-table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Phase(UpgradePhase),
    ManualIntervention,
    Unmapped,
}

/// `(upgrade phase, active-side status, standby-side status) -> outcome`.
/// Structurally the twin of [`PairTable`], over the upgrade vocabulary.
#[derive(Debug)]
pub struct UpgradeTable {
    cells: HashMap<(UpgradePhase, TaskStatus, TaskStatus), UpgradeOutcome>,
}

impl UpgradeTable {
    pub fn next(&self, phase: UpgradePhase, active: TaskStatus, standby: TaskStatus) -> UpgradeOutcome {
        self.cells
            .get(&(phase, active, standby))
            .copied()
            .unwrap_or(UpgradeOutcome::Unmapped)
    }

    pub fn new() -> Self {
        use TaskStatus as T;
        use UpgradePhase as P;

        let mut cells = HashMap::new();
        let mut set = |p: P, a: T, s: T, o: UpgradeOutcome| {
            cells.insert((p, a, s), o);
        };
        let phase = UpgradeOutcome::Phase;
        let manual = UpgradeOutcome::ManualIntervention;

        set(P::UpgradingStandby, T::Waiting, T::DeleteStandby, phase(P::UpgradingStandby));
        set(P::UpgradingStandby, T::Waiting, T::Processing, phase(P::UpgradingStandby));
        set(P::UpgradingStandby, T::Waiting, T::Success, phase(P::UpgradingActive));
        set(P::UpgradingStandby, T::Success, T::Success, phase(P::Complete));
        // Unknown on either side means we lost the plot.
        set(P::UpgradingStandby, T::Unknown, T::Success, manual);
        set(P::UpgradingStandby, T::Success, T::Unknown, manual);
        set(P::UpgradingStandby, T::DeleteActive, T::Success, phase(P::UpgradingActive));
        set(P::UpgradingStandby, T::Waiting, T::Failed, manual);
        set(P::UpgradingStandby, T::Failed, T::Waiting, manual);
        set(P::UpgradingStandby, T::Failed, T::Failed, manual);

        set(P::UpgradingActive, T::DeleteActive, T::Success, phase(P::UpgradingActive));
        set(P::UpgradingActive, T::Processing, T::Success, phase(P::UpgradingActive));
        set(P::UpgradingActive, T::Success, T::Success, phase(P::Complete));
        set(P::UpgradingActive, T::Waiting, T::Failed, manual);
        set(P::UpgradingActive, T::Failed, T::Waiting, manual);
        set(P::UpgradingActive, T::Failed, T::Failed, manual);
        set(P::UpgradingActive, T::Unknown, T::Success, manual);
        set(P::UpgradingActive, T::Success, T::Unknown, manual);

        UpgradeTable { cells }
    }
}

impl Default for UpgradeTable {
    fn default() -> Self {
        UpgradeTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::TASK_STATUS_DOMAIN;

    #[test]
    fn every_lookup_is_total() {
        let table = PairTable::new();
        for state in PairState::ALL {
            for a in PAIR_ANSWER_DOMAIN {
                for b in PAIR_ANSWER_DOMAIN {
                    // Must return something; Unmapped is acceptable.
                    let _ = table.next(state, a, b);
                }
            }
        }
        let up = UpgradeTable::new();
        for phase in [
            UpgradePhase::UpgradingStandby,
            UpgradePhase::UpgradingActive,
            UpgradePhase::Complete,
        ] {
            for a in TASK_STATUS_DOMAIN {
                for b in TASK_STATUS_DOMAIN {
                    let _ = up.next(phase, a, b);
                }
            }
        }
    }

    #[test]
    fn failed_is_absorbing() {
        let table = PairTable::new();
        for a in PAIR_ANSWER_DOMAIN {
            for b in PAIR_ANSWER_DOMAIN {
                assert_eq!(
                    table.next(PairState::Failed, a, b),
                    Outcome::Next(PairState::Failed),
                    "Failed[{:?}][{:?}] must stay Failed",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn failover_is_commissioned_only_from_active_down_with_healthy_standby() {
        let table = PairTable::new();
        for state in PairState::ALL {
            for a in PAIR_ANSWER_DOMAIN {
                for b in PAIR_ANSWER_DOMAIN {
                    let outcome = table.next(state, a, b);
                    if outcome == Outcome::Failover {
                        assert_eq!(state, PairState::ActiveDown);
                        assert_eq!(b, PodAnswer::Healthy);
                    }
                }
            }
        }
        assert_eq!(
            table.next(PairState::ActiveDown, PodAnswer::Down, PodAnswer::Healthy),
            Outcome::Failover
        );
    }

    #[test]
    fn both_down_waits_only_on_down_unknown() {
        let table = PairTable::new();
        assert_eq!(
            table.next(PairState::BothDown, PodAnswer::Down, PodAnswer::Unknown),
            Outcome::Next(PairState::BothDown)
        );
        assert_eq!(
            table.next(PairState::BothDown, PodAnswer::Unknown, PodAnswer::Down),
            Outcome::Next(PairState::ManualInterventionRequired)
        );
    }

    // The cells below are asymmetric on purpose; see the module docs.
    #[test]
    fn pinned_asymmetric_cells() {
        let table = PairTable::new();
        assert_eq!(
            table.next(
                PairState::Initializing,
                PodAnswer::Unknown,
                PodAnswer::CatchingUp
            ),
            Outcome::Next(PairState::Failed)
        );
        assert_eq!(
            table.next(
                PairState::Initializing,
                PodAnswer::Down,
                PodAnswer::CatchingUp
            ),
            Outcome::Unmapped
        );
        assert_eq!(
            table.next(PairState::StandbyDown, PodAnswer::Down, PodAnswer::CatchingUp),
            Outcome::Next(PairState::Failed)
        );
        assert_eq!(
            table.next(
                PairState::StandbyCatchup,
                PodAnswer::OtherDown,
                PodAnswer::OtherDown
            ),
            Outcome::Next(PairState::Failed)
        );
    }

    #[test]
    fn normal_peer_down_splits_by_side() {
        let table = PairTable::new();
        assert_eq!(
            table.next(PairState::Normal, PodAnswer::Down, PodAnswer::Healthy),
            Outcome::Next(PairState::ActiveDown)
        );
        assert_eq!(
            table.next(PairState::Normal, PodAnswer::Healthy, PodAnswer::Down),
            Outcome::Next(PairState::ActiveTakeover)
        );
        assert_eq!(
            table.next(PairState::Normal, PodAnswer::Healthy, PodAnswer::Terminal),
            Outcome::Next(PairState::ManualInterventionRequired)
        );
        assert_eq!(
            table.next(PairState::Normal, PodAnswer::CatchingUp, PodAnswer::Healthy),
            Outcome::Next(PairState::ManualInterventionRequired)
        );
    }

    #[test]
    fn upgrade_standby_success_advances_to_active_leg() {
        let up = UpgradeTable::new();
        assert_eq!(
            up.next(
                UpgradePhase::UpgradingStandby,
                TaskStatus::Waiting,
                TaskStatus::Success
            ),
            UpgradeOutcome::Phase(UpgradePhase::UpgradingActive)
        );
        assert_eq!(
            up.next(
                UpgradePhase::UpgradingActive,
                TaskStatus::Success,
                TaskStatus::Success
            ),
            UpgradeOutcome::Phase(UpgradePhase::Complete)
        );
        assert_eq!(
            up.next(
                UpgradePhase::UpgradingStandby,
                TaskStatus::Waiting,
                TaskStatus::Failed
            ),
            UpgradeOutcome::ManualIntervention
        );
    }
}
