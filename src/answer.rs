//! The vocabulary a per-pod evaluator answers in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of running one pod's flowchart for one tick.
///
/// The replicated pair table consumes the subset returned by pair
/// evaluators; the remaining variants serve the standalone and
/// subscriber vocabularies. Answers are recomputed every tick; the one
/// persisted per pod is the pod's high-level state for the next tick's
/// flow selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodAnswer {
    Healthy,
    HealthyActive,
    HealthyStandby,
    HealthyIdle,
    Down,
    OtherDown,
    Unknown,
    CatchingUp,
    Terminal,
    UpgradeFailed,
    Normal,
    Initializing,
    NotProvisioned,
    ManualInterventionRequired,
    Reexamine,
}

impl fmt::Display for PodAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What an evaluator hands back: the answer, an optional diagnostic for
/// the event log, and whether the pod should be considered ready to
/// serve. Diagnostics on transitional answers are informational only;
/// they never propagate past the pair table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub answer: PodAnswer,
    pub diagnostic: Option<String>,
    pub ready: bool,
}

impl Assessment {
    pub fn new(answer: PodAnswer, ready: bool) -> Self {
        Assessment {
            answer,
            diagnostic: None,
            ready,
        }
    }

    pub fn diag(answer: PodAnswer, ready: bool, message: impl Into<String>) -> Self {
        Assessment {
            answer,
            diagnostic: Some(message.into()),
            ready,
        }
    }

    /// The mandatory quiescing outcome: hands off, reports nothing
    /// actionable, takes no action.
    pub fn quiescing() -> Self {
        Assessment::new(PodAnswer::Unknown, false)
    }
}
