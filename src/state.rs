//! High-level states of the managed object and member roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// High-level state of a replicated active/standby pair. Persisted; the
/// value drives which flow runs on each pod next tick.
///
/// `Failed` is absorbing. `ManualInterventionRequired` is left only by
/// an operator-triggered reexamine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairState {
    Initializing,
    Normal,
    ActiveDown,
    StandbyDown,
    StandbyStarting,
    StandbyCatchup,
    BothDown,
    OneDown,
    ActiveTakeover,
    WaitingForActive,
    ConfiguringActive,
    Reexamine,
    ManualInterventionRequired,
    Failed,
}

impl PairState {
    /// The complete pair-state domain, for table construction and
    /// totality checks.
    pub const ALL: [PairState; 14] = [
        PairState::Initializing,
        PairState::Normal,
        PairState::ActiveDown,
        PairState::StandbyDown,
        PairState::StandbyStarting,
        PairState::StandbyCatchup,
        PairState::BothDown,
        PairState::OneDown,
        PairState::ActiveTakeover,
        PairState::WaitingForActive,
        PairState::ConfiguringActive,
        PairState::Reexamine,
        PairState::ManualInterventionRequired,
        PairState::Failed,
    ];
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The smaller, disjoint vocabulary a standalone (non-replicated)
/// member moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandaloneState {
    Initializing,
    Normal,
    Down,
    Failed,
    ManualInterventionRequired,
    Reexamine,
}

impl fmt::Display for StandaloneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Aggregate readiness of a standalone object's replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaReadiness {
    NoReplicasReady,
    SomeReplicasReady,
    AllReplicasReady,
}

impl fmt::Display for ReplicaReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Aggregate readiness of the subscriber fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriberReadiness {
    NoSubscribersReady,
    SomeSubscribersReady,
    AllSubscribersReady,
}

impl fmt::Display for SubscriberReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which half of the pair a pod is meant to be right now. Flipped by
/// failover and by both-down recovery; the previous value is kept so
/// the configuring flows know where the pod is coming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Active,
    Standby,
    /// Standalone members and subscribers hold no pair role.
    Unassigned,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Topology of the managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Two-member replicated active/standby pair.
    Pair,
    /// Standalone member(s), no replication.
    Standalone,
}
