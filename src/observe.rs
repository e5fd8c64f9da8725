//! Observed status of a single database pod.
//!
//! A [`PodSnapshot`] is refreshed once per reconciliation tick by the status
//! collaborator and is read-only for the rest of the tick: every decision in
//! a pass is made from one consistent snapshot, never from a re-query.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of database pod within the managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodKind {
    /// A member of the replicated pair, or the sole standalone member.
    Database,
    /// A read-only subscriber replica.
    Subscriber,
}

/// Presence of the on-disk database instance inside the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Exists,
    Missing,
    Unknown,
}

/// The per-pod management daemon that must run before the database
/// itself can be manipulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonState {
    Up,
    Down,
    Unknown,
}

/// Load state of the database itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbState {
    None,
    Loading,
    Loaded,
    Unloading,
    Unloaded,
    Transitioning,
    Unknown,
}

/// Whether a replication scheme is configured in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepSchemeState {
    None,
    Exists,
    Unknown,
}

/// Replication agent process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepAgentState {
    Running,
    NotRunning,
    Unknown,
}

/// Replication protocol role/health of this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepState {
    Active,
    Standby,
    Idle,
    Recovering,
    Failed,
    Unknown,
}

/// What this side believes about its replication peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepPeerState {
    Start,
    Pause,
    Stop,
    Failed,
    Unknown,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for DbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for RepSchemeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for RepAgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for RepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for RepPeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One tick's observation of a single pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSnapshot {
    /// Orchestrator reports the pod phase as Running.
    pub running: bool,
    /// The in-pod management agent answered our last status query.
    pub agent_up: bool,
    /// The pod is draining under a supervised shutdown. No corrective
    /// action may be taken while this is set.
    pub quiescing: bool,
    pub instance: InstanceState,
    pub daemon: DaemonState,
    pub db: DbState,
    pub db_open: bool,
    pub rep_scheme: RepSchemeState,
    pub rep_agent: RepAgentState,
    pub rep_state: RepState,
    pub rep_peer: RepPeerState,
    /// Cache agent process state (same vocabulary as the rep agent).
    pub cache_agent: RepAgentState,
    pub cache_group_count: u32,
    pub has_cache_groups_file: bool,
    /// Software release running in the pod, e.g. "22.1.1.19.0".
    pub release: String,
    /// Release baked into the pod image, which differs from `release`
    /// while an image change has not been rolled onto the instance yet.
    pub image_release: String,
    /// The pod carries the marker left behind by a failed in-place upgrade.
    pub upgrade_failed_marker: bool,
    /// Replication commits twosafe on this side.
    pub using_twosafe: bool,
    /// Twosafe return-service disabled; disqualifies automatic
    /// both-down recovery.
    pub disable_return: bool,
    /// Twosafe local-commit enabled; disqualifies automatic
    /// both-down recovery.
    pub local_commit: bool,
}

impl PodSnapshot {
    /// A snapshot for a pod the orchestrator has not started (or has lost).
    /// Everything beyond `running` is unknowable.
    pub fn absent() -> Self {
        PodSnapshot {
            running: false,
            agent_up: false,
            quiescing: false,
            instance: InstanceState::Unknown,
            daemon: DaemonState::Unknown,
            db: DbState::Unknown,
            db_open: false,
            rep_scheme: RepSchemeState::Unknown,
            rep_agent: RepAgentState::Unknown,
            rep_state: RepState::Unknown,
            rep_peer: RepPeerState::Unknown,
            cache_agent: RepAgentState::Unknown,
            cache_group_count: 0,
            has_cache_groups_file: false,
            release: String::new(),
            image_release: String::new(),
            upgrade_failed_marker: false,
            using_twosafe: false,
            disable_return: false,
            local_commit: false,
        }
    }
}
