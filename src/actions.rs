//! Collaborator seams: remediation actions, the remote agent gateway,
//! the pod orchestrator, and the event sink.
//!
//! The reconciliation core never talks to a pod or the orchestration
//! API directly; it drives these traits. Calls are synchronous and
//! fallible from the core's point of view; a failure is an ordinary
//! error return folded into the pod answer, never a panic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Privileged operations executed inside a pod by its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    StartDaemon,
    StopDaemon,
    CreateDb,
    DestroyDb,
    LoadDb,
    OpenDb,
    RepDuplicate,
    StartRepAgent,
    StopRepAgent,
    RepStateSetActive,
    RepStateSave,
    RepDeactivate,
    CreateRepScheme,
    DropRepScheme,
    CreateRepEpilog,
    CreateCacheGroups,
    DropCacheGroups,
    StartCacheAgent,
    StopCacheAgent,
    SetSubStateStart,
    RemoveUpgradeFailedMarker,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Free-form key/value parameters an action may carry (e.g. the
/// database name for an open).
pub type ActionParams = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ActionError {
    /// The orchestration API rejected the caller's credentials. The
    /// supervisor treats this as unrecoverable for the whole object.
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("action failed: {0}")]
    Failed(String),
    #[error("agent unreachable: {0}")]
    Unreachable(String),
}

impl ActionError {
    pub fn is_authorization(&self) -> bool {
        matches!(self, ActionError::Unauthorized(_))
    }
}

/// Executes a remediation action against one pod. The executor logs its
/// own failures; callers only branch on the result.
pub trait ActionRunner {
    fn run(&mut self, pod: usize, action: Action, params: &ActionParams) -> Result<(), ActionError>;
}

/// Agent-side view of an asynchronous task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncTaskStatus {
    pub id: String,
    pub running: bool,
    pub errno: Option<i32>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("agent unreachable: {0}")]
    Unreachable(String),
    #[error("agent error: {0}")]
    Other(String),
}

/// Read-side protocol to the in-pod agent, beyond the per-tick
/// snapshot: async-task interrogation, upgrade metadata, and the
/// replication verification probe.
pub trait AgentGateway {
    /// Ask the agent which async task it last ran and where it stands.
    fn async_task_status(&mut self, host: &str, task_id: &str)
        -> Result<AsyncTaskStatus, AgentError>;

    /// Fetch the upgrade compatibility list published by a pod's
    /// installation, as raw JSON. `Ok(None)` means the agent predates
    /// the list and the caller should fall back to its local copy.
    fn upgrade_list(&mut self, pod: usize) -> Result<Option<String>, AgentError>;

    /// The operator's own bundled compatibility list.
    fn local_upgrade_list(&mut self) -> Result<String, AgentError>;

    /// Insert a row on the active and watch for it on the standby; the
    /// post-upgrade proof that replication actually works.
    fn verify_replication(&mut self, active: usize, standby: usize) -> Result<(), AgentError>;

    /// Drain connections and wait for the standby to catch up before an
    /// active-side upgrade.
    fn quiesce(&mut self, active: usize) -> Result<(), AgentError>;
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("orchestrator error: {0}")]
    Other(String),
}

/// The compute-layer side: the only thing this core ever asks of it is
/// to delete a pod so it comes back on the new image.
pub trait Orchestrator {
    fn delete_pod(&mut self, pod_name: &str) -> Result<(), OrchestratorError>;
}

/// Category of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    StateChange,
    Error,
    Fatal,
    Upgrade,
    UpgradeError,
    FailedUpgrade,
    FailedCreate,
}

/// Fire-and-forget audit log. Never fails as far as this core cares.
pub trait EventSink {
    fn publish(&mut self, kind: EventKind, message: &str, warning: bool);
}

/// An event sink that drops everything.
#[derive(Debug, Default)]
pub struct NullEvents;

impl EventSink for NullEvents {
    fn publish(&mut self, _kind: EventKind, _message: &str, _warning: bool) {}
}
