//! Recording and scripted collaborator doubles, plus snapshot
//! builders, shared by the unit and scenario tests.

use crate::actions::{
    Action, ActionError, ActionParams, ActionRunner, AgentError, AgentGateway, AsyncTaskStatus,
    EventKind, EventSink, Orchestrator, OrchestratorError,
};
use crate::observe::{
    DaemonState, DbState, InstanceState, PodSnapshot, RepAgentState, RepPeerState, RepSchemeState,
    RepState,
};
use std::collections::HashSet;

/// An action runner that records every invocation and fails the
/// actions it is told to fail.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub calls: Vec<(usize, Action)>,
    failing: HashSet<Action>,
    unauthorized: HashSet<Action>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        RecordingRunner::default()
    }

    pub fn fail_on(mut self, action: Action) -> Self {
        self.failing.insert(action);
        self
    }

    pub fn unauthorized_on(mut self, action: Action) -> Self {
        self.unauthorized.insert(action);
        self
    }

    pub fn count(&self, action: Action) -> usize {
        self.calls.iter().filter(|(_, a)| *a == action).count()
    }
}

impl ActionRunner for RecordingRunner {
    fn run(&mut self, pod: usize, action: Action, _params: &ActionParams) -> Result<(), ActionError> {
        self.calls.push((pod, action));
        if self.unauthorized.contains(&action) {
            return Err(ActionError::Unauthorized(format!("{} forbidden", action)));
        }
        if self.failing.contains(&action) {
            return Err(ActionError::Failed(format!("{} failed", action)));
        }
        Ok(())
    }
}

/// A scripted agent gateway.
#[derive(Debug)]
pub struct ScriptedAgent {
    /// Answer for async-task queries, keyed only by being asked.
    pub async_status: Option<AsyncTaskStatus>,
    /// Per-pod upgrade list JSON. `None` models an old agent.
    pub upgrade_lists: Vec<Option<String>>,
    pub local_list: Option<String>,
    pub verify_ok: bool,
    pub quiesce_ok: bool,
    pub async_queries: usize,
    pub verifications: usize,
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        ScriptedAgent {
            async_status: None,
            upgrade_lists: vec![None, None],
            local_list: None,
            verify_ok: true,
            quiesce_ok: true,
            async_queries: 0,
            verifications: 0,
        }
    }
}

impl ScriptedAgent {
    pub fn new() -> Self {
        ScriptedAgent::default()
    }
}

impl AgentGateway for ScriptedAgent {
    fn async_task_status(
        &mut self,
        _host: &str,
        _task_id: &str,
    ) -> Result<AsyncTaskStatus, AgentError> {
        self.async_queries += 1;
        self.async_status
            .clone()
            .ok_or_else(|| AgentError::Unreachable("no async status scripted".to_string()))
    }

    fn upgrade_list(&mut self, pod: usize) -> Result<Option<String>, AgentError> {
        Ok(self.upgrade_lists.get(pod).cloned().flatten())
    }

    fn local_upgrade_list(&mut self) -> Result<String, AgentError> {
        self.local_list
            .clone()
            .ok_or_else(|| AgentError::Other("no local list".to_string()))
    }

    fn verify_replication(&mut self, _active: usize, _standby: usize) -> Result<(), AgentError> {
        self.verifications += 1;
        if self.verify_ok {
            Ok(())
        } else {
            Err(AgentError::Other(
                "replicated row did not arrive".to_string(),
            ))
        }
    }

    fn quiesce(&mut self, _active: usize) -> Result<(), AgentError> {
        if self.quiesce_ok {
            Ok(())
        } else {
            Err(AgentError::Other("standby behind active".to_string()))
        }
    }
}

/// Records pod deletions; optionally refuses them.
#[derive(Debug, Default)]
pub struct RecordingOrchestrator {
    pub deleted: Vec<String>,
    pub fail: bool,
    pub unauthorized: bool,
}

impl Orchestrator for RecordingOrchestrator {
    fn delete_pod(&mut self, pod_name: &str) -> Result<(), OrchestratorError> {
        if self.unauthorized {
            return Err(OrchestratorError::Unauthorized("forbidden".to_string()));
        }
        if self.fail {
            return Err(OrchestratorError::Other("delete refused".to_string()));
        }
        self.deleted.push(pod_name.to_string());
        Ok(())
    }
}

/// Collects published events.
#[derive(Debug, Default)]
pub struct MemoryEvents {
    pub events: Vec<(EventKind, String, bool)>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        MemoryEvents::default()
    }

    pub fn contains(&self, fragment: &str) -> bool {
        self.events.iter().any(|(_, msg, _)| msg.contains(fragment))
    }
}

impl EventSink for MemoryEvents {
    fn publish(&mut self, kind: EventKind, message: &str, warning: bool) {
        self.events.push((kind, message.to_string(), warning));
    }
}

/// A fully healthy active-side snapshot.
pub fn healthy_active_snapshot() -> PodSnapshot {
    PodSnapshot {
        running: true,
        agent_up: true,
        quiescing: false,
        instance: InstanceState::Exists,
        daemon: DaemonState::Up,
        db: DbState::Loaded,
        db_open: true,
        rep_scheme: RepSchemeState::Exists,
        rep_agent: RepAgentState::Running,
        rep_state: RepState::Active,
        rep_peer: RepPeerState::Start,
        cache_agent: RepAgentState::NotRunning,
        cache_group_count: 0,
        has_cache_groups_file: false,
        release: "22.1.1.1.0".to_string(),
        image_release: "22.1.1.1.0".to_string(),
        upgrade_failed_marker: false,
        using_twosafe: false,
        disable_return: false,
        local_commit: false,
    }
}

/// A fully healthy standby-side snapshot.
pub fn healthy_standby_snapshot() -> PodSnapshot {
    PodSnapshot {
        rep_state: RepState::Standby,
        ..healthy_active_snapshot()
    }
}

/// A healthy standalone member (no replication anywhere).
pub fn healthy_standalone_snapshot() -> PodSnapshot {
    PodSnapshot {
        rep_scheme: RepSchemeState::None,
        rep_agent: RepAgentState::NotRunning,
        rep_state: RepState::Idle,
        rep_peer: RepPeerState::Unknown,
        ..healthy_active_snapshot()
    }
}

/// A pod the orchestrator lost.
pub fn dead_snapshot() -> PodSnapshot {
    PodSnapshot::absent()
}
