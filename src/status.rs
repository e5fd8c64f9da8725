//! Persisted reconciliation status.
//!
//! Everything in here survives a supervisor restart: the pair state and
//! its history stamp, each pod's record (including reachability
//! bookkeeping and the standby-recovery task), and the upgrade status.
//! It is mutated only by the single reconciliation pass that owns the
//! object and written back once at the end of a tick.

use crate::answer::PodAnswer;
use crate::state::{PairState, ReplicaReadiness, Role, SubscriberReadiness};
use crate::upgrade::UpgradeStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted per-pod record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub kind: crate::observe::PodKind,
    pub intended: Role,
    pub prev_intended: Role,
    /// The pod's high-level state: last tick's answer for this pod.
    pub state: PodAnswer,
    pub prev_state: PodAnswer,
    pub last_state_switch: u64,
    /// Epoch seconds of the last successful agent contact. Zero means
    /// never yet reachable.
    pub last_time_reachable: u64,
    /// Epoch seconds of the last observed replication-state change.
    pub last_time_rep_state_changed: u64,
    pub ready: bool,
    pub prev_ready: bool,
    /// Whether this pod currently is where writes should be steered.
    pub active_ready: bool,
    pub initialized: bool,
}

impl PodRecord {
    pub fn new(name: impl Into<String>, kind: crate::observe::PodKind, intended: Role) -> Self {
        PodRecord {
            name: name.into(),
            kind,
            intended,
            prev_intended: intended,
            state: PodAnswer::Initializing,
            prev_state: PodAnswer::Initializing,
            last_state_switch: 0,
            last_time_reachable: 0,
            last_time_rep_state_changed: 0,
            ready: false,
            prev_ready: false,
            active_ready: false,
            initialized: false,
        }
    }

    /// Record a new high-level state for the pod, keeping history.
    pub fn set_state(&mut self, state: PodAnswer, now: u64) {
        if self.state == state {
            return;
        }
        self.prev_state = self.state;
        self.state = state;
        self.last_state_switch = now;
    }

    pub fn set_intended(&mut self, role: Role) {
        self.prev_intended = self.intended;
        self.intended = role;
    }
}

/// Progress marker of the standby recovery task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    /// No recovery task exists.
    Idle,
    /// Steps are being issued; the task may be resumed after a restart.
    Pending,
    /// All steps issued (or the task was abandoned on a failure).
    Complete,
}

/// The persisted record of the destroy → duplicate → start-rep-agent
/// sequence run against a dead standby. Duplicating a database is a
/// long asynchronous operation; this record is what lets a restarted
/// supervisor resume the sequence instead of re-running finished steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryTask {
    pub phase: TaskPhase,
    /// Identity of this task instance.
    pub id: Option<Uuid>,
    /// The agent-side async request id the task is tied to.
    pub async_id: Option<String>,
    /// Pod the task was started against. A recreated pod gets a fresh
    /// task; resumption is only valid against the same pod.
    pub pod_name: String,
    pub destroy_db: bool,
    pub rep_duplicate: bool,
    pub start_rep_agent: bool,
}

impl RecoveryTask {
    pub fn idle() -> Self {
        RecoveryTask {
            phase: TaskPhase::Idle,
            id: None,
            async_id: None,
            pod_name: String::new(),
            destroy_db: false,
            rep_duplicate: false,
            start_rep_agent: false,
        }
    }

    /// Begin a fresh task against `pod_name`, discarding prior progress.
    pub fn begin(&mut self, pod_name: &str) {
        self.phase = TaskPhase::Pending;
        self.id = Some(Uuid::new_v4());
        self.async_id = None;
        self.pod_name = pod_name.to_string();
        self.destroy_db = false;
        self.rep_duplicate = false;
        self.start_rep_agent = false;
    }
}

/// Last known agent-side async request, kept so a restarted supervisor
/// can ask the agent whether the request it remembers is the one the
/// agent remembers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsyncCursor {
    pub id: Option<String>,
    pub host: String,
    pub pod_name: String,
}

/// Subscriber fleet summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberSummary {
    pub state: SubscriberReadiness,
    pub prev_state: SubscriberReadiness,
    pub last_state_switch: u64,
}

impl Default for SubscriberSummary {
    fn default() -> Self {
        SubscriberSummary {
            state: SubscriberReadiness::NoSubscribersReady,
            prev_state: SubscriberReadiness::NoSubscribersReady,
            last_state_switch: 0,
        }
    }
}

/// The whole persisted status of one reconciled object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileStatus {
    /// Name of the managed object; also the database name.
    pub name: String,
    pub pair_state: PairState,
    pub prev_pair_state: Option<PairState>,
    pub last_pair_state_switch: u64,
    pub pods: Vec<PodRecord>,
    /// Aggregate readiness for standalone objects.
    pub replica_readiness: ReplicaReadiness,
    pub subscribers: SubscriberSummary,
    pub upgrade: UpgradeStatus,
    pub recovery: RecoveryTask,
    pub async_cursor: AsyncCursor,
    /// Consecutive failures to restart replication on the standby.
    pub rep_start_fail_count: u32,
    /// Latched when twosafe runs with return disabled or local commit;
    /// automatic both-down recovery is then unsafe.
    pub both_down_recovery_ineligible: bool,
    pub using_twosafe: bool,
    /// Human-readable summary of which pod(s) hold the active role.
    pub active_pods: String,
}

impl ReconcileStatus {
    /// Fresh status for a replicated pair: pod 0 intended active, pod 1
    /// intended standby, pair initializing.
    pub fn new_pair(name: impl Into<String>) -> Self {
        let name = name.into();
        let pods = vec![
            PodRecord::new(
                format!("{}-0", name),
                crate::observe::PodKind::Database,
                Role::Active,
            ),
            PodRecord::new(
                format!("{}-1", name),
                crate::observe::PodKind::Database,
                Role::Standby,
            ),
        ];
        ReconcileStatus {
            name,
            pair_state: PairState::Initializing,
            prev_pair_state: None,
            last_pair_state_switch: 0,
            pods,
            replica_readiness: ReplicaReadiness::NoReplicasReady,
            subscribers: SubscriberSummary::default(),
            upgrade: UpgradeStatus::default(),
            recovery: RecoveryTask::idle(),
            async_cursor: AsyncCursor::default(),
            rep_start_fail_count: 0,
            both_down_recovery_ineligible: false,
            using_twosafe: false,
            active_pods: "None".to_string(),
        }
    }

    /// Fresh status for a standalone object with `replicas` members.
    pub fn new_standalone(name: impl Into<String>, replicas: usize) -> Self {
        let name = name.into();
        let pods = (0..replicas)
            .map(|i| {
                PodRecord::new(
                    format!("{}-{}", name, i),
                    crate::observe::PodKind::Database,
                    Role::Unassigned,
                )
            })
            .collect();
        ReconcileStatus {
            pods,
            ..ReconcileStatus::new_pair(name)
        }
    }

    /// Add `count` subscriber records after the database members.
    pub fn with_subscribers(mut self, count: usize) -> Self {
        for i in 0..count {
            self.pods.push(PodRecord::new(
                format!("{}-sub-{}", self.name, i),
                crate::observe::PodKind::Subscriber,
                Role::Unassigned,
            ));
        }
        self
    }

    /// Record a new pair high-level state, keeping history.
    pub fn set_pair_state(&mut self, state: PairState, now: u64) {
        self.prev_pair_state = Some(self.pair_state);
        self.pair_state = state;
        self.last_pair_state_switch = now;
    }

    /// Index of the pod currently intended active, and its peer.
    pub fn intended_active(&self) -> Option<(usize, usize)> {
        let active = self
            .pods
            .iter()
            .position(|p| p.intended == Role::Active)?;
        let standby = if active == 0 { 1 } else { 0 };
        if standby < self.pods.len() {
            Some((active, standby))
        } else {
            None
        }
    }

    /// Swap the intended roles of the two pair members.
    pub fn flip_intended_roles(&mut self) {
        if self.pods.len() < 2 {
            return;
        }
        let (a, b) = if self.pods[0].intended == Role::Active {
            (Role::Standby, Role::Active)
        } else {
            (Role::Active, Role::Standby)
        };
        self.pods[0].set_intended(a);
        self.pods[1].set_intended(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_record_state_history_only_moves_on_change() {
        let mut rec = PodRecord::new("db-0", crate::observe::PodKind::Database, Role::Active);
        rec.set_state(PodAnswer::Healthy, 100);
        assert_eq!(rec.prev_state, PodAnswer::Initializing);
        assert_eq!(rec.last_state_switch, 100);

        rec.set_state(PodAnswer::Healthy, 200);
        assert_eq!(rec.last_state_switch, 100, "no switch, no restamp");

        rec.set_state(PodAnswer::Down, 300);
        assert_eq!(rec.prev_state, PodAnswer::Healthy);
        assert_eq!(rec.last_state_switch, 300);
    }

    #[test]
    fn flip_swaps_roles_and_remembers_previous() {
        let mut st = ReconcileStatus::new_pair("db");
        st.flip_intended_roles();
        assert_eq!(st.pods[0].intended, Role::Standby);
        assert_eq!(st.pods[0].prev_intended, Role::Active);
        assert_eq!(st.pods[1].intended, Role::Active);
        assert_eq!(st.intended_active(), Some((1, 0)));
    }

    #[test]
    fn recovery_task_begin_resets_progress() {
        let mut task = RecoveryTask::idle();
        task.destroy_db = true;
        task.rep_duplicate = true;
        task.begin("db-1");
        assert_eq!(task.phase, TaskPhase::Pending);
        assert!(task.id.is_some());
        assert!(!task.destroy_db && !task.rep_duplicate && !task.start_rep_agent);
        assert_eq!(task.pod_name, "db-1");
    }

    #[test]
    fn status_round_trips_through_json() {
        let st = ReconcileStatus::new_pair("db").with_subscribers(2);
        let json = serde_json::to_string(&st).unwrap();
        let back: ReconcileStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pods.len(), 4);
        assert_eq!(back.pair_state, PairState::Initializing);
    }
}
