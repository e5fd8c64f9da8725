//! pairguard: the reconciliation core for replicated in-memory
//! database pairs.
//!
//! The crate is a two-level finite state machine. Per-pod evaluators
//! (`flows`) turn one pod's observed status into a pod answer, issuing
//! at most one remediation action per check layer through the
//! collaborator seams in `actions`. The pair engine (`pair`) folds the
//! two answers and the current pair state through a precomputed
//! transition table (`table`) into the next pair state, handling
//! failover commissioning, both-down arbitration, operator reexamine,
//! and rolling-upgrade progression (`upgrade`). The supervisor
//! (`supervisor`) drives one full pass per control-loop tick and
//! persists the status (`status`, `store`) once at the end.

pub mod actions;
pub mod answer;
pub mod config;
pub mod flows;
pub mod harness;
pub mod observe;
pub mod pair;
pub mod probes;
pub mod state;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod table;
pub mod upgrade;

pub use actions::{
    Action, ActionError, ActionParams, ActionRunner, AgentError, AgentGateway, AsyncTaskStatus,
    EventKind, EventSink, NullEvents, Orchestrator, OrchestratorError,
};
pub use answer::{Assessment, PodAnswer};
pub use config::{BothDownBehavior, Config, UpgradeStrategy};
pub use flows::{select_flow, EvalCtx, Flow};
pub use observe::{
    DaemonState, DbState, InstanceState, PodKind, PodSnapshot, RepAgentState, RepPeerState,
    RepSchemeState, RepState,
};
pub use pair::{current_active_standby, PairEngine, RoleResolveError};
pub use state::{
    PairState, ReplicaReadiness, Role, StandaloneState, SubscriberReadiness, Topology,
};
pub use status::{AsyncCursor, PodRecord, ReconcileStatus, RecoveryTask, TaskPhase};
pub use store::{FileStatusStore, MemoryStatusStore, StatusStore, StoreError, VersionedStatus};
pub use supervisor::{Supervisor, SupervisorError, TickReport};
pub use table::{Outcome, PairTable, UpgradeOutcome, UpgradeTable, PAIR_ANSWER_DOMAIN};
pub use upgrade::{
    TaskStatus, UpgradeError, UpgradeLeg, UpgradePhase, UpgradeStatus, TASK_STATUS_DOMAIN,
};
