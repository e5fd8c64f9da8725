//! The reconciliation driver: one pass per object per control-loop
//! tick.
//!
//! A tick assesses every pod with the flow its role and the pair state
//! select, folds the answers into the new aggregate state, runs the
//! upgrade hooks, and persists the status once at the end. The external
//! queue serializes ticks per object; nothing here locks.

use crate::actions::{
    Action, ActionError, ActionParams, ActionRunner, AgentGateway, EventKind, EventSink,
    Orchestrator,
};
use crate::answer::{Assessment, PodAnswer};
use crate::config::Config;
use crate::flows::{self, EvalCtx};
use crate::observe::{PodKind, PodSnapshot};
use crate::pair::{commit_pair_state, PairEngine};
use crate::state::{PairState, ReplicaReadiness, Role, SubscriberReadiness};
use crate::status::ReconcileStatus;
use crate::store::{StatusStore, StoreError};
use crate::upgrade::{self, TaskStatus, UpgradeLeg, UpgradePhase};
use log::{debug, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("snapshot count {got} does not match pod count {want}")]
    SnapshotMismatch { got: usize, want: usize },
}

/// What one tick did, for callers and tests.
#[derive(Debug)]
pub struct TickReport {
    /// Answers in pod order; `None` for pods no flow ran on.
    pub answers: Vec<Option<Assessment>>,
    pub pair_state: PairState,
    /// An upgrade leg was initiated this tick.
    pub upgrade_initiated: bool,
}

/// Tracks authorization failures crossing the action seam. The
/// evaluators fold errors into answers; an authorization failure must
/// additionally poison the whole object, because the supervisor
/// literally cannot operate without its credentials.
struct AuthWatch<'r> {
    inner: &'r mut dyn ActionRunner,
    unauthorized: bool,
}

impl ActionRunner for AuthWatch<'_> {
    fn run(&mut self, pod: usize, action: Action, params: &ActionParams) -> Result<(), ActionError> {
        let result = self.inner.run(pod, action, params);
        if let Err(err) = &result {
            if err.is_authorization() {
                self.unauthorized = true;
            }
        }
        result
    }
}

pub struct Supervisor {
    cfg: Config,
    engine: PairEngine,
}

impl Supervisor {
    pub fn new(cfg: Config) -> Self {
        Supervisor {
            cfg,
            engine: PairEngine::new(),
        }
    }

    /// Build with a caller-constructed engine, e.g. a table instance
    /// shared across objects.
    pub fn with_engine(cfg: Config, engine: PairEngine) -> Self {
        Supervisor { cfg, engine }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn engine(&self) -> &PairEngine {
        &self.engine
    }

    /// Operator entry point out of manual intervention: reexamine the
    /// object from scratch.
    pub fn trigger_reexamine(
        &self,
        status: &mut ReconcileStatus,
        events: &mut dyn EventSink,
        now: u64,
    ) {
        if self.cfg.replicated {
            if status.pair_state == PairState::ManualInterventionRequired {
                commit_pair_state(status, PairState::Reexamine, events, now);
            }
        } else {
            for pod in &mut status.pods {
                if pod.state == PodAnswer::ManualInterventionRequired {
                    pod.set_state(PodAnswer::Reexamine, now);
                }
            }
        }
    }

    /// Run one full reconciliation pass.
    ///
    /// `upgrade_requested` is the caller's signal that the pod image
    /// changed and a rolling upgrade should begin at the next legal
    /// moment.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &self,
        status: &mut ReconcileStatus,
        snaps: &[PodSnapshot],
        runner: &mut dyn ActionRunner,
        agent: &mut dyn AgentGateway,
        orchestrator: &mut dyn Orchestrator,
        events: &mut dyn EventSink,
        upgrade_requested: bool,
        now: u64,
    ) -> Result<TickReport, SupervisorError> {
        if snaps.len() != status.pods.len() {
            return Err(SupervisorError::SnapshotMismatch {
                got: snaps.len(),
                want: status.pods.len(),
            });
        }

        let mut report = TickReport {
            answers: vec![None; status.pods.len()],
            pair_state: status.pair_state,
            upgrade_initiated: false,
        };

        // Quarantined objects get no attention until an operator acts.
        if self.cfg.replicated && status.pair_state == PairState::ManualInterventionRequired {
            debug!("pair requires manual intervention; taking no action");
            return Ok(report);
        }

        self.latch_both_down_eligibility(status, snaps);

        let mut watch = AuthWatch {
            inner: runner,
            unauthorized: false,
        };

        let mut someone_other_down = false;
        let mut someone_healthy = false;

        // Database members first; subscribers after the pair's fate for
        // this tick is settled.
        for pod in 0..status.pods.len() {
            if status.pods[pod].kind != PodKind::Database {
                continue;
            }
            let assessment = self.assess_pod(
                status, snaps, pod, &mut watch, agent, events, now,
            );
            if let Some(assessment) = assessment {
                if assessment.answer == PodAnswer::OtherDown {
                    someone_other_down = true;
                }
                if assessment.answer == PodAnswer::Healthy {
                    someone_healthy = true;
                }
                report.answers[pod] = Some(assessment);
            }
        }

        let mut upgrade_active = false;
        if self.cfg.replicated {
            upgrade_active = self.engine.reassess(
                status,
                &self.cfg,
                &mut watch,
                agent,
                events,
                someone_other_down,
                someone_healthy,
                now,
            );
        } else {
            self.summarize_replicas(status, events, now);
        }

        if watch.unauthorized {
            events.publish(
                EventKind::Fatal,
                "Authorization failure talking to the orchestration API",
                true,
            );
            commit_pair_state(status, PairState::Failed, events, now);
        }

        self.summarize_active_pods(status);

        report.upgrade_initiated = self.drive_upgrade(
            status,
            snaps,
            &mut watch,
            agent,
            orchestrator,
            events,
            upgrade_requested,
            upgrade_active,
            now,
        );

        if self.cfg.subscribers > 0 {
            self.assess_subscribers(status, snaps, &mut watch, agent, events, now);
        }

        report.pair_state = status.pair_state;
        Ok(report)
    }

    /// Load, tick, save: the persist-at-end-of-tick contract. A write
    /// conflict aborts the tick's effects on storage; the next tick
    /// reloads and recomputes.
    #[allow(clippy::too_many_arguments)]
    pub fn reconcile(
        &self,
        store: &mut dyn StatusStore,
        snaps: &[PodSnapshot],
        runner: &mut dyn ActionRunner,
        agent: &mut dyn AgentGateway,
        orchestrator: &mut dyn Orchestrator,
        events: &mut dyn EventSink,
        upgrade_requested: bool,
        now: u64,
    ) -> Result<TickReport, SupervisorError> {
        let mut versioned = store.load()?;
        let report = self.tick(
            &mut versioned.status,
            snaps,
            runner,
            agent,
            orchestrator,
            events,
            upgrade_requested,
            now,
        )?;
        store.save(&versioned.status, versioned.revision)?;
        Ok(report)
    }

    fn assess_pod(
        &self,
        status: &mut ReconcileStatus,
        snaps: &[PodSnapshot],
        pod: usize,
        runner: &mut dyn ActionRunner,
        agent: &mut dyn AgentGateway,
        events: &mut dyn EventSink,
        now: u64,
    ) -> Option<Assessment> {
        let Some((flow_name, flow)) = flows::select_flow(&self.cfg, status, pod) else {
            if !self.cfg.replicated
                && status.pods[pod].state == PodAnswer::ManualInterventionRequired
            {
                debug!("pod {} requires manual intervention", status.pods[pod].name);
            } else {
                let msg = format!("No flow to run for pod {}", status.pods[pod].name);
                debug!("{}", msg);
            }
            return None;
        };

        let assessment = {
            let mut ctx = EvalCtx {
                pod,
                snaps,
                status: &mut *status,
                runner: &mut *runner,
                agent: &mut *agent,
                events: &mut *events,
                cfg: &self.cfg,
                now,
            };
            flow(&mut ctx)
        };

        debug!(
            "{} answered {:?} (ready {})",
            flow_name, assessment.answer, assessment.ready
        );
        if let Some(diag) = &assessment.diagnostic {
            let role = match status.pods[pod].intended {
                Role::Active => "Active",
                Role::Standby => "Standby",
                Role::Unassigned => "Pod",
            };
            events.publish(
                EventKind::Error,
                &format!("{} {}: {}", role, status.pods[pod].name, diag),
                true,
            );
        }

        if assessment.answer != PodAnswer::Unknown {
            self.update_readiness(status, pod, assessment.ready, events);
        }

        // A standalone member keeps its previous state through an
        // Unknown tick rather than flapping.
        if self.cfg.replicated || assessment.answer != PodAnswer::Unknown {
            status.pods[pod].set_state(assessment.answer, now);
        }

        Some(assessment)
    }

    fn update_readiness(
        &self,
        status: &mut ReconcileStatus,
        pod: usize,
        ready: bool,
        events: &mut dyn EventSink,
    ) {
        let record = &mut status.pods[pod];
        record.prev_ready = record.ready;
        record.ready = ready;
        if record.prev_ready != record.ready {
            let msg = if ready {
                format!("Pod {} is Ready", record.name)
            } else {
                format!("Pod {} is Not Ready", record.name)
            };
            events.publish(EventKind::StateChange, &msg, false);
        }

        // Where should incoming connections be steered?
        let active = ready && record.intended == Role::Active;
        let prev_active = record.active_ready;
        record.active_ready = active;
        if prev_active != active {
            let msg = if active {
                format!("Pod {} is Active Ready", record.name)
            } else {
                format!("Pod {} is Not Active Ready", record.name)
            };
            events.publish(EventKind::StateChange, &msg, false);
        }
    }

    /// Twosafe with return disabled or local commit makes "who is
    /// ahead" unanswerable; latch that while we can still see the pods.
    fn latch_both_down_eligibility(&self, status: &mut ReconcileStatus, snaps: &[PodSnapshot]) {
        if !self.cfg.replicated || status.both_down_recovery_ineligible {
            return;
        }
        for snap in snaps.iter().take(2) {
            if snap.using_twosafe {
                status.using_twosafe = true;
                if snap.disable_return || snap.local_commit {
                    status.both_down_recovery_ineligible = true;
                }
            }
        }
    }

    fn summarize_replicas(
        &self,
        status: &mut ReconcileStatus,
        events: &mut dyn EventSink,
        _now: u64,
    ) {
        let total = status
            .pods
            .iter()
            .filter(|p| p.kind == PodKind::Database)
            .count();
        let ready = status
            .pods
            .iter()
            .filter(|p| p.kind == PodKind::Database && p.ready)
            .count();
        let summary = if ready == total && total > 0 {
            ReplicaReadiness::AllReplicasReady
        } else if ready == 0 {
            ReplicaReadiness::NoReplicasReady
        } else {
            ReplicaReadiness::SomeReplicasReady
        };
        if status.replica_readiness != summary {
            events.publish(
                EventKind::StateChange,
                &format!(
                    "Replicas were {}, now {}",
                    status.replica_readiness, summary
                ),
                false,
            );
            status.replica_readiness = summary;
        }
    }

    fn summarize_active_pods(&self, status: &mut ReconcileStatus) {
        use PairState as S;
        if !self.cfg.replicated {
            status.active_pods = "N/A".to_string();
            return;
        }
        status.active_pods = match status.pair_state {
            S::Failed
            | S::Initializing
            | S::BothDown
            | S::OneDown
            | S::ActiveDown
            | S::ManualInterventionRequired
            | S::Reexamine
            | S::WaitingForActive
            | S::ConfiguringActive => "None".to_string(),
            S::Normal | S::StandbyDown | S::ActiveTakeover | S::StandbyStarting
            | S::StandbyCatchup => {
                if status.pods.len() >= 2
                    && status.pods[0].initialized
                    && status.pods[1].initialized
                {
                    status
                        .intended_active()
                        .map(|(a, _)| status.pods[a].name.clone())
                        .unwrap_or_else(|| "None".to_string())
                } else {
                    status.active_pods.clone()
                }
            }
        };
    }

    #[allow(clippy::too_many_arguments)]
    fn drive_upgrade(
        &self,
        status: &mut ReconcileStatus,
        snaps: &[PodSnapshot],
        runner: &mut dyn ActionRunner,
        agent: &mut dyn AgentGateway,
        orchestrator: &mut dyn Orchestrator,
        events: &mut dyn EventSink,
        upgrade_requested: bool,
        upgrade_active: bool,
        now: u64,
    ) -> bool {
        if !self.cfg.replicated {
            return false;
        }

        // A delete that failed earlier keeps retrying until it sticks.
        let retry_leg = if status.upgrade.image_update_pending {
            if status.upgrade.phase == Some(UpgradePhase::UpgradingActive)
                || status.upgrade.standby_status == Some(TaskStatus::Success)
            {
                Some(UpgradeLeg::Active)
            } else {
                Some(UpgradeLeg::Standby)
            }
        } else {
            None
        };

        if upgrade_active {
            // The standby leg just finished; drain the active before
            // deleting it, and prove the standby has caught up.
            if let Some((active, _)) = status.intended_active() {
                if let Err(err) = agent.quiesce(active) {
                    warn!("quiesce before active upgrade failed: {}", err);
                    events.publish(
                        EventKind::UpgradeError,
                        "Could not quiesce the database, standby behind active",
                        true,
                    );
                    events.publish(EventKind::UpgradeError, "Upgrade aborted", true);
                    commit_pair_state(status, PairState::ManualInterventionRequired, events, now);
                    let mut params = ActionParams::new();
                    params.insert("dbName".to_string(), status.name.clone());
                    if let Err(err) = runner.run(active, Action::OpenDb, &params) {
                        warn!("reopening database after aborted upgrade failed: {}", err);
                    }
                    return false;
                }
            }
            info!("quiesce complete, starting the active upgrade leg");
            return upgrade::init_upgrade(
                UpgradeLeg::Active,
                status,
                snaps,
                &self.cfg,
                self.engine.upgrade_table(),
                orchestrator,
                events,
                now,
            )
            .is_ok();
        }

        if let Some(leg) = retry_leg {
            return upgrade::init_upgrade(
                leg,
                status,
                snaps,
                &self.cfg,
                self.engine.upgrade_table(),
                orchestrator,
                events,
                now,
            )
            .is_ok();
        }

        if upgrade_requested && !status.upgrade.in_progress() {
            return upgrade::init_upgrade(
                UpgradeLeg::Standby,
                status,
                snaps,
                &self.cfg,
                self.engine.upgrade_table(),
                orchestrator,
                events,
                now,
            )
            .is_ok();
        }

        false
    }

    fn assess_subscribers(
        &self,
        status: &mut ReconcileStatus,
        snaps: &[PodSnapshot],
        runner: &mut dyn ActionRunner,
        agent: &mut dyn AgentGateway,
        events: &mut dyn EventSink,
        now: u64,
    ) {
        for pod in 0..status.pods.len() {
            if status.pods[pod].kind != PodKind::Subscriber {
                continue;
            }
            let Some((flow_name, flow)) = flows::select_flow(&self.cfg, status, pod) else {
                debug!("no flow for subscriber {}", status.pods[pod].name);
                continue;
            };
            let assessment = {
                let mut ctx = EvalCtx {
                    pod,
                    snaps,
                    status: &mut *status,
                    runner: &mut *runner,
                    agent: &mut *agent,
                    events: &mut *events,
                    cfg: &self.cfg,
                    now,
                };
                flow(&mut ctx)
            };
            debug!("{} answered {:?}", flow_name, assessment.answer);
            if let Some(diag) = &assessment.diagnostic {
                events.publish(
                    EventKind::Error,
                    &format!("Subscriber {}: {}", status.pods[pod].name, diag),
                    true,
                );
            }
            if assessment.answer != PodAnswer::Unknown {
                self.update_readiness(status, pod, assessment.ready, events);
                status.pods[pod].set_state(assessment.answer, now);
            }
        }

        let total = status
            .pods
            .iter()
            .filter(|p| p.kind == PodKind::Subscriber)
            .count();
        let ready = status
            .pods
            .iter()
            .filter(|p| p.kind == PodKind::Subscriber && p.ready)
            .count();
        let summary = if total > 0 && ready == total {
            SubscriberReadiness::AllSubscribersReady
        } else if ready == 0 {
            SubscriberReadiness::NoSubscribersReady
        } else {
            SubscriberReadiness::SomeSubscribersReady
        };
        if status.subscribers.state != summary {
            events.publish(
                EventKind::StateChange,
                &format!(
                    "Subscribers were {}, now {}",
                    status.subscribers.state, summary
                ),
                false,
            );
            status.subscribers.prev_state = status.subscribers.state;
            status.subscribers.state = summary;
            status.subscribers.last_state_switch = now;
        }
    }
}
