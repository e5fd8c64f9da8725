//! Tunable behavior of the reconciliation core.

use serde::{Deserialize, Serialize};

/// What to do when both members of a pair are down at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BothDownBehavior {
    /// Pick the member whose database is most likely ahead and wait for
    /// it to come back as the new active.
    Best,
    /// Always hand the decision to an operator.
    Manual,
}

/// Automated image upgrade policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeStrategy {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds an already-seen pod may stay unreachable before it is
    /// declared down. A pod that has never been reachable does not time
    /// out; it is still booting.
    pub unreachable_timeout_secs: u64,
    /// Seconds a pod may sit in a non-terminal replication state before
    /// that alone escalates it.
    pub rep_state_timeout_secs: u64,
    /// Seconds a deleted-for-upgrade pod may report Down before its leg
    /// of the upgrade is declared failed. Zero disables the timeout.
    pub upgrade_down_pod_timeout_secs: u64,
    pub both_down_behavior: BothDownBehavior,
    pub upgrade_strategy: UpgradeStrategy,
    /// When false the object is standalone and no replication scheme is
    /// ever configured.
    pub replicated: bool,
    /// Standalone replica count (ignored for pairs, which are always 2).
    pub replicas: usize,
    /// Subscriber replica count.
    pub subscribers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            unreachable_timeout_secs: 30,
            rep_state_timeout_secs: 30,
            upgrade_down_pod_timeout_secs: 600,
            both_down_behavior: BothDownBehavior::Best,
            upgrade_strategy: UpgradeStrategy::Auto,
            replicated: true,
            replicas: 1,
            subscribers: 0,
        }
    }
}

impl Config {
    pub fn standalone() -> Self {
        Config {
            replicated: false,
            ..Config::default()
        }
    }
}
