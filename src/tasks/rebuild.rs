//! Inventory merge during rebuild.
//!
//! While the coordinator rebuilds the cluster-wide unit map, each node
//! uploads its local inventory. This task folds one node's view of one unit
//! into the cache: replicas the node hosts are refreshed or added, and a
//! replica the cache attributes to the node but the node no longer reports
//! for itself is marked dropped.

use crate::entity::failover_unit::{Replica, ReplicaDescription, ReplicaState};
use crate::entity::handle::UnitCheckout;
use crate::entity::id::NodeInstance;
use crate::tasks::action::ActionQueue;
use crate::tasks::TaskOutcome;

/// Task merging one node's inventory view of one unit.
#[derive(Debug, Clone)]
pub struct RebuildTask {
    /// The uploading node.
    pub from: NodeInstance,

    /// Replicas of this unit the node reports hosting.
    pub reported: Vec<ReplicaDescription>,
}

impl RebuildTask {
    /// Create a merge task for one upload entry.
    pub fn new(from: NodeInstance, reported: Vec<ReplicaDescription>) -> Self {
        Self { from, reported }
    }

    pub(crate) fn check(self, checkout: UnitCheckout, _actions: &mut ActionQueue) -> TaskOutcome {
        let unit = checkout.current();
        if unit.is_deleted {
            return TaskOutcome::Reverted;
        }

        // The upload describes only replicas hosted on the uploading node.
        let local: Vec<&ReplicaDescription> = self
            .reported
            .iter()
            .filter(|d| d.node.id == self.from.id)
            .collect();

        let cached_has_local = unit
            .replica_on(self.from.id)
            .is_some_and(Replica::is_up);
        if local.is_empty() && !cached_has_local {
            return TaskOutcome::Completed { updated: false };
        }

        let mut update = checkout.enable_update(false);
        let working = update.current_mut();
        let mut changed = false;

        for description in &local {
            match working.replica_on_mut(description.node.id) {
                Some(replica) => {
                    let refresh = description.node.supersedes(&replica.node)
                        || replica.state != description.state
                        || replica.role != description.role;
                    if refresh {
                        replica.node = description.node;
                        replica.state = description.state;
                        replica.role = description.role;
                        changed = true;
                    }
                }
                None => {
                    working.add_replica(Replica::new(
                        description.node,
                        description.role,
                        description.state,
                    ));
                    changed = true;
                }
            }
        }

        // Cached replica on the node, absent from its own upload: the node
        // lost it.
        if local.is_empty() {
            if let Some(replica) = working.replica_on_mut(self.from.id) {
                if replica.is_up() {
                    replica.state = ReplicaState::Dropped;
                    changed = true;
                }
            }
        }

        if changed {
            update.submit();
            TaskOutcome::Completed { updated: true }
        } else {
            update.revert();
            TaskOutcome::Completed { updated: false }
        }
    }
}
