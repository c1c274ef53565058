//! Node evacuation for upgrade.
//!
//! Before a node is taken down for an upgrade, its replicas must move off.
//! For a primary the task first swaps the role onto a ready secondary; for a
//! secondary or idle replica it schedules a drop. A unit with nothing on the
//! node reverts to a no-op.

use crate::entity::failover_unit::{ReplicaFlags, ReplicaRole};
use crate::entity::handle::UnitCheckout;
use crate::entity::id::NodeId;
use crate::tasks::action::{ActionQueue, HealthReportKind, StateMachineAction};
use crate::tasks::TaskOutcome;

/// Task evacuating one node for one unit.
#[derive(Debug, Clone)]
pub struct UpgradeTask {
    /// The node being upgraded.
    pub node: NodeId,
}

impl UpgradeTask {
    /// Create an evacuation task for a node.
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }

    pub(crate) fn check(self, checkout: UnitCheckout, actions: &mut ActionQueue) -> TaskOutcome {
        let unit = checkout.current();
        if unit.is_deleted {
            return TaskOutcome::Reverted;
        }
        let id = unit.id;

        let Some(resident) = unit.replica_on(self.node) else {
            return TaskOutcome::Reverted;
        };
        if !resident.is_up() || resident.flags.contains(ReplicaFlags::TO_BE_DROPPED) {
            // Already on its way out.
            return TaskOutcome::Reverted;
        }

        if resident.role == ReplicaRole::Primary {
            // Swap the primary role away first; the drop happens on a later
            // pass once the promotion is confirmed.
            let Some(successor) = unit
                .replicas
                .iter()
                .find(|r| r.role == ReplicaRole::Secondary && r.is_available())
            else {
                // No viable successor: keep the primary where it is and
                // surface the blocked evacuation.
                actions.push(StateMachineAction::RaiseHealthReport {
                    id,
                    kind: HealthReportKind::ReplicaStuck,
                    description: format!("upgrade of {} blocked: no promotable secondary", self.node),
                });
                return TaskOutcome::Completed { updated: false };
            };
            let target = successor.node;
            let mut update = checkout.enable_update(false);
            if let Some(replica) = update.current_mut().replica_on_mut(target.id) {
                replica.flags.insert(ReplicaFlags::TO_BE_PROMOTED);
            }
            actions.push(StateMachineAction::PromoteReplica { id, node: target });
            update.submit();
            return TaskOutcome::Completed { updated: true };
        }

        let target = resident.node;
        let mut update = checkout.enable_update(false);
        update.current_mut().start_drop(self.node);
        actions.push(StateMachineAction::DropReplica { id, node: target });
        update.submit();
        TaskOutcome::Completed { updated: true }
    }
}
