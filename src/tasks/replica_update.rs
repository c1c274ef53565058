//! Node-reported replica reconciliation.
//!
//! Nodes periodically report the state of the replicas they host. This task
//! folds one report into the cached unit: replicas reported dropped are
//! removed, newer incarnations replace older ones, and pending-action flags
//! are cleared only once the report confirms the intended state. A report
//! that takes the set below its minimum raises a quorum-loss health report.

use crate::entity::failover_unit::{
    FailoverUnit, Replica, ReplicaDescription, ReplicaFlags, ReplicaRole, ReplicaState,
};
use crate::entity::handle::UnitCheckout;
use crate::entity::id::{NodeId, NodeInstance};
use crate::tasks::action::{ActionQueue, HealthReportKind, StateMachineAction};
use crate::tasks::TaskOutcome;

/// Task reconciling one node's report for one unit.
#[derive(Debug, Clone)]
pub struct ReplicaUpdateTask {
    /// The reporting node.
    pub from: NodeInstance,

    /// The reported replica state.
    pub description: ReplicaDescription,
}

impl ReplicaUpdateTask {
    /// Create a reconciliation task for one report.
    pub fn new(from: NodeInstance, description: ReplicaDescription) -> Self {
        Self { from, description }
    }

    pub(crate) fn check(self, checkout: UnitCheckout, actions: &mut ActionQueue) -> TaskOutcome {
        let unit = checkout.current();
        if unit.is_deleted {
            return TaskOutcome::Reverted;
        }
        let id = unit.id;
        let reported = &self.description;

        let Some(cached) = unit.replica_on(reported.node.id) else {
            // A node reporting a drop of something we never knew about needs
            // no state change; anything else is a stale or foreign report.
            return TaskOutcome::Reverted;
        };

        // Reports from an older incarnation of the hosting node are stale.
        if cached.node.instance > reported.node.instance {
            return TaskOutcome::Reverted;
        }

        if reported.state == ReplicaState::Dropped {
            let dropped_node = cached.node.id;
            let was_moving = cached.flags.contains(ReplicaFlags::MOVE_IN_PROGRESS);
            let had_quorum = !unit.is_quorum_lost();
            let mut update = checkout.enable_update(false);
            update.current_mut().remove_replica(dropped_node);
            if was_moving {
                // The source half of a move is gone; the movement is done.
                actions.push(StateMachineAction::TraceMovement {
                    id,
                    from: dropped_node,
                    to: dropped_node,
                });
            }
            if had_quorum && update.current().is_quorum_lost() {
                actions.push(quorum_lost_report(update.current(), dropped_node));
            }
            update.submit();
            return TaskOutcome::Completed { updated: true };
        }

        let newer_incarnation = reported.node.supersedes(&cached.node);
        let state_changed = cached.state != reported.state || cached.role != reported.role;
        let flags_satisfied = self.flags_satisfied_by_report(cached);

        if !newer_incarnation && !state_changed && !flags_satisfied {
            // Fully consistent already; confirm without an update.
            return TaskOutcome::Completed { updated: false };
        }

        let node_id = cached.node.id;
        let had_quorum = !unit.is_quorum_lost();
        let mut update = checkout.enable_update(false);
        if let Some(replica) = update.current_mut().replica_on_mut(node_id) {
            if newer_incarnation {
                replica.node = reported.node;
                replica.flags = ReplicaFlags::empty();
            }
            replica.state = reported.state;
            replica.role = reported.role;
            // Pending flags clear only when the report confirms the intent.
            if replica.flags.contains(ReplicaFlags::TO_BE_PROMOTED)
                && reported.role == ReplicaRole::Primary
            {
                replica.flags.remove(ReplicaFlags::TO_BE_PROMOTED);
            }
        }
        if had_quorum && update.current().is_quorum_lost() {
            actions.push(quorum_lost_report(update.current(), node_id));
        }
        update.submit();
        TaskOutcome::Completed { updated: true }
    }

    fn flags_satisfied_by_report(&self, cached: &Replica) -> bool {
        cached.flags.contains(ReplicaFlags::TO_BE_PROMOTED)
            && self.description.role == ReplicaRole::Primary
    }
}

fn quorum_lost_report(unit: &FailoverUnit, node: NodeId) -> StateMachineAction {
    StateMachineAction::RaiseHealthReport {
        id: unit.id,
        kind: HealthReportKind::QuorumLost,
        description: format!(
            "{} of {} required replicas available after report from {}",
            unit.available_replica_count(),
            unit.min_replica_count,
            node
        ),
    }
}
