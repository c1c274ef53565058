//! Placement convergence task.
//!
//! Given a placement decision from the balancer, compute the node-level
//! actions needed to converge the current replica set. A movement whose
//! precondition no longer holds (replica concurrently dropped, target node
//! already occupied, unit deleted) reverts and reports a no-op rather than
//! forcing a stale placement.

use crate::entity::failover_unit::{Replica, ReplicaFlags, ReplicaRole, ReplicaState};
use crate::entity::handle::UnitCheckout;
use crate::entity::id::{NodeId, NodeInstance};
use crate::tasks::action::{ActionQueue, StateMachineAction};
use crate::tasks::TaskOutcome;
use serde::{Deserialize, Serialize};

/// One placement decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaMovement {
    /// Create a replica on a node that has none.
    Add { node: NodeInstance },

    /// Drop the replica on a node.
    Drop { node: NodeId },

    /// Move the replica from one node to another.
    Move { from: NodeId, to: NodeInstance },

    /// Swap primary role onto a ready secondary.
    SwapPrimary { from: NodeId, to: NodeId },
}

/// Task converging placement toward a [`ReplicaMovement`].
#[derive(Debug, Clone)]
pub struct MovementTask {
    /// The decided movement.
    pub movement: ReplicaMovement,
}

impl MovementTask {
    /// Create a task for one movement.
    pub fn new(movement: ReplicaMovement) -> Self {
        Self { movement }
    }

    pub(crate) fn check(self, checkout: UnitCheckout, actions: &mut ActionQueue) -> TaskOutcome {
        let unit = checkout.current();
        if unit.is_deleted {
            return TaskOutcome::Reverted;
        }
        let id = unit.id;

        match self.movement {
            ReplicaMovement::Add { node } => {
                if unit.replica_on(node.id).is_some_and(Replica::is_up) {
                    // Already placed; nothing to converge.
                    return TaskOutcome::Reverted;
                }
                let mut update = checkout.enable_update(false);
                // A dropped tombstone on the node gives way to the new replica.
                update.current_mut().remove_replica(node.id);
                update
                    .current_mut()
                    .add_replica(Replica::new(node, ReplicaRole::Idle, ReplicaState::InBuild));
                actions.push(StateMachineAction::AddReplica {
                    id,
                    node,
                    role: ReplicaRole::Idle,
                });
                update.submit();
                TaskOutcome::Completed { updated: true }
            }

            ReplicaMovement::Drop { node } => {
                let Some(replica) = unit.replica_on(node) else {
                    return TaskOutcome::Reverted;
                };
                if !replica.is_up() || replica.flags.contains(ReplicaFlags::TO_BE_DROPPED) {
                    return TaskOutcome::Reverted;
                }
                let target = replica.node;
                let mut update = checkout.enable_update(false);
                update.current_mut().start_drop(node);
                actions.push(StateMachineAction::DropReplica { id, node: target });
                update.submit();
                TaskOutcome::Completed { updated: true }
            }

            ReplicaMovement::Move { from, to } => {
                let Some(source) = unit.replica_on(from) else {
                    // Concurrently dropped; the decision is stale.
                    return TaskOutcome::Reverted;
                };
                if !source.is_up() || unit.replica_on(to.id).is_some_and(Replica::is_up) {
                    return TaskOutcome::Reverted;
                }
                let source_instance = source.node;
                let mut update = checkout.enable_update(false);
                {
                    let working = update.current_mut();
                    if let Some(replica) = working.replica_on_mut(from) {
                        replica
                            .flags
                            .insert(ReplicaFlags::TO_BE_DROPPED | ReplicaFlags::MOVE_IN_PROGRESS);
                    }
                    working.remove_replica(to.id);
                    working.add_replica(Replica::new(to, ReplicaRole::Idle, ReplicaState::InBuild));
                }
                actions.push(StateMachineAction::MoveReplica {
                    id,
                    from: source_instance,
                    to,
                });
                actions.push(StateMachineAction::TraceMovement {
                    id,
                    from,
                    to: to.id,
                });
                update.submit();
                TaskOutcome::Completed { updated: true }
            }

            ReplicaMovement::SwapPrimary { from, to } => {
                let Some(candidate) = unit.replica_on(to) else {
                    return TaskOutcome::Reverted;
                };
                let valid = unit.primary().is_some_and(|p| p.node.id == from)
                    && candidate.role == ReplicaRole::Secondary
                    && candidate.is_available();
                if !valid {
                    return TaskOutcome::Reverted;
                }
                let target = candidate.node;
                let mut update = checkout.enable_update(false);
                if let Some(replica) = update.current_mut().replica_on_mut(to) {
                    replica.flags.insert(ReplicaFlags::TO_BE_PROMOTED);
                }
                actions.push(StateMachineAction::PromoteReplica { id, node: target });
                actions.push(StateMachineAction::TraceMovement { id, from, to });
                update.submit();
                TaskOutcome::Completed { updated: true }
            }
        }
    }
}
