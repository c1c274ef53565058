//! Closed action set applied after commit.
//!
//! Tasks never send messages or mutate anything beyond their checked-out
//! unit; they append actions to an [`ActionQueue`]. Actions are handed to
//! the external [`ActionApplier`] only after the task's update committed,
//! so an aborted task leaves no externally visible trace.

use crate::entity::id::{FailoverUnitId, NodeId, NodeInstance};
use crate::entity::failover_unit::ReplicaRole;
use crate::rebuild::generation::GenerationNumber;
use serde::{Deserialize, Serialize};

/// Health condition raised alongside reconfiguration decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthReportKind {
    /// The unit has fewer available replicas than its minimum.
    QuorumLost,
    /// A replica has been stuck in build longer than expected.
    ReplicaStuck,
}

/// One ordered output of a state machine task.
///
/// The set is closed: dispatch is by pattern matching, and every variant
/// carries the unit it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateMachineAction {
    /// Create a replica on a node.
    AddReplica {
        id: FailoverUnitId,
        node: NodeInstance,
        role: ReplicaRole,
    },

    /// Drop the replica on a node.
    DropReplica {
        id: FailoverUnitId,
        node: NodeInstance,
    },

    /// Promote the replica on a node to primary.
    PromoteReplica {
        id: FailoverUnitId,
        node: NodeInstance,
    },

    /// Move a replica between nodes (add on target, drop on source once
    /// built).
    MoveReplica {
        id: FailoverUnitId,
        from: NodeInstance,
        to: NodeInstance,
    },

    /// Trace a completed or decided movement.
    TraceMovement {
        id: FailoverUnitId,
        from: NodeId,
        to: NodeId,
    },

    /// Trace that the unit's data cannot be recovered from any replica.
    TraceDataLoss {
        id: FailoverUnitId,
        generation: GenerationNumber,
    },

    /// Raise a health report for the unit.
    RaiseHealthReport {
        id: FailoverUnitId,
        kind: HealthReportKind,
        description: String,
    },
}

impl StateMachineAction {
    /// The unit this action targets.
    pub fn unit_id(&self) -> FailoverUnitId {
        match self {
            Self::AddReplica { id, .. }
            | Self::DropReplica { id, .. }
            | Self::PromoteReplica { id, .. }
            | Self::MoveReplica { id, .. }
            | Self::TraceMovement { id, .. }
            | Self::TraceDataLoss { id, .. }
            | Self::RaiseHealthReport { id, .. } => *id,
        }
    }
}

/// Ordered actions accumulated during one task evaluation.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: Vec<StateMachineAction>,
}

impl ActionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action.
    pub fn push(&mut self, action: StateMachineAction) {
        self.actions.push(action);
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check whether no actions are queued.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Peek at the queued actions in order.
    pub fn actions(&self) -> &[StateMachineAction] {
        &self.actions
    }

    /// Take the queued actions, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<StateMachineAction> {
        std::mem::take(&mut self.actions)
    }
}

/// External boundary turning actions into outbound messages and reports.
///
/// The core performs no network I/O; the embedding runtime implements this.
pub trait ActionApplier: Send + Sync {
    /// Apply one committed action.
    fn apply(&self, action: StateMachineAction);
}

/// Applier that logs and discards actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullApplier;

impl ActionApplier for NullApplier {
    fn apply(&self, action: StateMachineAction) {
        tracing::debug!(unit_id = %action.unit_id(), ?action, "action discarded");
    }
}
