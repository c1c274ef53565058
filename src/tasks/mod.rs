//! State machine tasks and actions.
//!
//! A task inspects one checked-out unit and either commits an update plus an
//! ordered action list, or reverts and reports a no-op. The variant set is
//! closed; dispatch is by pattern matching, no runtime type inquiry:
//!
//! - [`movement::MovementTask`] - converge placement toward a decision
//! - [`replica_update::ReplicaUpdateTask`] - reconcile node-reported state
//! - [`upgrade::UpgradeTask`] - evacuate a node under upgrade
//! - [`rebuild::RebuildTask`] - merge a node's inventory view during rebuild
//!
//! A task runs synchronously to completion once dispatched; the checkout
//! window stays short and bounded.

pub mod action;
pub mod movement;
pub mod replica_update;
pub mod upgrade;

pub mod rebuild;

use crate::core::error::CoreResult;
use crate::entity::cache::FailoverUnitCache;
use crate::entity::handle::UnitCheckout;
use crate::entity::id::FailoverUnitId;
use action::{ActionApplier, ActionQueue};

/// Result of one task evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task finished; `updated` is true when a new value was committed.
    Completed { updated: bool },

    /// The task observed an inconsistent or already-satisfied precondition
    /// and released the handle without committing. No actions are applied.
    Reverted,
}

impl TaskOutcome {
    /// Check whether the evaluation committed an update.
    pub fn updated(&self) -> bool {
        matches!(self, Self::Completed { updated: true })
    }
}

/// Polymorphic-over-variant state machine task.
#[derive(Debug, Clone)]
pub enum StateMachineTask {
    /// Placement convergence.
    Movement(movement::MovementTask),
    /// Node-reported replica reconciliation.
    ReplicaUpdate(replica_update::ReplicaUpdateTask),
    /// Node evacuation for upgrade.
    Upgrade(upgrade::UpgradeTask),
    /// Inventory merge during rebuild.
    Rebuild(rebuild::RebuildTask),
}

impl StateMachineTask {
    /// Short name for tracing.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Movement(_) => "movement",
            Self::ReplicaUpdate(_) => "replica-update",
            Self::Upgrade(_) => "upgrade",
            Self::Rebuild(_) => "rebuild",
        }
    }

    /// Evaluate the task against a checked-out unit.
    ///
    /// Consumes the checkout: the task either converts it into an update
    /// and submits, or drops it (revert). Emitted actions are meaningful
    /// only when the outcome is not [`TaskOutcome::Reverted`].
    pub fn check(self, checkout: UnitCheckout, actions: &mut ActionQueue) -> TaskOutcome {
        match self {
            Self::Movement(task) => task.check(checkout, actions),
            Self::ReplicaUpdate(task) => task.check(checkout, actions),
            Self::Upgrade(task) => task.check(checkout, actions),
            Self::Rebuild(task) => task.check(checkout, actions),
        }
    }
}

/// Check out a unit, run a task against it, and apply its actions.
///
/// Actions reach the applier only after the task committed (or completed
/// without needing an update); a reverted task applies nothing.
pub fn run_task(
    cache: &FailoverUnitCache,
    id: FailoverUnitId,
    task: StateMachineTask,
    applier: &dyn ActionApplier,
) -> CoreResult<TaskOutcome> {
    let kind = task.kind();
    let checkout = cache.checkout(id)?;
    let mut actions = ActionQueue::new();
    let outcome = task.check(checkout, &mut actions);

    match outcome {
        TaskOutcome::Reverted => {
            tracing::debug!(unit_id = %id, task = kind, "task reverted, no actions");
        }
        TaskOutcome::Completed { updated } => {
            let emitted = actions.len();
            for action in actions.drain() {
                applier.apply(action);
            }
            tracing::debug!(unit_id = %id, task = kind, updated, emitted, "task completed");
        }
    }
    Ok(outcome)
}
