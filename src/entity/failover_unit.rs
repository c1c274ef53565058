//! Replica-set state for one failover unit.
//!
//! A failover unit is the unit of replication and placement: one replica set
//! for one service partition. The cache owns the authoritative value; tasks
//! mutate it only through an update handle.

use crate::entity::id::{FailoverUnitId, NodeId, NodeInstance};
use serde::{Deserialize, Serialize};

/// Role of a replica within its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaRole {
    /// No role assigned.
    None,
    /// Built but not part of the configuration yet.
    Idle,
    /// Secondary in the current configuration.
    Secondary,
    /// Primary of the current configuration.
    Primary,
}

/// Lifecycle state of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaState {
    /// Persisted state exists but the replica is not open.
    StandBy,
    /// Being built from the primary.
    InBuild,
    /// Fully built and open.
    Ready,
    /// Dropped; retained as a tombstone until reconciled.
    Dropped,
}

bitflags::bitflags! {
    /// Pending-action flags for a replica.
    ///
    /// Flags record intent that has been committed but whose effect is still
    /// in flight on some node; they are cleared when the owning node reports
    /// a consistent state back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ReplicaFlags: u32 {
        /// Replica is scheduled to be dropped.
        const TO_BE_DROPPED   = 0b0000_0001;
        /// Replica is scheduled to be promoted to primary.
        const TO_BE_PROMOTED  = 0b0000_0010;
        /// Dropped replica awaiting removal from the set.
        const PENDING_REMOVE  = 0b0000_0100;
        /// Replica is the source of an in-flight movement.
        const MOVE_IN_PROGRESS = 0b0000_1000;
    }
}

impl Default for ReplicaFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// One replica of a failover unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Hosting node and incarnation.
    pub node: NodeInstance,

    /// Current configuration role.
    pub role: ReplicaRole,

    /// Lifecycle state.
    pub state: ReplicaState,

    /// Pending-action flags.
    pub flags: ReplicaFlags,
}

impl Replica {
    /// Create a new replica in the given role and state with no flags.
    pub fn new(node: NodeInstance, role: ReplicaRole, state: ReplicaState) -> Self {
        Self {
            node,
            role,
            state,
            flags: ReplicaFlags::empty(),
        }
    }

    /// Check whether the replica is not dropped.
    pub fn is_up(&self) -> bool {
        self.state != ReplicaState::Dropped
    }

    /// Check whether the replica is built and usable for quorum.
    pub fn is_available(&self) -> bool {
        self.state == ReplicaState::Ready && !self.flags.contains(ReplicaFlags::TO_BE_DROPPED)
    }
}

/// Externally reported view of one replica.
///
/// This is the shape nodes put on the wire in replica updates and inventory
/// uploads; it carries no pending flags because those are the manager's own
/// bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaDescription {
    /// Hosting node and incarnation.
    pub node: NodeInstance,

    /// Reported role.
    pub role: ReplicaRole,

    /// Reported lifecycle state.
    pub state: ReplicaState,
}

/// Authoritative state of one failover unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverUnit {
    /// Stable unit identifier.
    pub id: FailoverUnitId,

    /// Owning service name.
    pub service_name: String,

    /// Desired replica count.
    pub target_replica_count: usize,

    /// Minimum replica count for write availability.
    pub min_replica_count: usize,

    /// Lookup version; increments on every committed update.
    pub version: u64,

    /// Logical deletion marker (tombstone until garbage collected).
    pub is_deleted: bool,

    /// The replica set.
    pub replicas: Vec<Replica>,
}

impl FailoverUnit {
    /// Create a new unit with an empty replica set.
    pub fn new(
        id: FailoverUnitId,
        service_name: impl Into<String>,
        target_replica_count: usize,
        min_replica_count: usize,
    ) -> Self {
        Self {
            id,
            service_name: service_name.into(),
            target_replica_count,
            min_replica_count,
            version: 0,
            is_deleted: false,
            replicas: Vec::new(),
        }
    }

    /// Get the replica hosted on a node, regardless of incarnation.
    pub fn replica_on(&self, node: NodeId) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.node.id == node)
    }

    /// Get a mutable reference to the replica hosted on a node.
    pub fn replica_on_mut(&mut self, node: NodeId) -> Option<&mut Replica> {
        self.replicas.iter_mut().find(|r| r.node.id == node)
    }

    /// Get the current primary, if one exists and is up.
    pub fn primary(&self) -> Option<&Replica> {
        self.replicas
            .iter()
            .find(|r| r.role == ReplicaRole::Primary && r.is_up())
    }

    /// Count replicas usable for quorum.
    pub fn available_replica_count(&self) -> usize {
        self.replicas.iter().filter(|r| r.is_available()).count()
    }

    /// Count replicas that are not dropped.
    pub fn up_replica_count(&self) -> usize {
        self.replicas.iter().filter(|r| r.is_up()).count()
    }

    /// Check whether the unit has lost write quorum.
    pub fn is_quorum_lost(&self) -> bool {
        self.available_replica_count() < self.min_replica_count
    }

    /// Add a replica to the set.
    ///
    /// The caller must have established that the node hosts no replica of
    /// this unit yet.
    pub fn add_replica(&mut self, replica: Replica) {
        debug_assert!(
            self.replica_on(replica.node.id).is_none(),
            "duplicate replica on {}",
            replica.node
        );
        self.replicas.push(replica);
    }

    /// Mark the replica on a node for dropping.
    ///
    /// Returns false if the node hosts no up replica.
    pub fn start_drop(&mut self, node: NodeId) -> bool {
        match self.replica_on_mut(node) {
            Some(replica) if replica.is_up() => {
                replica.flags.insert(ReplicaFlags::TO_BE_DROPPED);
                true
            }
            _ => false,
        }
    }

    /// Remove the replica hosted on a node from the set entirely.
    ///
    /// Returns the removed replica, if any.
    pub fn remove_replica(&mut self, node: NodeId) -> Option<Replica> {
        let index = self.replicas.iter().position(|r| r.node.id == node)?;
        Some(self.replicas.remove(index))
    }
}

impl std::fmt::Display for FailoverUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} v{} {}/{} replicas",
            self.id,
            self.service_name,
            self.version,
            self.available_replica_count(),
            self.target_replica_count
        )
    }
}
