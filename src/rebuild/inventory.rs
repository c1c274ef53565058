//! Per-node replica inventory (local unit map).
//!
//! During rebuild every node uploads the replicas it hosts, unit by unit.
//! The map travels across the transfer boundary as bincode bytes; its
//! internals stay plain serde types.

use crate::entity::failover_unit::{FailoverUnit, Replica, ReplicaDescription};
use crate::entity::id::{FailoverUnitId, NodeInstance};
use crate::rebuild::generation::GenerationNumber;
use serde::{Deserialize, Serialize};

/// One unit as seen by one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUnitEntry {
    /// The unit's id.
    pub id: FailoverUnitId,

    /// Owning service name, as the node knows it.
    pub service_name: String,

    /// Desired replica count, as the node knows it.
    pub target_replica_count: usize,

    /// Minimum replica count, as the node knows it.
    pub min_replica_count: usize,

    /// Replicas of the unit the node hosts.
    pub replicas: Vec<ReplicaDescription>,
}

impl LocalUnitEntry {
    /// Build a fresh cache value seeded from this entry.
    ///
    /// Used when rebuild discovers a unit the cache has never seen.
    pub fn to_failover_unit(&self) -> FailoverUnit {
        let mut unit = FailoverUnit::new(
            self.id,
            self.service_name.clone(),
            self.target_replica_count,
            self.min_replica_count,
        );
        for description in &self.replicas {
            unit.add_replica(Replica::new(
                description.node,
                description.role,
                description.state,
            ));
        }
        unit
    }
}

/// A node's full replica inventory, tagged with the generation it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUnitMap {
    /// The uploading node.
    pub node: NodeInstance,

    /// The generation this upload answers.
    pub generation: GenerationNumber,

    /// One entry per unit the node hosts replicas for.
    pub entries: Vec<LocalUnitEntry>,
}

impl LocalUnitMap {
    /// Create an inventory for a node answering a generation.
    pub fn new(node: NodeInstance, generation: GenerationNumber) -> Self {
        Self {
            node,
            generation,
            entries: Vec::new(),
        }
    }

    /// Number of units in the inventory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the node hosts nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize for the transfer boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from the transfer boundary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
