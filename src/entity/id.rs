//! Unit, node, and node-instance identifiers.

use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Stable identifier for a cluster node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// A node identity plus its incarnation.
///
/// A node that restarts reappears with the same [`NodeId`] but a higher
/// incarnation; state reported by an older incarnation is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInstance {
    /// The stable node identity.
    pub id: NodeId,

    /// Incarnation counter, increments on each restart.
    pub instance: u64,
}

impl NodeInstance {
    /// Create a new node instance.
    pub const fn new(id: NodeId, instance: u64) -> Self {
        Self { id, instance }
    }

    /// Check whether this instance refers to the same node, ignoring
    /// incarnation.
    pub fn is_same_node(&self, other: &NodeInstance) -> bool {
        self.id == other.id
    }

    /// Check whether this instance supersedes another incarnation of the
    /// same node.
    pub fn supersedes(&self, other: &NodeInstance) -> bool {
        self.id == other.id && self.instance > other.instance
    }
}

impl std::fmt::Display for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.instance)
    }
}

/// Stable identifier for a failover unit (a consistency-unit id).
///
/// Immutable once assigned. Ids are GUID-like 128-bit values, either assigned
/// directly or derived from a service name and partition index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FailoverUnitId(pub u128);

impl FailoverUnitId {
    /// Create an id from a raw 128-bit value.
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Derive a stable id from a service name and partition index.
    pub fn derive(service_name: &str, partition_index: u32) -> Self {
        let mut high = XxHash64::with_seed(0);
        high.write(service_name.as_bytes());
        high.write_u32(partition_index);

        let mut low = XxHash64::with_seed(0x9e37_79b9_7f4a_7c15);
        low.write(service_name.as_bytes());
        low.write_u32(partition_index);

        Self(((high.finish() as u128) << 64) | low.finish() as u128)
    }
}

impl std::fmt::Display for FailoverUnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let raw = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (raw >> 96) as u32,
            (raw >> 80) as u16,
            (raw >> 64) as u16,
            (raw >> 48) as u16,
            raw & 0xffff_ffff_ffff
        )
    }
}
