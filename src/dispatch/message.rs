//! Inbound protocol message shapes.
//!
//! Every message carries a [`GenerationHeader`]; the dispatcher gates on it
//! before any body is looked at. Bodies are plain serde types so the
//! transport can carry them as bincode like the inventory map.

use crate::entity::failover_unit::ReplicaDescription;
use crate::entity::id::{FailoverUnitId, NodeInstance};
use crate::rebuild::coordinator::ProposalReply;
use crate::rebuild::generation::GenerationNumber;
use crate::rebuild::inventory::LocalUnitMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Generation stamp on every inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationHeader {
    /// The sender's view of the cluster generation.
    pub generation: GenerationNumber,

    /// Whether the message targets the primary manager replica.
    pub is_for_primary: bool,
}

impl GenerationHeader {
    /// Create a header addressed to the primary.
    pub fn for_primary(generation: GenerationNumber) -> Self {
        Self {
            generation,
            is_for_primary: true,
        }
    }
}

/// One node's report of one replica's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaMessageBody {
    /// The unit the replica belongs to.
    pub unit_id: FailoverUnitId,

    /// The replica as the node sees it.
    pub replica: ReplicaDescription,
}

/// Periodic load metrics for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLoadMessageBody {
    /// The reporting unit.
    pub unit_id: FailoverUnitId,

    /// Metric name to reported value.
    pub metrics: HashMap<String, u64>,
}

/// A node's full inventory upload during rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMessageBody {
    /// The inventory map.
    pub map: LocalUnitMap,
}

/// The payloads the manager accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// A replica state report from a node.
    ReplicaUpdate(ReplicaMessageBody),

    /// A load report from a node.
    ReportLoad(ReportLoadMessageBody),

    /// A rebuild inventory upload.
    InventoryUpload(InventoryMessageBody),

    /// A reply to an outstanding generation proposal.
    ProposalReply(ProposalReply),
}

impl MessageBody {
    /// Short name for tracing.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReplicaUpdate(_) => "replica-update",
            Self::ReportLoad(_) => "report-load",
            Self::InventoryUpload(_) => "inventory-upload",
            Self::ProposalReply(_) => "proposal-reply",
        }
    }
}

/// A complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The generation stamp.
    pub header: GenerationHeader,

    /// The sending node.
    pub sender: NodeInstance,

    /// The payload.
    pub body: MessageBody,
}
