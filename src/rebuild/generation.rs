//! Generation numbers and the stale-message fence.
//!
//! A generation is an `(epoch, owner)` pair: exactly one generation is
//! authoritative cluster-wide at a time, and a rebuild increments the epoch
//! and changes the owner. Protocol messages carry the sender's generation;
//! the fence drops anything older than the current one before it can touch
//! any unit.

use crate::entity::id::NodeId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A cluster generation: epoch plus owning node.
///
/// Ordering compares epochs only; the owner participates in equality but
/// never in ordering. For that reason the type deliberately implements
/// neither `Ord` nor `PartialOrd`: use [`precedes`](Self::precedes) and
/// [`supersedes`](Self::supersedes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationNumber {
    /// Monotonic epoch, incremented on every rebuild.
    pub epoch: i64,

    /// The node that proposed this generation.
    pub owner: NodeId,
}

impl GenerationNumber {
    /// Create a generation.
    pub const fn new(epoch: i64, owner: NodeId) -> Self {
        Self { epoch, owner }
    }

    /// The pre-bootstrap generation, older than anything proposed.
    pub const fn zero() -> Self {
        Self {
            epoch: 0,
            owner: NodeId(0),
        }
    }

    /// Check whether this generation is strictly older than `other`.
    pub fn precedes(&self, other: &GenerationNumber) -> bool {
        self.epoch < other.epoch
    }

    /// Check whether this generation is strictly newer than `other`.
    pub fn supersedes(&self, other: &GenerationNumber) -> bool {
        self.epoch > other.epoch
    }
}

impl std::fmt::Display for GenerationNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.epoch, self.owner)
    }
}

/// Monotonic acceptance gate for inbound generations.
///
/// Accepted generations never decrease: an incoming generation older than
/// the current one is rejected, a newer one is adopted as current, an equal
/// epoch passes unchanged.
pub struct GenerationFence {
    current: Mutex<GenerationNumber>,
    rejected: AtomicU64,
}

impl GenerationFence {
    /// Create a fence starting at `initial`.
    pub fn new(initial: GenerationNumber) -> Self {
        Self {
            current: Mutex::new(initial),
            rejected: AtomicU64::new(0),
        }
    }

    /// The current authoritative generation.
    pub fn current(&self) -> GenerationNumber {
        *self.current.lock()
    }

    /// Gate an inbound generation.
    ///
    /// Returns false when `incoming` is stale; the caller must drop the
    /// message without touching any unit. A newer generation is adopted
    /// before returning true.
    pub fn accept(&self, incoming: GenerationNumber) -> bool {
        let mut current = self.current.lock();
        if incoming.precedes(&current) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                incoming = %incoming,
                current = %*current,
                "stale generation rejected"
            );
            return false;
        }
        if incoming.supersedes(&current) {
            tracing::info!(old = %*current, new = %incoming, "generation adopted");
            *current = incoming;
        }
        true
    }

    /// Adopt `generation` if it is newer than the current one.
    ///
    /// Returns true when the fence moved. Used by the rebuild coordinator
    /// when a proposal round completes; a lower generation is never adopted.
    pub fn raise(&self, generation: GenerationNumber) -> bool {
        let mut current = self.current.lock();
        if generation.supersedes(&current) {
            tracing::info!(old = %*current, new = %generation, "generation raised");
            *current = generation;
            true
        } else {
            false
        }
    }

    /// Number of messages rejected as stale since construction.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl Default for GenerationFence {
    fn default() -> Self {
        Self::new(GenerationNumber::zero())
    }
}
