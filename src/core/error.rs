//! Error types.
//!
//! Stratus distinguishes two failure classes. Expected runtime conditions
//! (stale generations, full queues, unknown units) are values of [`CoreError`]
//! and are returned, never panicked. Contract violations (checkout of a
//! tombstoned unit, a batch callback with no items) indicate a scheduling bug
//! and abort via hard assertions; most of them are made unrepresentable by the
//! handle typestate in [`crate::entity::handle`].

use crate::entity::id::FailoverUnitId;
use crate::rebuild::generation::GenerationNumber;
use thiserror::Error;

/// Expected, recoverable error conditions.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A bounded job queue rejected a submission. The caller retries or
    /// reports backpressure.
    #[error("{queue} queue full at depth {depth}")]
    QueueFull { queue: &'static str, depth: usize },

    /// The scheduler (or one of its pools) has been closed.
    #[error("scheduler closed: {queue}")]
    SchedulerClosed { queue: &'static str },

    /// The failover unit cache has been closed.
    #[error("failover unit cache closed")]
    CacheClosed,

    /// No cache entry exists for the referenced unit.
    #[error("failover unit {0} not found")]
    UnitNotFound(FailoverUnitId),

    /// An inbound message carried a generation older than the current one.
    /// The message is dropped without touching any unit.
    #[error("stale generation: incoming {incoming}, current {current}")]
    StaleGeneration {
        incoming: GenerationNumber,
        current: GenerationNumber,
    },

    /// A rebuild operation arrived while the coordinator was not in a phase
    /// that accepts it.
    #[error("rebuild coordinator is not in phase {expected}")]
    RebuildPhaseMismatch { expected: &'static str },

    /// An inventory upload arrived from a node the coordinator is not
    /// expecting (already uploaded, or never part of the proposal round).
    #[error("unexpected inventory upload from node {0}")]
    UnexpectedUpload(crate::entity::id::NodeId),
}

impl CoreError {
    /// Check whether the failed operation should be retried by the caller.
    ///
    /// Queue-full and closed conditions are transient from the cluster's
    /// point of view; stale generations and phase mismatches are not (the
    /// world has moved on).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::SchedulerClosed { .. } | Self::CacheClosed
        )
    }
}

/// Result type using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
