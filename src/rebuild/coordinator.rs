//! Generation proposal and inventory rebuild.
//!
//! When the manager (re)acquires leadership it must renegotiate the cluster
//! generation and rebuild its unit cache from node inventories:
//!
//! ```text
//! Inactive → ProposingGeneration → AwaitingReplies → UploadingInventory → Active
//! ```
//!
//! The coordinator owns no timers and sends no messages; it hands
//! [`GenerationProposal`]s back to the embedding transport and expects the
//! transport's timer to call [`on_proposal_timeout`]
//! (RebuildCoordinator::on_proposal_timeout) when the reply deadline passes.

use crate::core::config::RebuildConfig;
use crate::core::error::{CoreError, CoreResult};
use crate::entity::cache::FailoverUnitCache;
use crate::entity::id::{NodeId, NodeInstance};
use crate::rebuild::generation::{GenerationFence, GenerationNumber};
use crate::rebuild::inventory::LocalUnitMap;
use crate::tasks::action::{ActionApplier, StateMachineAction};
use crate::tasks::rebuild::RebuildTask;
use crate::tasks::{run_task, StateMachineTask};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Rebuild protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPhase {
    /// No rebuild in progress.
    Inactive,
    /// Proposal broadcast, no replies heard yet.
    ProposingGeneration,
    /// Collecting proposal replies.
    AwaitingReplies,
    /// Replies collected, fence raised, collecting node inventories.
    UploadingInventory,
    /// Rebuild complete; the cache is authoritative.
    Active,
}

/// A node's answer to a generation proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalReply {
    /// The node adopted the proposed generation.
    Accepted,
    /// The node has already observed a higher generation.
    Rejected { observed: GenerationNumber },
}

/// An outbound proposal for the embedding transport to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationProposal {
    /// The generation being proposed.
    pub generation: GenerationNumber,

    /// The nodes the proposal goes to.
    pub targets: Vec<NodeInstance>,
}

struct RebuildState {
    phase: RebuildPhase,
    proposed: GenerationNumber,
    nodes: Vec<NodeInstance>,
    pending_replies: HashSet<NodeId>,
    accepted: HashSet<NodeId>,
    pending_uploads: HashSet<NodeId>,
    missed: HashSet<NodeId>,
    attempt: u32,
}

impl RebuildState {
    fn reset_for_proposal(&mut self, proposed: GenerationNumber) {
        self.proposed = proposed;
        self.pending_replies = self.nodes.iter().map(|n| n.id).collect();
        self.accepted.clear();
        self.pending_uploads.clear();
        self.missed.clear();
        self.phase = RebuildPhase::ProposingGeneration;
    }

    fn proposal(&self) -> GenerationProposal {
        GenerationProposal {
            generation: self.proposed,
            targets: self.nodes.clone(),
        }
    }
}

/// Runs the generation-proposal protocol and rebuilds the unit cache.
pub struct RebuildCoordinator {
    self_node: NodeId,
    config: RebuildConfig,
    fence: Arc<GenerationFence>,
    cache: Arc<FailoverUnitCache>,
    applier: Arc<dyn ActionApplier>,
    state: Mutex<RebuildState>,
}

impl RebuildCoordinator {
    /// Create a coordinator for this node.
    pub fn new(
        self_node: NodeId,
        config: RebuildConfig,
        fence: Arc<GenerationFence>,
        cache: Arc<FailoverUnitCache>,
        applier: Arc<dyn ActionApplier>,
    ) -> Self {
        Self {
            self_node,
            config,
            fence,
            cache,
            applier,
            state: Mutex::new(RebuildState {
                phase: RebuildPhase::Inactive,
                proposed: GenerationNumber::zero(),
                nodes: Vec::new(),
                pending_replies: HashSet::new(),
                accepted: HashSet::new(),
                pending_uploads: HashSet::new(),
                missed: HashSet::new(),
                attempt: 0,
            }),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RebuildPhase {
        self.state.lock().phase
    }

    /// The generation currently being proposed (or last proposed).
    pub fn proposed_generation(&self) -> GenerationNumber {
        self.state.lock().proposed
    }

    /// Proposal rounds started, including restarts after rejection.
    pub fn attempt(&self) -> u32 {
        self.state.lock().attempt
    }

    /// Check whether rebuild has completed.
    pub fn is_active(&self) -> bool {
        self.phase() == RebuildPhase::Active
    }

    /// Begin rebuild against the currently known nodes.
    ///
    /// Proposes `(current epoch + 1, self)` to every node. Starting while a
    /// rebuild is in progress is a contract violation.
    pub fn start(&self, nodes: Vec<NodeInstance>) -> GenerationProposal {
        let mut state = self.state.lock();
        assert!(
            matches!(state.phase, RebuildPhase::Inactive | RebuildPhase::Active),
            "rebuild started while already in progress"
        );
        state.nodes = nodes;
        state.attempt += 1;
        let proposed = GenerationNumber::new(self.fence.current().epoch + 1, self.self_node);
        state.reset_for_proposal(proposed);
        tracing::info!(
            generation = %proposed,
            targets = state.nodes.len(),
            attempt = state.attempt,
            "generation proposal started"
        );
        state.proposal()
    }

    /// Process one node's reply to the outstanding proposal.
    ///
    /// A rejection carrying a higher observed generation restarts the round
    /// at `observed.epoch + 1`; the returned proposal must be re-broadcast.
    /// When the last pending node accepts, the fence is raised to the
    /// proposed generation and the phase moves to inventory upload.
    pub fn on_proposal_reply(
        &self,
        from: NodeInstance,
        reply: ProposalReply,
    ) -> CoreResult<Option<GenerationProposal>> {
        let mut state = self.state.lock();
        if !matches!(
            state.phase,
            RebuildPhase::ProposingGeneration | RebuildPhase::AwaitingReplies
        ) {
            return Err(CoreError::RebuildPhaseMismatch {
                expected: "awaiting-replies",
            });
        }

        match reply {
            ProposalReply::Rejected { observed } => {
                if observed.supersedes(&state.proposed) {
                    // Never adopt the lower generation; outbid it.
                    state.attempt += 1;
                    let next = GenerationNumber::new(observed.epoch + 1, self.self_node);
                    state.reset_for_proposal(next);
                    tracing::info!(
                        from = %from,
                        observed = %observed,
                        generation = %next,
                        attempt = state.attempt,
                        "proposal rejected, restarting with higher epoch"
                    );
                    Ok(Some(state.proposal()))
                } else {
                    tracing::warn!(
                        from = %from,
                        observed = %observed,
                        proposed = %state.proposed,
                        "ignoring rejection with non-superseding generation"
                    );
                    Ok(None)
                }
            }
            ProposalReply::Accepted => {
                // A duplicate or dead-round acceptance records nothing and
                // must not complete the phase.
                if state.pending_replies.remove(&from.id) {
                    state.accepted.insert(from.id);
                    state.phase = RebuildPhase::AwaitingReplies;
                    if self.reply_phase_satisfied(&state) {
                        self.complete_reply_phase(&mut state);
                    }
                }
                Ok(None)
            }
        }
    }

    /// Reply-deadline hook, driven by the embedding transport's timer.
    ///
    /// Non-responders are recorded for later recovery (see
    /// [`pending_nodes`](Self::pending_nodes)) and the coordinator proceeds
    /// with whichever nodes accepted. If no node accepted, the round is
    /// re-armed in [`RebuildPhase::ProposingGeneration`] with every node
    /// owing a reply to the re-broadcast.
    ///
    /// Returns the nodes that missed the deadline.
    pub fn on_proposal_timeout(&self) -> CoreResult<Vec<NodeId>> {
        let mut state = self.state.lock();
        if !matches!(
            state.phase,
            RebuildPhase::ProposingGeneration | RebuildPhase::AwaitingReplies
        ) {
            return Err(CoreError::RebuildPhaseMismatch {
                expected: "awaiting-replies",
            });
        }

        let missed: Vec<NodeId> = state.pending_replies.drain().collect();
        state.missed.extend(missed.iter().copied());
        if !missed.is_empty() {
            tracing::warn!(
                missed = missed.len(),
                generation = %state.proposed,
                "proposal deadline passed with unanswered nodes"
            );
        }

        if state.accepted.is_empty() {
            // Nobody answered. Re-arm the same round so every node owes a
            // reply to the re-broadcast again.
            let proposed = state.proposed;
            state.reset_for_proposal(proposed);
        } else {
            self.complete_reply_phase(&mut state);
        }
        Ok(missed)
    }

    fn reply_phase_satisfied(&self, state: &RebuildState) -> bool {
        if state.pending_replies.is_empty() {
            return true;
        }
        // With the all-nodes policy disabled, a majority of the round's
        // targets suffices; the stragglers stay on the recovery list.
        !self.config.wait_for_all_nodes && state.accepted.len() * 2 > state.nodes.len()
    }

    fn complete_reply_phase(&self, state: &mut RebuildState) {
        state.missed.extend(state.pending_replies.drain());
        state.pending_uploads = state.accepted.clone();
        state.phase = RebuildPhase::UploadingInventory;
        self.fence.raise(state.proposed);
        tracing::info!(
            generation = %state.proposed,
            uploads_expected = state.pending_uploads.len(),
            "reply phase complete, awaiting inventories"
        );
    }

    /// Merge one node's inventory into the unit cache.
    ///
    /// The upload must answer the proposed generation; unknown units get
    /// fresh cache entries, known units are reconciled through a rebuild
    /// task. When the last expected node has uploaded, the coordinator
    /// becomes [`RebuildPhase::Active`] and data loss is traced for any
    /// unit left with no surviving replica.
    pub fn on_inventory_upload(&self, map: LocalUnitMap) -> CoreResult<()> {
        {
            let mut state = self.state.lock();
            if state.phase != RebuildPhase::UploadingInventory {
                return Err(CoreError::RebuildPhaseMismatch {
                    expected: "uploading-inventory",
                });
            }
            if map.generation.precedes(&state.proposed) {
                return Err(CoreError::StaleGeneration {
                    incoming: map.generation,
                    current: state.proposed,
                });
            }
            if !state.pending_uploads.remove(&map.node.id) {
                return Err(CoreError::UnexpectedUpload(map.node.id));
            }
        }

        // Merging checks out units and may block behind in-flight work, so
        // it happens outside the coordinator lock.
        let from = map.node;
        let entry_count = map.entries.len();
        for entry in map.entries {
            if self.cache.insert(entry.to_failover_unit()) {
                continue;
            }
            let task = StateMachineTask::Rebuild(RebuildTask::new(from, entry.replicas));
            run_task(&self.cache, entry.id, task, self.applier.as_ref())?;
        }
        tracing::info!(node = %from, units = entry_count, "inventory merged");

        let (completed, generation) = {
            let mut state = self.state.lock();
            let completed =
                state.phase == RebuildPhase::UploadingInventory && state.pending_uploads.is_empty();
            if completed {
                state.phase = RebuildPhase::Active;
                tracing::info!(generation = %state.proposed, "rebuild complete");
            }
            (completed, state.proposed)
        };
        if completed {
            self.trace_unrecoverable_units(generation);
        }
        Ok(())
    }

    // Every surviving replica has been uploaded by now; a unit left with
    // none has lost its data.
    fn trace_unrecoverable_units(&self, generation: GenerationNumber) {
        for id in self.cache.ids() {
            let Some(unit) = self.cache.snapshot(id) else {
                continue;
            };
            if unit.is_deleted || unit.up_replica_count() > 0 {
                continue;
            }
            tracing::warn!(unit_id = %id, %generation, "no surviving replica after rebuild");
            self.applier
                .apply(StateMachineAction::TraceDataLoss { id, generation });
        }
    }

    /// Nodes still owing a reply or an upload, plus deadline-missers.
    ///
    /// The embedding runtime retries these on its
    /// [`retry_interval_ms`](crate::core::config::RebuildConfig) cadence.
    pub fn pending_nodes(&self) -> Vec<NodeId> {
        let state = self.state.lock();
        let mut pending: HashSet<NodeId> = state.pending_replies.iter().copied().collect();
        pending.extend(state.pending_uploads.iter().copied());
        pending.extend(state.missed.iter().copied());
        pending.into_iter().collect()
    }

    /// Abort any in-progress rebuild and return to `Inactive`.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.phase != RebuildPhase::Inactive {
            tracing::info!(phase = ?state.phase, "rebuild stopped");
        }
        state.phase = RebuildPhase::Inactive;
        state.pending_replies.clear();
        state.accepted.clear();
        state.pending_uploads.clear();
        state.missed.clear();
    }
}
