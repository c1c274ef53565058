//! Fence-first message intake and demultiplexing.
//!
//! All inbound traffic funnels through [`MessageDispatcher::on_message`].
//! The generation fence is consulted before anything else: a stale message
//! is rejected before it can enter any queue or touch any unit. Proposal
//! replies are answered synchronously (the coordinator may hand back a
//! fresh proposal for the transport to broadcast); everything else goes to
//! the general message pool, which fans replica work out to the per-unit
//! queues.

use crate::core::error::{CoreError, CoreResult};
use crate::dispatch::message::{InboundMessage, MessageBody};
use crate::entity::cache::FailoverUnitCache;
use crate::entity::id::{FailoverUnitId, NodeInstance};
use crate::rebuild::coordinator::{GenerationProposal, RebuildCoordinator};
use crate::rebuild::generation::GenerationFence;
use crate::scheduler::JobScheduler;
use crate::tasks::action::ActionApplier;
use crate::tasks::replica_update::ReplicaUpdateTask;
use crate::tasks::{run_task, StateMachineTask};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Single intake point for inbound protocol messages.
pub struct MessageDispatcher {
    fence: Arc<GenerationFence>,
    scheduler: Arc<JobScheduler>,
    cache: Arc<FailoverUnitCache>,
    applier: Arc<dyn ActionApplier>,
    coordinator: Arc<RebuildCoordinator>,
    loads: Mutex<HashMap<FailoverUnitId, HashMap<String, u64>>>,
}

impl MessageDispatcher {
    /// Wire the dispatcher to its collaborators.
    pub fn new(
        fence: Arc<GenerationFence>,
        scheduler: Arc<JobScheduler>,
        cache: Arc<FailoverUnitCache>,
        applier: Arc<dyn ActionApplier>,
        coordinator: Arc<RebuildCoordinator>,
    ) -> Self {
        Self {
            fence,
            scheduler,
            cache,
            applier,
            coordinator,
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// Accept one inbound message.
    ///
    /// The generation check happens first; a stale message yields
    /// [`CoreError::StaleGeneration`] so the transport can answer with the
    /// current generation, and nothing is queued. A proposal reply may
    /// yield a fresh [`GenerationProposal`] to broadcast.
    pub fn on_message(
        self: &Arc<Self>,
        message: InboundMessage,
    ) -> CoreResult<Option<GenerationProposal>> {
        if !self.fence.accept(message.header.generation) {
            return Err(CoreError::StaleGeneration {
                incoming: message.header.generation,
                current: self.fence.current(),
            });
        }

        match message.body {
            MessageBody::ProposalReply(reply) => {
                self.coordinator.on_proposal_reply(message.sender, reply)
            }
            body => {
                let dispatcher = Arc::clone(self);
                let sender = message.sender;
                let kind = body.kind();
                self.scheduler
                    .schedule_general(Box::new(move || dispatcher.demux(sender, body)))?;
                tracing::debug!(from = %sender, message = kind, "message queued");
                Ok(None)
            }
        }
    }

    /// Messages rejected as stale since construction.
    pub fn dropped_stale(&self) -> u64 {
        self.fence.rejected_count()
    }

    /// The last reported load metrics for a unit.
    pub fn reported_load(&self, id: FailoverUnitId) -> Option<HashMap<String, u64>> {
        self.loads.lock().get(&id).cloned()
    }

    // Runs on the general message pool.
    fn demux(self: Arc<Self>, sender: NodeInstance, body: MessageBody) {
        match body {
            MessageBody::ReplicaUpdate(body) => {
                let id = body.unit_id;
                let dispatcher = Arc::clone(&self);
                let task = StateMachineTask::ReplicaUpdate(ReplicaUpdateTask::new(
                    sender,
                    body.replica,
                ));
                let result = self.scheduler.schedule(
                    id,
                    Box::new(move || {
                        if let Err(error) =
                            run_task(&dispatcher.cache, id, task, dispatcher.applier.as_ref())
                        {
                            tracing::warn!(unit_id = %id, %error, "replica update failed");
                        }
                    }),
                );
                if let Err(error) = result {
                    tracing::warn!(unit_id = %id, %error, "replica update not scheduled");
                }
            }
            MessageBody::ReportLoad(body) => {
                self.loads.lock().insert(body.unit_id, body.metrics);
                tracing::debug!(unit_id = %body.unit_id, "load report recorded");
            }
            MessageBody::InventoryUpload(body) => {
                if let Err(error) = self.coordinator.on_inventory_upload(body.map) {
                    tracing::warn!(from = %sender, %error, "inventory upload refused");
                }
            }
            MessageBody::ProposalReply(_) => {
                // Handled synchronously in on_message; never queued.
                unreachable!("proposal reply on the message pool")
            }
        }
    }
}
