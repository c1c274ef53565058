//! Message intake tests.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stratus::core::config::{RebuildConfig, SchedulerConfig};
use stratus::core::error::CoreError;
use stratus::dispatch::demux::MessageDispatcher;
use stratus::dispatch::message::{
    GenerationHeader, InboundMessage, InventoryMessageBody, MessageBody, ReplicaMessageBody,
    ReportLoadMessageBody,
};
use stratus::entity::cache::FailoverUnitCache;
use stratus::entity::failover_unit::{ReplicaRole, ReplicaState};
use stratus::entity::id::NodeId;
use stratus::rebuild::coordinator::{ProposalReply, RebuildCoordinator, RebuildPhase};
use stratus::rebuild::generation::{GenerationFence, GenerationNumber};
use stratus::rebuild::inventory::LocalUnitMap;
use stratus::scheduler::JobScheduler;

struct Fixture {
    fence: Arc<GenerationFence>,
    scheduler: Arc<JobScheduler>,
    cache: Arc<FailoverUnitCache>,
    coordinator: Arc<RebuildCoordinator>,
    applier: Arc<common::RecordingApplier>,
    dispatcher: Arc<MessageDispatcher>,
}

fn fixture() -> Fixture {
    let fence = Arc::new(GenerationFence::default());
    let scheduler = Arc::new(JobScheduler::new(&SchedulerConfig {
        entity_workers: Some(2),
        message_workers: Some(2),
        callback_workers: 1,
        max_entity_queue_depth: 100,
        max_message_queue_depth: 100,
    }));
    let cache = Arc::new(FailoverUnitCache::new());
    let applier = common::RecordingApplier::new();
    let coordinator = Arc::new(RebuildCoordinator::new(
        NodeId(100),
        RebuildConfig::default(),
        Arc::clone(&fence),
        Arc::clone(&cache),
        applier.clone(),
    ));
    let dispatcher = Arc::new(MessageDispatcher::new(
        Arc::clone(&fence),
        Arc::clone(&scheduler),
        Arc::clone(&cache),
        applier.clone(),
        Arc::clone(&coordinator),
    ));
    Fixture {
        fence,
        scheduler,
        cache,
        coordinator,
        applier,
        dispatcher,
    }
}

fn message(generation: GenerationNumber, sender_id: u64, body: MessageBody) -> InboundMessage {
    InboundMessage {
        header: GenerationHeader::for_primary(generation),
        sender: common::node(sender_id),
        body,
    }
}

// ============================================================================
// Fence-first intake
// ============================================================================

#[test]
fn stale_message_never_reaches_a_queue() {
    let fx = fixture();
    fx.fence.accept(GenerationNumber::new(5, NodeId(1)));
    fx.cache.insert(common::healthy_unit(1));

    let result = fx.dispatcher.on_message(message(
        GenerationNumber::new(4, NodeId(1)),
        2,
        MessageBody::ReplicaUpdate(ReplicaMessageBody {
            unit_id: common::unit_id(1),
            replica: common::description(2, ReplicaRole::None, ReplicaState::Dropped),
        }),
    ));

    let error = result.unwrap_err();
    assert!(matches!(error, CoreError::StaleGeneration { .. }));
    assert_eq!(fx.dispatcher.dropped_stale(), 1);
    assert_eq!(fx.scheduler.pending(), 0);
    // The unit was never touched.
    let snapshot = fx.cache.snapshot(common::unit_id(1)).unwrap();
    assert_eq!(snapshot.version, 0);
    assert!(snapshot.replica_on(NodeId(2)).is_some());
}

#[test]
fn newer_generation_is_adopted_on_intake() {
    let fx = fixture();
    fx.fence.accept(GenerationNumber::new(5, NodeId(1)));

    fx.dispatcher
        .on_message(message(
            GenerationNumber::new(6, NodeId(2)),
            3,
            MessageBody::ReportLoad(ReportLoadMessageBody {
                unit_id: common::unit_id(1),
                metrics: HashMap::new(),
            }),
        ))
        .unwrap();

    assert_eq!(fx.fence.current(), GenerationNumber::new(6, NodeId(2)));
}

// ============================================================================
// Demultiplexing
// ============================================================================

#[test]
fn replica_update_flows_to_the_unit() {
    let fx = fixture();
    fx.cache.insert(common::unit_with_replicas(
        1,
        &[(2, ReplicaRole::Secondary, ReplicaState::InBuild)],
    ));

    fx.dispatcher
        .on_message(message(
            GenerationNumber::zero(),
            2,
            MessageBody::ReplicaUpdate(ReplicaMessageBody {
                unit_id: common::unit_id(1),
                replica: common::description(2, ReplicaRole::Secondary, ReplicaState::Ready),
            }),
        ))
        .unwrap();

    let cache = Arc::clone(&fx.cache);
    common::wait_until(Duration::from_secs(5), move || {
        cache
            .snapshot(common::unit_id(1))
            .is_some_and(|unit| unit.version == 1)
    });
    assert_eq!(
        fx.cache
            .snapshot(common::unit_id(1))
            .unwrap()
            .replica_on(NodeId(2))
            .unwrap()
            .state,
        ReplicaState::Ready
    );
    fx.scheduler.close();
}

#[test]
fn load_reports_land_in_the_load_table() {
    let fx = fixture();
    let metrics: HashMap<String, u64> =
        [("rps".to_string(), 120u64), ("mem".to_string(), 64)].into();

    fx.dispatcher
        .on_message(message(
            GenerationNumber::zero(),
            2,
            MessageBody::ReportLoad(ReportLoadMessageBody {
                unit_id: common::unit_id(7),
                metrics: metrics.clone(),
            }),
        ))
        .unwrap();

    let dispatcher = Arc::clone(&fx.dispatcher);
    common::wait_until(Duration::from_secs(5), move || {
        dispatcher.reported_load(common::unit_id(7)).is_some()
    });
    assert_eq!(fx.dispatcher.reported_load(common::unit_id(7)).unwrap(), metrics);
    assert!(fx.dispatcher.reported_load(common::unit_id(8)).is_none());
    fx.scheduler.close();
}

// ============================================================================
// Rebuild traffic
// ============================================================================

#[test]
fn proposal_replies_are_answered_synchronously() {
    let fx = fixture();
    let proposal = fx.coordinator.start(vec![common::node(1), common::node(2)]);

    let result = fx
        .dispatcher
        .on_message(message(
            GenerationNumber::zero(),
            1,
            MessageBody::ProposalReply(ProposalReply::Accepted),
        ))
        .unwrap();
    assert!(result.is_none());
    assert_eq!(fx.coordinator.phase(), RebuildPhase::AwaitingReplies);

    // A rejection with a higher generation comes back as a new proposal,
    // without a round trip through any queue.
    let restarted = fx
        .dispatcher
        .on_message(message(
            GenerationNumber::zero(),
            2,
            MessageBody::ProposalReply(ProposalReply::Rejected {
                observed: GenerationNumber::new(9, NodeId(50)),
            }),
        ))
        .unwrap()
        .expect("restarted proposal");
    assert_eq!(restarted.generation, GenerationNumber::new(10, NodeId(100)));
    assert_ne!(restarted.generation, proposal.generation);
    fx.scheduler.close();
}

#[test]
fn inventory_upload_completes_rebuild_through_dispatch() {
    let fx = fixture();
    let proposal = fx.coordinator.start(vec![common::node(1)]);
    fx.coordinator
        .on_proposal_reply(common::node(1), ProposalReply::Accepted)
        .unwrap();
    assert_eq!(fx.coordinator.phase(), RebuildPhase::UploadingInventory);

    let map = LocalUnitMap::new(common::node(1), proposal.generation);
    fx.dispatcher
        .on_message(message(
            proposal.generation,
            1,
            MessageBody::InventoryUpload(InventoryMessageBody { map }),
        ))
        .unwrap();

    let coordinator = Arc::clone(&fx.coordinator);
    common::wait_until(Duration::from_secs(5), move || coordinator.is_active());
    assert_eq!(fx.applier.len(), 0);
    fx.scheduler.close();
}
