//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stratus::core::config::Config;
use stratus::entity::cache::CommitSink;
use stratus::entity::failover_unit::{
    FailoverUnit, Replica, ReplicaDescription, ReplicaRole, ReplicaState,
};
use stratus::entity::id::{FailoverUnitId, NodeId, NodeInstance};
use stratus::tasks::action::{ActionApplier, StateMachineAction};
use tempfile::NamedTempFile;

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    let config_content = r#"
[scheduler]
entity_workers = 2
message_workers = 2

[rebuild]
wait_for_all_nodes = true

[telemetry]
log_level = "info"
"#;

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// A node instance at incarnation 1.
pub fn node(id: u64) -> NodeInstance {
    NodeInstance::new(NodeId(id), 1)
}

/// A unit id from a small integer.
pub fn unit_id(raw: u128) -> FailoverUnitId {
    FailoverUnitId::new(raw)
}

/// A unit with no replicas, target 3, min 2.
pub fn empty_unit(raw: u128) -> FailoverUnit {
    FailoverUnit::new(unit_id(raw), "fabric:/app/svc", 3, 2)
}

/// A unit with the given replicas.
pub fn unit_with_replicas(raw: u128, replicas: &[(u64, ReplicaRole, ReplicaState)]) -> FailoverUnit {
    let mut unit = empty_unit(raw);
    for &(node_id, role, state) in replicas {
        unit.add_replica(Replica::new(node(node_id), role, state));
    }
    unit
}

/// A healthy three-replica unit: primary on 1, secondaries on 2 and 3.
pub fn healthy_unit(raw: u128) -> FailoverUnit {
    unit_with_replicas(
        raw,
        &[
            (1, ReplicaRole::Primary, ReplicaState::Ready),
            (2, ReplicaRole::Secondary, ReplicaState::Ready),
            (3, ReplicaRole::Secondary, ReplicaState::Ready),
        ],
    )
}

/// A reported replica description.
pub fn description(node_id: u64, role: ReplicaRole, state: ReplicaState) -> ReplicaDescription {
    ReplicaDescription {
        node: node(node_id),
        role,
        state,
    }
}

/// Action applier that records everything it is handed.
#[derive(Default)]
pub struct RecordingApplier {
    actions: Mutex<Vec<StateMachineAction>>,
}

impl RecordingApplier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn actions(&self) -> Vec<StateMachineAction> {
        self.actions.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }
}

impl ActionApplier for RecordingApplier {
    fn apply(&self, action: StateMachineAction) {
        self.actions.lock().push(action);
    }
}

/// Commit sink that records (id, version) for every commit it sees.
#[derive(Default)]
pub struct RecordingSink {
    commits: Mutex<Vec<(FailoverUnitId, u64)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commits(&self) -> Vec<(FailoverUnitId, u64)> {
        self.commits.lock().clone()
    }
}

impl CommitSink for RecordingSink {
    fn on_commit(&self, unit: &FailoverUnit) {
        self.commits.lock().push((unit.id, unit.version));
    }
}

/// Poll `condition` until it holds or the timeout expires.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within timeout");
        std::thread::sleep(Duration::from_millis(2));
    }
}
