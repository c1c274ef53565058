//! Stratus - Failover and reconfiguration core for replica-set orchestration.
//!
//! Stratus tracks every replica set (failover unit) in a cluster, decides how
//! replicas are reconfigured as nodes join, leave, and fail, and guarantees
//! that at most one mutation is in flight against any given unit at a time,
//! even though work arrives concurrently from message processing, periodic
//! scans, and multi-unit batch operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Inbound Messages                           │
//! │     replica updates │ load reports │ inventory uploads          │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │  generation fence (stale → drop)
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Job Scheduler                              │
//! │   general message pool │ per-unit FIFO queues │ callback pool   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │  exclusive checkout
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Failover Unit Cache                          │
//! │       checkout → enable_update → submit │ revert-on-drop        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │  ordered actions
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Action Applier (external)                   │
//! │        add/drop/promote/move replica │ health reports           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types and the recoverable/fatal taxonomy
//!
//! ## Entity layer
//! - [`entity::cache`] - Concurrent failover-unit cache with FIFO checkout
//! - [`entity::handle`] - Checkout and update handles (copy-on-write commit)
//! - [`entity::failover_unit`] - Replica-set state for one unit
//!
//! ## Scheduling
//! - [`scheduler::entity_queue`] - Per-unit serialized job execution
//! - [`scheduler::executor`] - Worker pools and executor injection
//! - [`scheduler::multi`] - Multi-unit batch work with exactly-once completion
//!
//! ## State machine
//! - [`tasks::action`] - Closed action set applied after commit
//! - [`tasks`] - Movement, replica-update, upgrade, and rebuild tasks
//!
//! ## Rebuild
//! - [`rebuild::generation`] - Generation numbers and the stale-message fence
//! - [`rebuild::coordinator`] - Generation proposal and inventory rebuild
//! - [`rebuild::inventory`] - Per-node replica inventory (local unit map)
//!
//! ## Dispatch
//! - [`dispatch::demux`] - Fence-first message intake and demultiplexing
//!
//! # Key Invariants
//!
//! - **EXCL-CHECKOUT**: at most one updating handle per unit at any time
//! - **UNIT-ORDER**: jobs for one unit execute in submission order
//! - **FENCE-MONOTONE**: accepted generations never decrease
//! - **FENCE-FIRST**: generation checks happen before any unit checkout
//! - **BATCH-ONCE**: batch completion callbacks fire exactly once

// Core infrastructure
pub mod core;

// Failover unit state and cache
pub mod entity;

// Job scheduling and worker pools
pub mod scheduler;

// State machine tasks and actions
pub mod tasks;

// Generation fencing and rebuild
pub mod rebuild;

// Message intake
pub mod dispatch;

// Re-exports for convenience
pub use self::core::{config, error};
pub use dispatch::{demux, message};
pub use entity::{cache, failover_unit, handle, id};
pub use rebuild::{coordinator, generation, inventory};
pub use scheduler::{entity_queue, executor, multi};
pub use tasks::action;
