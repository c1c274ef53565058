//! Job scheduling and worker pools.
//!
//! This module contains:
//! - [`executor`] - The executor boundary and fixed-size worker pools
//! - [`entity_queue`] - Per-unit serialized job execution
//! - [`multi`] - Multi-unit batch work with exactly-once completion
//!
//! The scheduler runs three independent pools: per-unit entity workers, a
//! general message pool for inbound protocol traffic, and a small pool for
//! commit/batch completion callbacks. Every pool is sized at construction;
//! nothing in the core posts to an ambient global thread pool.

pub mod entity_queue;
pub mod executor;
pub mod multi;

use crate::core::config::SchedulerConfig;
use crate::core::error::CoreResult;
use crate::entity::id::FailoverUnitId;
use entity_queue::EntityJobQueue;
use executor::{Executor, Job, PoolExecutor};
use std::sync::Arc;

/// Facade over the three worker pools.
pub struct JobScheduler {
    entity: EntityJobQueue,
    message: PoolExecutor,
    callback: Arc<PoolExecutor>,
}

impl JobScheduler {
    /// Build the pools from configuration.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            entity: EntityJobQueue::new(
                config.entity_worker_count(),
                config.max_entity_queue_depth,
            ),
            message: PoolExecutor::new(
                "message",
                config.message_worker_count(),
                config.max_message_queue_depth,
            ),
            callback: Arc::new(PoolExecutor::new(
                "callback",
                config.callback_workers,
                usize::MAX,
            )),
        }
    }

    /// Enqueue a job on the per-unit queue for `id`.
    ///
    /// Jobs for one id execute serially in submission order; jobs for
    /// distinct ids run concurrently.
    pub fn schedule(&self, id: FailoverUnitId, job: Job) -> CoreResult<()> {
        self.entity.schedule(id, job)
    }

    /// Enqueue a job on the general message pool.
    pub fn schedule_general(&self, job: Job) -> CoreResult<()> {
        self.message.try_execute(job)
    }

    /// The executor used for completion callbacks.
    ///
    /// Batch completions are dispatched here rather than run inline on an
    /// entity worker, keeping worker stacks decoupled from batch logic.
    pub fn callback_executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.callback) as Arc<dyn Executor>
    }

    /// Jobs queued but not yet started, across all pools.
    pub fn pending(&self) -> usize {
        self.entity.pending() + self.message.pending() + self.callback.pending()
    }

    /// Drain and stop all pools.
    ///
    /// In-flight jobs complete; queued jobs are discarded and the discard
    /// count is returned.
    pub fn close(&self) -> usize {
        let discarded =
            self.entity.close() + self.message.close() + self.callback.close();
        if discarded > 0 {
            tracing::warn!(discarded, "scheduler closed with queued jobs discarded");
        } else {
            tracing::info!("scheduler closed");
        }
        discarded
    }
}
