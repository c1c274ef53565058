//! Multi-unit batch work with exactly-once completion.
//!
//! A batch operation (a cluster-wide replica upload, a node deactivation)
//! fans out into one job per target unit. [`MultiUnitWork`] tracks the fan
//! with an atomic remaining count; the worker that observes the count reach
//! zero dispatches the completion callback, exactly once, on the completion
//! executor rather than on its own stack.

use crate::core::error::CoreResult;
use crate::entity::id::FailoverUnitId;
use crate::scheduler::executor::{Executor, Job};
use crate::scheduler::JobScheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Callback invoked once after every item of a batch has completed.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// One logical operation fanned out over N unit-keyed job items.
pub struct MultiUnitWork {
    remaining: AtomicUsize,
    on_complete: Mutex<Option<CompletionCallback>>,
    completion_executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for MultiUnitWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiUnitWork")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl MultiUnitWork {
    /// Fan `items` out to their per-unit queues.
    ///
    /// Each item is scheduled on the queue of its unit id, wrapped with a
    /// completion hook. A callback paired with an empty item list would
    /// never fire and is a contract violation (asserted).
    ///
    /// If an item fails to schedule (queue full, scheduler closed), the
    /// unscheduled remainder is counted complete immediately, the error is
    /// returned, and the callback still fires exactly once after the
    /// successfully scheduled items drain.
    pub fn begin(
        scheduler: &JobScheduler,
        items: Vec<(FailoverUnitId, Job)>,
        on_complete: Option<CompletionCallback>,
        completion_executor: Arc<dyn Executor>,
    ) -> CoreResult<Arc<Self>> {
        assert!(
            !(items.is_empty() && on_complete.is_some()),
            "multi-unit work with a completion callback requires at least one item"
        );

        let work = Arc::new(Self {
            remaining: AtomicUsize::new(items.len()),
            on_complete: Mutex::new(on_complete),
            completion_executor,
        });

        let total = items.len();
        let mut iter = items.into_iter();
        let mut scheduled = 0usize;
        for (id, job) in iter.by_ref() {
            let hook = Arc::clone(&work);
            let wrapped: Job = Box::new(move || {
                job();
                hook.complete_item();
            });
            if let Err(error) = scheduler.schedule(id, wrapped) {
                tracing::warn!(
                    unit_id = %id,
                    scheduled,
                    total,
                    %error,
                    "multi-unit work truncated by scheduling failure"
                );
                // The failed item and everything after it count as complete
                // so the callback still fires after the scheduled remainder.
                work.complete_item();
                for _ in iter.by_ref() {
                    work.complete_item();
                }
                return Err(error);
            }
            scheduled += 1;
        }

        tracing::debug!(total, "multi-unit work started");
        Ok(work)
    }

    /// Items not yet observed complete.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Record one item's completion.
    ///
    /// The caller observing the 1 -> 0 transition owns dispatching the
    /// completion callback; the `Mutex<Option<_>>` take makes a second
    /// dispatch impossible.
    pub fn complete_item(self: &Arc<Self>) {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "multi-unit work completed more items than it has");
        if prev == 1 {
            if let Some(callback) = self.on_complete.lock().take() {
                self.completion_executor.execute(callback);
            }
        }
    }
}
