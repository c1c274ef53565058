//! Per-unit serialized job execution.
//!
//! The entity queue guarantees that, for a given unit id, jobs execute one
//! at a time and in submission order, while jobs for distinct ids run
//! concurrently across a fixed-size worker pool. Together with the cache's
//! FIFO checkout this means a task never waits on a checkout held by a job
//! for the same id: per-id serialization happens here, before any checkout.

use crate::core::error::{CoreError, CoreResult};
use crate::entity::id::FailoverUnitId;
use crate::scheduler::executor::Job;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;

struct QueueState {
    /// Pending jobs per unit id, in submission order.
    queues: HashMap<FailoverUnitId, VecDeque<Job>>,

    /// Ids with pending jobs and no job currently executing.
    ready: VecDeque<FailoverUnitId>,

    /// Ids with a job currently executing.
    active: HashSet<FailoverUnitId>,

    /// Total queued (not yet started) jobs across all ids.
    depth: usize,

    closed: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    work: Condvar,
}

/// Per-unit FIFO job queues drained by a fixed worker pool.
pub struct EntityJobQueue {
    shared: Arc<QueueShared>,
    max_depth: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EntityJobQueue {
    /// Spawn `worker_count` entity workers with a total depth bound.
    pub fn new(worker_count: usize, max_depth: usize) -> Self {
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState {
                queues: HashMap::new(),
                ready: VecDeque::new(),
                active: HashSet::new(),
                depth: 0,
                closed: false,
            }),
            work: Condvar::new(),
        });

        let workers = (0..worker_count.max(1))
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("entity-{}", i))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn entity worker")
            })
            .collect();

        Self {
            shared,
            max_depth,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a job for a unit.
    ///
    /// Jobs for the same id execute in submission order. Rejected with
    /// [`CoreError::QueueFull`] when the total depth bound is reached.
    pub fn schedule(&self, id: FailoverUnitId, job: Job) -> CoreResult<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(CoreError::SchedulerClosed { queue: "entity" });
        }
        if state.depth >= self.max_depth {
            return Err(CoreError::QueueFull {
                queue: "entity",
                depth: state.depth,
            });
        }

        let queue = state.queues.entry(id).or_default();
        let was_empty = queue.is_empty();
        queue.push_back(job);
        state.depth += 1;

        // A newly non-empty queue becomes ready unless a job for the id is
        // mid-execution; in that case the finishing worker re-readies it.
        if was_empty && !state.active.contains(&id) {
            state.ready.push_back(id);
            drop(state);
            self.shared.work.notify_one();
        }
        Ok(())
    }

    /// Jobs queued but not yet started.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().depth
    }

    /// Drain and stop: in-flight jobs complete, queued jobs are discarded.
    ///
    /// Returns the number of discarded jobs.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            let discarded = state.depth;
            state.queues.clear();
            state.ready.clear();
            state.depth = 0;
            discarded
        };
        self.shared.work.notify_all();

        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }

        if discarded > 0 {
            tracing::warn!(queue = "entity", discarded, "queue closed with jobs discarded");
        }
        discarded
    }
}

fn worker_loop(shared: &QueueShared) {
    loop {
        let (id, job) = {
            let mut state = shared.state.lock();
            loop {
                if let Some(id) = state.ready.pop_front() {
                    if let Some(job) = state.queues.get_mut(&id).and_then(|q| q.pop_front()) {
                        state.active.insert(id);
                        state.depth -= 1;
                        break (id, job);
                    }
                    continue;
                }
                if state.closed {
                    return;
                }
                shared.work.wait(&mut state);
            }
        };

        job();

        let mut state = shared.state.lock();
        state.active.remove(&id);
        let has_more = state.queues.get(&id).is_some_and(|q| !q.is_empty());
        if has_more {
            state.ready.push_back(id);
            drop(state);
            shared.work.notify_one();
        } else {
            state.queues.remove(&id);
        }
    }
}
