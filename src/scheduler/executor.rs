//! The executor boundary and fixed-size worker pools.
//!
//! Components that need to run work asynchronously receive an [`Executor`]
//! at construction. Production code wires in [`PoolExecutor`]s; tests wire
//! in [`InlineExecutor`] for deterministic, single-threaded execution.

use crate::core::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where deferred work runs.
///
/// `execute` is infallible: callers use it for work that must not be lost
/// (completion callbacks). Admission control for inbound traffic goes
/// through [`PoolExecutor::try_execute`] instead.
pub trait Executor: Send + Sync {
    /// Run `job`, now or later.
    fn execute(&self, job: Job);
}

/// Runs jobs immediately on the calling thread.
///
/// Deterministic by construction; the executor of choice in unit tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

struct PoolState {
    jobs: VecDeque<Job>,
    closed: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    work: Condvar,
}

/// Fixed-size worker thread pool with a bounded submission queue.
pub struct PoolExecutor {
    name: &'static str,
    max_depth: usize,
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolExecutor {
    /// Spawn `worker_count` threads draining a queue bounded at `max_depth`.
    pub fn new(name: &'static str, worker_count: usize, max_depth: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            work: Condvar::new(),
        });

        let workers = (0..worker_count.max(1))
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("{}-{}", name, i))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self {
            name,
            max_depth,
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a job, subject to the depth bound.
    pub fn try_execute(&self, job: Job) -> CoreResult<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(CoreError::SchedulerClosed { queue: self.name });
        }
        if state.jobs.len() >= self.max_depth {
            return Err(CoreError::QueueFull {
                queue: self.name,
                depth: state.jobs.len(),
            });
        }
        state.jobs.push_back(job);
        drop(state);
        self.shared.work.notify_one();
        Ok(())
    }

    /// Jobs queued but not yet started.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    /// Drain and stop: in-flight jobs complete, queued jobs are discarded.
    ///
    /// Returns the number of discarded jobs.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            let discarded = state.jobs.len();
            state.jobs.clear();
            discarded
        };
        self.shared.work.notify_all();

        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }

        if discarded > 0 {
            tracing::warn!(queue = self.name, discarded, "pool closed with jobs discarded");
        }
        discarded
    }
}

impl Executor for PoolExecutor {
    /// Enqueue without the depth bound; if the pool is already closed, the
    /// job runs inline so it is never lost.
    fn execute(&self, job: Job) {
        let mut state = self.shared.state.lock();
        if state.closed {
            drop(state);
            tracing::warn!(queue = self.name, "pool closed, running job inline");
            job();
            return;
        }
        state.jobs.push_back(job);
        drop(state);
        self.shared.work.notify_one();
    }
}

fn worker_loop(shared: &PoolShared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.closed {
                    return;
                }
                shared.work.wait(&mut state);
            }
        };
        job();
    }
}
