//! Concurrent failover-unit cache with FIFO exclusive checkout.
//!
//! The cache owns the authoritative value of every unit the manager knows
//! about. All mutation goes through [`checkout`](FailoverUnitCache::checkout):
//! a checkout holds the entry's exclusivity slot for its whole lifetime, and
//! queued checkouts for the same unit are served strictly first-in first-out
//! via ticket counters. Readers take [`snapshot`](FailoverUnitCache::snapshot)s
//! and never wait behind a writer.
//!
//! Entries are created on first reference and never removed while the unit
//! exists; logically deleted units are tombstoned and reclaimed only by
//! [`sweep_tombstones`](FailoverUnitCache::sweep_tombstones) once no checkout
//! is queued.

use crate::core::error::{CoreError, CoreResult};
use crate::entity::failover_unit::FailoverUnit;
use crate::entity::handle::UnitCheckout;
use crate::entity::id::FailoverUnitId;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Commit notification boundary.
///
/// The embedding runtime persists committed values (or replicates them);
/// the core only guarantees the call happens after the value is published,
/// unless the update was opened with `skip_persistence`.
pub trait CommitSink: Send + Sync {
    /// Called after a new value has been published for a unit.
    fn on_commit(&self, unit: &FailoverUnit);
}

pub(crate) struct EntryState {
    pub(crate) value: Arc<FailoverUnit>,
    pub(crate) tombstone: bool,
    next_ticket: u64,
    now_serving: u64,
}

/// One cache entry: the authoritative value plus the exclusivity slot.
pub(crate) struct CacheEntry {
    state: Mutex<EntryState>,
    available: Condvar,
}

impl CacheEntry {
    fn new(unit: FailoverUnit) -> Self {
        Self {
            state: Mutex::new(EntryState {
                value: Arc::new(unit),
                tombstone: false,
                next_ticket: 0,
                now_serving: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Block until this caller holds the exclusivity slot. Strict FIFO.
    pub(crate) fn acquire(&self, id: FailoverUnitId) {
        let mut state = self.state.lock();
        assert!(
            !state.tombstone,
            "checkout of deleted failover unit {}",
            id
        );
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while state.now_serving != ticket {
            self.available.wait(&mut state);
        }
        assert!(
            !state.tombstone,
            "checkout of failover unit {} deleted while queued",
            id
        );
    }

    /// Release the exclusivity slot and wake the next queued checkout.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.now_serving += 1;
        drop(state);
        self.available.notify_all();
    }

    /// Cheap read of the current value.
    pub(crate) fn snapshot(&self) -> Arc<FailoverUnit> {
        Arc::clone(&self.state.lock().value)
    }

    /// Publish a new value. Caller must hold the exclusivity slot.
    pub(crate) fn publish(&self, unit: FailoverUnit) -> Arc<FailoverUnit> {
        let mut state = self.state.lock();
        state.tombstone = unit.is_deleted;
        state.value = Arc::new(unit);
        Arc::clone(&state.value)
    }

    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.now_serving == state.next_ticket
    }

    fn is_tombstoned(&self) -> bool {
        self.state.lock().tombstone
    }
}

/// Concurrent map from unit id to cache entry.
pub struct FailoverUnitCache {
    entries: RwLock<HashMap<FailoverUnitId, Arc<CacheEntry>>>,
    sink: Option<Arc<dyn CommitSink>>,
    closed: AtomicBool,
}

impl FailoverUnitCache {
    /// Create an empty cache with no commit sink.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sink: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Create an empty cache whose commits are reported to `sink`.
    pub fn with_commit_sink(sink: Arc<dyn CommitSink>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sink: Some(sink),
            closed: AtomicBool::new(false),
        }
    }

    /// Insert a unit, creating its cache entry.
    ///
    /// Returns false (and leaves the cache unchanged) if an entry already
    /// exists for the id.
    pub fn insert(&self, unit: FailoverUnit) -> bool {
        let id = unit.id;
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, Arc::new(CacheEntry::new(unit)));
        tracing::debug!(unit_id = %id, "failover unit cache entry created");
        true
    }

    /// Check whether an entry exists for a unit.
    pub fn contains(&self, id: FailoverUnitId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All known unit ids.
    pub fn ids(&self) -> Vec<FailoverUnitId> {
        self.entries.read().keys().copied().collect()
    }

    /// Wait-free reader path: the current value of a unit.
    pub fn snapshot(&self, id: FailoverUnitId) -> Option<Arc<FailoverUnit>> {
        let entry = self.entries.read().get(&id).cloned()?;
        Some(entry.snapshot())
    }

    /// Obtain exclusive mutation rights to a unit.
    ///
    /// Blocks (strict FIFO) while another checkout is outstanding for the
    /// same id. Checking out a tombstoned unit is a contract violation and
    /// aborts; a missing entry is an expected condition and reported as
    /// [`CoreError::UnitNotFound`].
    pub fn checkout(&self, id: FailoverUnitId) -> CoreResult<UnitCheckout> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::CacheClosed);
        }
        let entry = self
            .entries
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::UnitNotFound(id))?;

        entry.acquire(id);
        Ok(UnitCheckout::new(id, entry, self.sink.clone()))
    }

    /// Remove tombstoned entries that no checkout is queued behind.
    ///
    /// Returns the number of entries reclaimed.
    pub fn sweep_tombstones(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !(entry.is_tombstoned() && entry.is_idle()));
        let swept = before - entries.len();
        if swept > 0 {
            tracing::info!(swept, "reclaimed tombstoned failover units");
        }
        swept
    }

    /// Stop accepting checkouts. Outstanding handles complete normally.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Default for FailoverUnitCache {
    fn default() -> Self {
        Self::new()
    }
}
