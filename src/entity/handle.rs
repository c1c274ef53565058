//! Checkout and update handles.
//!
//! A [`UnitCheckout`] is the exclusive handle obtained from the cache: while
//! it (or the [`UnitUpdate`] it converts into) is alive, no other checkout of
//! the same unit can proceed. The type state makes the historical misuse
//! cases unrepresentable:
//!
//! - mutation accessors exist only on [`UnitUpdate`], which can only be
//!   reached through [`UnitCheckout::enable_update`];
//! - `enable_update` consumes the checkout, so it cannot be called twice;
//! - `submit` consumes the update, so it cannot be called twice;
//! - dropping an update without submitting reverts it.
//!
//! Handles are deliberately not `Send`: a task holds exactly one checkout and
//! must never reach for a second unit while holding it.

use crate::entity::cache::{CacheEntry, CommitSink};
use crate::entity::failover_unit::FailoverUnit;
use crate::entity::id::FailoverUnitId;
use std::marker::PhantomData;
use std::sync::Arc;

/// Record of one committed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// The unit that was updated.
    pub id: FailoverUnitId,

    /// Version of the published value.
    pub version: u64,

    /// Whether the commit was reported to the persistence sink.
    pub persisted: bool,
}

/// Read-only exclusive handle to one cache entry.
pub struct UnitCheckout {
    id: FailoverUnitId,
    entry: Arc<CacheEntry>,
    sink: Option<Arc<dyn CommitSink>>,
    view: Arc<FailoverUnit>,
    converted: bool,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for UnitCheckout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitCheckout")
            .field("id", &self.id)
            .field("converted", &self.converted)
            .finish_non_exhaustive()
    }
}

impl UnitCheckout {
    pub(crate) fn new(
        id: FailoverUnitId,
        entry: Arc<CacheEntry>,
        sink: Option<Arc<dyn CommitSink>>,
    ) -> Self {
        let view = entry.snapshot();
        Self {
            id,
            entry,
            sink,
            view,
            converted: false,
            _not_send: PhantomData,
        }
    }

    /// The checked-out unit's id.
    pub fn id(&self) -> FailoverUnitId {
        self.id
    }

    /// The current (committed) value.
    pub fn current(&self) -> &FailoverUnit {
        &self.view
    }

    /// Enable mutation: deep-copy the current value into a working copy.
    ///
    /// Mutations are applied to the working copy and published atomically by
    /// [`UnitUpdate::submit`]; concurrent readers never observe intermediate
    /// state. With `skip_persistence`, the commit is published to the cache
    /// but not reported to the commit sink.
    pub fn enable_update(mut self, skip_persistence: bool) -> UnitUpdate {
        self.converted = true;
        let working = (*self.view).clone();
        UnitUpdate {
            id: self.id,
            entry: Arc::clone(&self.entry),
            sink: self.sink.clone(),
            old: Arc::clone(&self.view),
            working,
            skip_persistence,
            submitted: false,
            _not_send: PhantomData,
        }
    }
}

impl Drop for UnitCheckout {
    fn drop(&mut self) {
        // Converted checkouts hand the exclusivity slot to the UnitUpdate.
        if !self.converted {
            self.entry.release();
        }
    }
}

/// Exclusive handle with mutation enabled.
pub struct UnitUpdate {
    id: FailoverUnitId,
    entry: Arc<CacheEntry>,
    sink: Option<Arc<dyn CommitSink>>,
    old: Arc<FailoverUnit>,
    working: FailoverUnit,
    skip_persistence: bool,
    submitted: bool,
    _not_send: PhantomData<*const ()>,
}

impl UnitUpdate {
    /// The checked-out unit's id.
    pub fn id(&self) -> FailoverUnitId {
        self.id
    }

    /// The working copy.
    pub fn current(&self) -> &FailoverUnit {
        &self.working
    }

    /// Mutable access to the working copy.
    pub fn current_mut(&mut self) -> &mut FailoverUnit {
        &mut self.working
    }

    /// The value as it was when mutation was enabled.
    pub fn old(&self) -> &FailoverUnit {
        &self.old
    }

    /// Discard the working copy; the entry keeps its pre-checkout value.
    pub fn revert(self) {
        tracing::debug!(unit_id = %self.id, "update reverted");
        // Drop impl releases the slot.
    }

    /// Publish the working copy as the unit's new value.
    ///
    /// Bumps the lookup version, drops the old snapshot, releases the
    /// exclusivity slot, and wakes the next queued checkout. The commit sink
    /// is notified unless the update was opened with `skip_persistence`.
    pub fn submit(mut self) -> CommitRecord {
        self.submitted = true;
        self.working.version = self.old.version + 1;
        let published = self.entry.publish(self.working.clone());

        let persisted = if self.skip_persistence {
            false
        } else if let Some(ref sink) = self.sink {
            sink.on_commit(&published);
            true
        } else {
            false
        };

        tracing::debug!(
            unit_id = %self.id,
            version = published.version,
            persisted,
            "update committed"
        );

        self.entry.release();
        CommitRecord {
            id: self.id,
            version: published.version,
            persisted,
        }
    }
}

impl Drop for UnitUpdate {
    fn drop(&mut self) {
        // Implicit revert: an update that was never submitted leaves the
        // entry untouched.
        if !self.submitted {
            self.entry.release();
        }
    }
}
