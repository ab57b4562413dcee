//! # Layered Deferred Map
//!
//! Two-level deferred mapping: outer key (a scope such as an entity or a
//! group) → inner key (a bind name) → value.
//!
//! Every change, outer or inner, goes through the outer log. When the outer
//! commit applies an inner change it immediately freezes and commits the
//! addressed inner map, so nested state is consistent by the end of the
//! outer commit and new scopes become visible at the same frame boundary as
//! everything else.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::deferred_map::DeferredMap;
use super::op_log::OpLog;
use super::tracker::{FrameSynced, FrameTracker, TrackerLink};
use crate::error::{SyncError, SyncResult};

/// A queued change to a layered map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayeredOp<OK, IK, V> {
    /// Create an empty inner map for the scope (kept if it already exists).
    AddOuter(OK),
    /// Drop the scope and its whole inner map.
    RemoveOuter(OK),
    /// Insert or replace an inner entry, creating the scope if needed.
    AddInner(OK, IK, V),
    /// Remove an inner entry.
    RemoveInner(OK, IK),
}

impl<OK, IK, V> LayeredOp<OK, IK, V> {
    fn outer(&self) -> &OK {
        match self {
            Self::AddOuter(ok)
            | Self::RemoveOuter(ok)
            | Self::AddInner(ok, _, _)
            | Self::RemoveInner(ok, _) => ok,
        }
    }
}

struct Inner<OK, IK, V> {
    scopes: RwLock<HashMap<OK, DeferredMap<IK, V>>>,
    log: Mutex<OpLog<LayeredOp<OK, IK, V>>>,
    scheduled: AtomicBool,
    tracker: Option<TrackerLink>,
    self_ref: Weak<Inner<OK, IK, V>>,
}

impl<OK, IK, V> Inner<OK, IK, V>
where
    OK: Eq + Hash + Send + Sync + 'static,
    IK: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn new(tracker: Option<TrackerLink>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            scopes: RwLock::new(HashMap::new()),
            log: Mutex::new(OpLog::new()),
            scheduled: AtomicBool::new(false),
            tracker,
            self_ref: self_ref.clone(),
        })
    }

    fn schedule(&self) {
        if let (Some(tracker), Some(me)) = (&self.tracker, self.self_ref.upgrade()) {
            tracker.schedule(me);
        }
    }

    fn push(&self, op: LayeredOp<OK, IK, V>) {
        self.log.lock().push(op);
        if !self.scheduled.swap(true, Ordering::AcqRel) {
            self.schedule();
        }
    }

    /// Same lock order as the flat map: scopes, then log. Inner commits run
    /// after the log is released.
    fn apply_frozen(&self) -> usize {
        let mut scopes = self.scopes.write();
        let frozen: Vec<LayeredOp<OK, IK, V>> = {
            let mut log = self.log.lock();
            let frozen = log.drain_frozen().collect();
            if log.is_empty() {
                self.scheduled.store(false, Ordering::Release);
            } else {
                self.schedule();
            }
            frozen
        };

        let applied = frozen.len();
        for op in frozen {
            match op {
                LayeredOp::AddOuter(ok) => {
                    scopes.entry(ok).or_default();
                }
                LayeredOp::RemoveOuter(ok) => {
                    scopes.remove(&ok);
                }
                LayeredOp::AddInner(ok, ik, value) => {
                    let table = scopes.entry(ok).or_default();
                    table.add(ik, value);
                    table.freeze();
                    table.commit();
                }
                LayeredOp::RemoveInner(ok, ik) => {
                    if let Some(table) = scopes.get(&ok) {
                        table.remove(ik);
                        table.freeze();
                        table.commit();
                    }
                }
            }
        }
        applied
    }
}

impl<OK, IK, V> FrameSynced for Inner<OK, IK, V>
where
    OK: Eq + Hash + Send + Sync + 'static,
    IK: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn freeze(&self) {
        self.log.lock().freeze();
    }

    fn advance_commit(&self) {
        self.apply_frozen();
    }
}

/// Scope → name → value table with frame-boundary commits.
///
/// Cheap to clone; every clone refers to the same table.
pub struct LayeredDeferredMap<OK, IK, V> {
    inner: Arc<Inner<OK, IK, V>>,
}

impl<OK, IK, V> Clone for LayeredDeferredMap<OK, IK, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<OK, IK, V> Default for LayeredDeferredMap<OK, IK, V>
where
    OK: Eq + Hash + Send + Sync + 'static,
    IK: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<OK, IK, V> LayeredDeferredMap<OK, IK, V>
where
    OK: Eq + Hash + Send + Sync + 'static,
    IK: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an untracked layered map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Inner::new(None),
        }
    }

    /// Creates a layered map that schedules itself on `tracker`.
    #[must_use]
    pub fn tracked(tracker: &FrameTracker) -> Self {
        Self {
            inner: Inner::new(Some(tracker.link())),
        }
    }

    /// Queues creation of an empty scope.
    pub fn add_outer(&self, outer: OK) {
        self.inner.push(LayeredOp::AddOuter(outer));
    }

    /// Queues removal of a scope and everything bound in it.
    pub fn remove_outer(&self, outer: OK) {
        self.inner.push(LayeredOp::RemoveOuter(outer));
    }

    /// Queues an insert into the (possibly not yet committed) scope.
    pub fn add_inner(&self, outer: OK, inner: IK, value: V) {
        self.inner.push(LayeredOp::AddInner(outer, inner, value));
    }

    /// Queues removal of one entry of a scope.
    pub fn remove_inner(&self, outer: OK, inner: IK) {
        self.inner.push(LayeredOp::RemoveInner(outer, inner));
    }

    /// Returns true if the scope will exist once the log is committed.
    pub fn exists_outer(&self, outer: &OK) -> bool {
        let scopes = self.inner.scopes.read();
        let log = self.inner.log.lock();
        let mut present = scopes.contains_key(outer);
        for op in log.iter().filter(|op| op.outer() == outer) {
            match op {
                LayeredOp::AddOuter(_) | LayeredOp::AddInner(..) => present = true,
                LayeredOp::RemoveOuter(_) => present = false,
                LayeredOp::RemoveInner(..) => {}
            }
        }
        present
    }

    /// Returns true if `(outer, inner)` will be present once committed.
    pub fn exists(&self, outer: &OK, inner: &IK) -> bool {
        let scopes = self.inner.scopes.read();
        let log = self.inner.log.lock();
        let mut present = scopes
            .get(outer)
            .is_some_and(|table| table.contains_committed(inner));

        for op in log.iter() {
            match op {
                LayeredOp::AddInner(ok, ik, _) if ok == outer && ik == inner => present = true,
                LayeredOp::RemoveInner(ok, ik) if ok == outer && ik == inner => present = false,
                LayeredOp::RemoveOuter(ok) if ok == outer => present = false,
                _ => {}
            }
        }
        present
    }

    /// Number of committed scopes.
    pub fn len_committed(&self) -> usize {
        self.inner.scopes.read().len()
    }

    /// Number of queued operations.
    pub fn pending_len(&self) -> usize {
        self.inner.log.lock().len()
    }

    /// Fixes the operations the next `commit` applies.
    pub fn freeze(&self) {
        self.inner.freeze();
    }

    /// Applies the frozen operations, committing each touched scope as it
    /// goes. Returns how many outer operations were applied.
    pub fn commit(&self) -> usize {
        self.inner.apply_frozen()
    }

    /// This table as a frame-synced primitive, for manual scheduling.
    #[must_use]
    pub fn as_synced(&self) -> Arc<dyn FrameSynced> {
        self.inner.clone()
    }
}

impl<OK, IK, V> LayeredDeferredMap<OK, IK, V>
where
    OK: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    IK: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Clones the value for `(outer, inner)`, reading pending adds.
    ///
    /// # Errors
    ///
    /// `SyncError::KeyNotFound` if the entry is neither committed nor
    /// pending.
    pub fn get(&self, outer: &OK, inner: &IK) -> SyncResult<V> {
        let scopes = self.inner.scopes.read();
        if let Some(value) = scopes.get(outer).and_then(|table| table.get_committed(inner)) {
            return Ok(value);
        }

        let log = self.inner.log.lock();

        log.iter()
            .rev()
            .find_map(|op| match op {
                LayeredOp::AddInner(ok, ik, value) if ok == outer && ik == inner => {
                    Some(value.clone())
                }
                _ => None,
            })
            .ok_or_else(|| SyncError::key_not_found(&(outer, inner)))
    }

    /// Clones the value `(outer, inner)` will hold once the log is committed.
    pub fn get_latest(&self, outer: &OK, inner: &IK) -> Option<V> {
        let scopes = self.inner.scopes.read();
        let log = self.inner.log.lock();
        let mut latest = scopes.get(outer).and_then(|table| table.get_committed(inner));
        for op in log.iter() {
            match op {
                LayeredOp::AddInner(ok, ik, value) if ok == outer && ik == inner => {
                    latest = Some(value.clone());
                }
                LayeredOp::RemoveInner(ok, ik) if ok == outer && ik == inner => latest = None,
                LayeredOp::RemoveOuter(ok) if ok == outer => latest = None,
                _ => {}
            }
        }
        latest
    }

    /// Clones the committed value for `(outer, inner)`.
    pub fn get_committed(&self, outer: &OK, inner: &IK) -> Option<V> {
        self.inner
            .scopes
            .read()
            .get(outer)
            .and_then(|table| table.get_committed(inner))
    }

    /// Snapshot of one committed scope.
    pub fn entries(&self, outer: &OK) -> Vec<(IK, V)> {
        self.inner
            .scopes
            .read()
            .get(outer)
            .map(DeferredMap::entries)
            .unwrap_or_default()
    }

    /// Committed scope keys.
    pub fn outer_keys(&self) -> Vec<OK> {
        self.inner.scopes.read().keys().cloned().collect()
    }
}

impl<OK, IK, V> fmt::Debug for LayeredDeferredMap<OK, IK, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredDeferredMap")
            .field("scopes", &self.inner.scopes.read().len())
            .field("pending", &self.inner.log.lock().len())
            .finish()
    }
}
