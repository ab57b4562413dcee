//! # Deferred Map
//!
//! A mapping whose structural changes are queued from any thread and
//! committed at frame boundaries by a two-phase protocol:
//!
//! ```text
//!   add/remove ──> [op log] ──freeze()──> [frozen prefix] ──commit()──> committed table
//!                     ▲                                                      │
//!                 point lookups see pending adds          enumeration sees only this
//! ```
//!
//! Point lookups (`get`, `exists`) read their own writes; enumeration
//! (`entries`, `keys`) reflects only the committed table.
//!
//! The committed table sits behind an `RwLock`. Readers share it and only
//! wait while a commit applies the frozen prefix.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::op_log::{MapOp, OpLog};
use super::tracker::{FrameSynced, FrameTracker, TrackerLink};
use crate::error::{SyncError, SyncResult};

struct Inner<K, V> {
    committed: RwLock<HashMap<K, V>>,
    log: Mutex<OpLog<MapOp<K, V>>>,
    /// Set while the map sits in its tracker's touched list.
    scheduled: AtomicBool,
    tracker: Option<TrackerLink>,
    self_ref: Weak<Inner<K, V>>,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn new(tracker: Option<TrackerLink>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            committed: RwLock::new(HashMap::new()),
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

    fn push(&self, op: MapOp<K, V>) {
        self.log.lock().push(op);
        if !self.scheduled.swap(true, Ordering::AcqRel) {
            self.schedule();
        }
    }

    /// Applies the frozen prefix. Returns the number of operations applied.
    ///
    /// Lock order is committed table, then log. The log is held only while
    /// the prefix is drained, so writers never wait on table readers.
    fn apply_frozen(&self) -> usize {
        let mut table = self.committed.write();
        let frozen: Vec<MapOp<K, V>> = {
            let mut log = self.log.lock();
            let frozen = log.drain_frozen().collect();
            // Anything queued after freeze stays scheduled for the next cycle.
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
                MapOp::Add(key, value) => {
                    table.insert(key, value);
                }
                MapOp::Remove(key) => {
                    table.remove(&key);
                }
            }
        }
        applied
    }
}

impl<K, V> FrameSynced for Inner<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn freeze(&self) {
        self.log.lock().freeze();
    }

    fn advance_commit(&self) {
        self.apply_frozen();
    }
}

/// Mapping with queued, two-phase committed structural changes.
///
/// Cheap to clone; every clone refers to the same map.
///
/// ## Usage
///
/// ```rust,ignore
/// let map = DeferredMap::new();
/// map.add("cube_vb", 1);
/// assert_eq!(map.get(&"cube_vb")?, 1);     // visible to point lookups
/// assert!(map.entries().is_empty());       // not yet enumerable
///
/// map.freeze();
/// map.commit();
/// assert_eq!(map.entries(), vec![("cube_vb", 1)]);
/// ```
pub struct DeferredMap<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for DeferredMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for DeferredMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> DeferredMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an untracked map; `freeze`/`commit` are driven by hand.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Inner::new(None),
        }
    }

    /// Creates a map that schedules itself on `tracker` when changed.
    #[must_use]
    pub fn tracked(tracker: &FrameTracker) -> Self {
        Self {
            inner: Inner::new(Some(tracker.link())),
        }
    }

    /// Queues an insert (or replace) of `key`.
    pub fn add(&self, key: K, value: V) {
        self.inner.push(MapOp::Add(key, value));
    }

    /// Queues a removal of `key`.
    pub fn remove(&self, key: K) {
        self.inner.push(MapOp::Remove(key));
    }

    /// Returns true if `key` will be present once the log is committed.
    ///
    /// Starts from the committed table and replays every queued add and
    /// remove of `key`, so a key removed after being added is absent even if
    /// it was never committed.
    pub fn exists(&self, key: &K) -> bool {
        let table = self.inner.committed.read();
        let log = self.inner.log.lock();
        let mut present = table.contains_key(key);
        for op in log.iter().filter(|op| op.key() == key) {
            present = matches!(op, MapOp::Add(..));
        }
        present
    }

    /// Returns true if `key` is in the committed table.
    pub fn contains_committed(&self, key: &K) -> bool {
        self.inner.committed.read().contains_key(key)
    }

    /// Runs `f` on the value for `key`.
    ///
    /// Checks the committed table first, then the most recent queued add.
    /// `f` runs under a shared table lock, plus the log lock on the pending
    /// path.
    ///
    /// # Errors
    ///
    /// `SyncError::KeyNotFound` if neither holds `key`.
    pub fn with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> SyncResult<R>
    where
        K: fmt::Debug,
    {
        let table = self.inner.committed.read();
        if let Some(value) = table.get(key) {
            return Ok(f(value));
        }

        // No commit can land while `table` is held.
        let log = self.inner.log.lock();
        let pending = log.iter().rev().find_map(|op| match op {
            MapOp::Add(k, value) if k == key => Some(value),
            _ => None,
        });

        pending.map(f).ok_or_else(|| SyncError::key_not_found(key))
    }

    /// Number of entries in the committed table.
    pub fn len_committed(&self) -> usize {
        self.inner.committed.read().len()
    }

    /// Number of queued operations.
    pub fn pending_len(&self) -> usize {
        self.inner.log.lock().len()
    }

    /// Visits every committed entry under a shared lock.
    pub fn for_each_committed(&self, mut f: impl FnMut(&K, &V)) {
        for (key, value) in self.inner.committed.read().iter() {
            f(key, value);
        }
    }

    /// Fixes the operations the next `commit` applies: exactly those in the
    /// log right now.
    pub fn freeze(&self) {
        self.inner.freeze();
    }

    /// Applies the frozen operations in log order and removes them from the
    /// log. Returns how many were applied.
    pub fn commit(&self) -> usize {
        self.inner.apply_frozen()
    }

    /// This map as a frame-synced primitive, for manual scheduling.
    #[must_use]
    pub fn as_synced(&self) -> Arc<dyn FrameSynced> {
        self.inner.clone()
    }
}

impl<K, V> DeferredMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Clones the value for `key`, reading pending adds.
    ///
    /// # Errors
    ///
    /// `SyncError::KeyNotFound` if `key` is neither committed nor pending.
    pub fn get(&self, key: &K) -> SyncResult<V> {
        self.with(key, V::clone)
    }

    /// Clones the value `key` will hold once the log is committed.
    ///
    /// Replays queued operations over the committed entry; `None` if the key
    /// ends up absent.
    pub fn get_latest(&self, key: &K) -> Option<V> {
        let table = self.inner.committed.read();
        let log = self.inner.log.lock();
        let mut latest = table.get(key).cloned();
        for op in log.iter() {
            match op {
                MapOp::Add(k, value) if k == key => latest = Some(value.clone()),
                MapOp::Remove(k) if k == key => latest = None,
                _ => {}
            }
        }
        latest
    }

    /// Clones the committed value for `key`, ignoring pending operations.
    pub fn get_committed(&self, key: &K) -> Option<V> {
        self.inner.committed.read().get(key).cloned()
    }

    /// Snapshot of the committed table.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .committed
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Committed keys.
    pub fn keys(&self) -> Vec<K> {
        self.inner.committed.read().keys().cloned().collect()
    }
}

impl<K, V> fmt::Debug for DeferredMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredMap")
            .field("committed", &self.inner.committed.read().len())
            .field("pending", &self.inner.log.lock().len())
            .finish()
    }
}
