//! # Frame Tracker
//!
//! Remembers every primitive touched since the last commit so that a frame
//! boundary visits only those.
//!
//! ```text
//!   write()/add() ──schedule──> touched ──commit_touched()──> TouchedSet
//!                                                                 │
//!                         consumer poll ──activate(set)───────────┘
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// A primitive that takes part in the frame-boundary protocol.
///
/// `freeze` and `advance_commit` are driven by the frame-orchestrating
/// (producer-side) thread. `advance_active` and `clear_external_flag` are
/// driven by the consumer at a safe point between frames.
pub trait FrameSynced: Send + Sync {
    /// Fixes which queued operations belong to the upcoming commit.
    fn freeze(&self) {}

    /// Publishes everything written (or frozen) since the last commit.
    fn advance_commit(&self);

    /// Makes the newest committed state the one readers observe.
    fn advance_active(&self) {}

    /// Clears the "was updated" flag raised by a commit.
    fn clear_external_flag(&self) {}
}

/// Identity of a tracked primitive, used to drop duplicates.
fn identity(primitive: &Arc<dyn FrameSynced>) -> usize {
    Arc::as_ptr(primitive).cast::<()>() as usize
}

/// Set of primitives committed together and waiting to be activated.
///
/// Duplicates are dropped on insertion, so a primitive committed in several
/// frames that were never polled is activated once.
#[derive(Default)]
pub struct TouchedSet {
    items: Vec<Arc<dyn FrameSynced>>,
    seen: HashSet<usize>,
}

impl TouchedSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a primitive unless it is already present.
    pub fn insert(&mut self, primitive: Arc<dyn FrameSynced>) {
        if self.seen.insert(identity(&primitive)) {
            self.items.push(primitive);
        }
    }

    /// Moves every primitive of `other` into `self`.
    pub fn merge(&mut self, other: TouchedSet) {
        for primitive in other.items {
            self.insert(primitive);
        }
    }

    /// Number of distinct primitives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the set holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<dyn FrameSynced>> {
        self.items.iter()
    }
}

impl std::fmt::Debug for TouchedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TouchedSet").field("len", &self.items.len()).finish()
    }
}

#[derive(Default)]
pub(crate) struct TrackerInner {
    /// Primitives written since the last `commit_touched`.
    touched: Mutex<Vec<Arc<dyn FrameSynced>>>,
    /// Primitives whose external flag is still raised from the last activation.
    last_activated: Mutex<TouchedSet>,
}

/// Records touched primitives and drives their rotations.
///
/// Cheap to clone; every clone refers to the same tracker.
#[derive(Clone, Default)]
pub struct FrameTracker {
    inner: Arc<TrackerInner>,
}

impl FrameTracker {
    /// Creates a tracker with nothing touched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a primitive for the next commit.
    ///
    /// Primitives built with a tracker call this themselves the first time
    /// they are touched in a cycle.
    pub fn schedule(&self, primitive: Arc<dyn FrameSynced>) {
        self.inner.touched.lock().push(primitive);
    }

    /// Number of primitives waiting for the next commit.
    #[must_use]
    pub fn touched_len(&self) -> usize {
        self.inner.touched.lock().len()
    }

    /// Freezes, then commits, every primitive touched since the last call.
    ///
    /// The freeze pass completes before any apply so the contents of this
    /// frame are fixed before the first table changes. Anything queued while
    /// the commit runs lands in the next cycle.
    pub fn commit_touched(&self) -> TouchedSet {
        let touched = std::mem::take(&mut *self.inner.touched.lock());

        let mut set = TouchedSet::new();
        for primitive in touched {
            set.insert(primitive);
        }

        for primitive in set.iter() {
            primitive.freeze();
        }
        for primitive in set.iter() {
            primitive.advance_commit();
        }

        tracing::trace!(committed = set.len(), "frame tracker commit");
        set
    }

    /// Activates a committed set on the consumer side.
    ///
    /// Flags raised by the previous activation are cleared first, then every
    /// primitive in `set` advances its active slot.
    pub fn activate(&self, set: TouchedSet) {
        let mut last = self.inner.last_activated.lock();

        for primitive in last.iter() {
            primitive.clear_external_flag();
        }
        for primitive in set.iter() {
            primitive.advance_active();
        }

        tracing::trace!(activated = set.len(), "frame tracker activate");
        *last = set;
    }

    pub(crate) fn link(&self) -> TrackerLink {
        TrackerLink(Arc::downgrade(&self.inner))
    }
}

impl std::fmt::Debug for FrameTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTracker")
            .field("touched", &self.touched_len())
            .finish()
    }
}

/// Weak back-reference from a primitive to its tracker.
///
/// Weak so that a tracker holding scheduled primitives never keeps itself
/// alive through them.
#[derive(Clone)]
pub(crate) struct TrackerLink(Weak<TrackerInner>);

impl TrackerLink {
    pub(crate) fn schedule(&self, primitive: Arc<dyn FrameSynced>) {
        if let Some(inner) = self.0.upgrade() {
            inner.touched.lock().push(primitive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        freezes: AtomicUsize,
        commits: AtomicUsize,
        activations: AtomicUsize,
        clears: AtomicUsize,
    }

    impl FrameSynced for Probe {
        fn freeze(&self) {
            self.freezes.fetch_add(1, Ordering::SeqCst);
        }

        fn advance_commit(&self) {
            assert_eq!(
                self.freezes.load(Ordering::SeqCst),
                self.commits.load(Ordering::SeqCst) + 1
            );
            self.commits.fetch_add(1, Ordering::SeqCst);
        }

        fn advance_active(&self) {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }

        fn clear_external_flag(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_commit_visits_each_primitive_once() {
        let tracker = FrameTracker::new();
        let probe = Arc::new(Probe::default());

        tracker.schedule(probe.clone());
        tracker.schedule(probe.clone());
        assert_eq!(tracker.touched_len(), 2);

        let set = tracker.commit_touched();
        assert_eq!(set.len(), 1);
        assert_eq!(probe.commits.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.touched_len(), 0);
    }

    #[test]
    fn test_activate_clears_previous_flags() {
        let tracker = FrameTracker::new();
        let probe = Arc::new(Probe::default());

        tracker.schedule(probe.clone());
        let first = tracker.commit_touched();
        tracker.activate(first);
        assert_eq!(probe.activations.load(Ordering::SeqCst), 1);
        assert_eq!(probe.clears.load(Ordering::SeqCst), 0);

        tracker.activate(TouchedSet::new());
        assert_eq!(probe.clears.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_merge_drops_duplicates() {
        let tracker = FrameTracker::new();
        let probe = Arc::new(Probe::default());

        tracker.schedule(probe.clone());
        let mut pending = tracker.commit_touched();
        tracker.schedule(probe.clone());
        pending.merge(tracker.commit_touched());

        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_dead_tracker_link_is_ignored() {
        let link = FrameTracker::new().link();
        link.schedule(Arc::new(Probe::default()));
    }
}
