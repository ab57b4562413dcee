//! # Triple-Buffered Value
//!
//! One logical value stored in three physical slots. Each slot has exactly
//! one role at any time:
//!
//! ```text
//!   ┌────────┐   ┌─────────────┐   ┌──────────────┐
//!   │ active │   │ lastUpdated │   │ nextToUpdate │
//!   └───┬────┘   └──────┬──────┘   └──────┬───────┘
//!       │               │                 │
//!   consumer        newest commit      producer writes
//!   reads           waiting for          here
//!                   activation
//!
//!   advance_commit():  lastUpdated <-> nextToUpdate   (producer side)
//!   advance_active():  active      <-> lastUpdated    (consumer side)
//! ```
//!
//! Both rotations are swaps, so the three indices are a permutation of
//! {0, 1, 2} after every call. The roles and flags live in one atomic word:
//! each rotation is a single compare-exchange, and the read path never takes
//! a lock shared with the producer (the per-slot `RwLock` is only contended
//! by a reader that lags a full two frames behind).

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::tracker::{FrameSynced, FrameTracker, TrackerLink};

const SLOT_MASK: u32 = 0b11;
const ACTIVE_SHIFT: u32 = 0;
const LAST_SHIFT: u32 = 2;
const NEXT_SHIFT: u32 = 4;
const PENDING_INTERNAL: u32 = 1 << 6;
const PENDING_EXTERNAL: u32 = 1 << 7;
const FRESH: u32 = 1 << 8;
const NEXT_STALE: u32 = 1 << 9;

/// Decoded snapshot of a triple buffer's slot roles and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRoles {
    /// Slot read by the consumer.
    pub active: usize,
    /// Slot holding the newest committed value.
    pub last_updated: usize,
    /// Slot the producer writes into.
    pub next_to_update: usize,
    /// Written since the last commit.
    pub pending_internal: bool,
    /// A commit happened and has not been acknowledged by the consumer.
    pub pending_external: bool,
    /// `last_updated` holds a commit newer than `active`.
    pub fresh: bool,
    /// `next_to_update` holds data older than the newest commit.
    pub next_stale: bool,
}

impl SlotRoles {
    const INITIAL: u32 = (1 << LAST_SHIFT) | (2 << NEXT_SHIFT);

    #[inline]
    fn decode(bits: u32) -> Self {
        Self {
            active: ((bits >> ACTIVE_SHIFT) & SLOT_MASK) as usize,
            last_updated: ((bits >> LAST_SHIFT) & SLOT_MASK) as usize,
            next_to_update: ((bits >> NEXT_SHIFT) & SLOT_MASK) as usize,
            pending_internal: bits & PENDING_INTERNAL != 0,
            pending_external: bits & PENDING_EXTERNAL != 0,
            fresh: bits & FRESH != 0,
            next_stale: bits & NEXT_STALE != 0,
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn encode(self) -> u32 {
        let mut bits = ((self.active as u32) << ACTIVE_SHIFT)
            | ((self.last_updated as u32) << LAST_SHIFT)
            | ((self.next_to_update as u32) << NEXT_SHIFT);
        if self.pending_internal {
            bits |= PENDING_INTERNAL;
        }
        if self.pending_external {
            bits |= PENDING_EXTERNAL;
        }
        if self.fresh {
            bits |= FRESH;
        }
        if self.next_stale {
            bits |= NEXT_STALE;
        }
        bits
    }

    /// Returns true if the three roles occupy three distinct slots.
    #[must_use]
    pub fn is_permutation(&self) -> bool {
        let [a, l, n] = [self.active, self.last_updated, self.next_to_update];
        a < 3 && l < 3 && n < 3 && a != l && l != n && a != n
    }
}

struct Inner<T> {
    slots: [RwLock<T>; 3],
    state: AtomicU32,
    tracker: Option<TrackerLink>,
    self_ref: Weak<Inner<T>>,
}

impl<T> Inner<T> {
    fn new(slots: [T; 3], tracker: Option<TrackerLink>) -> Arc<Self> {
        let [a, b, c] = slots;
        Arc::new_cyclic(|self_ref| Self {
            slots: [RwLock::new(a), RwLock::new(b), RwLock::new(c)],
            state: AtomicU32::new(SlotRoles::INITIAL),
            tracker,
            self_ref: self_ref.clone(),
        })
    }

    #[inline]
    fn roles(&self) -> SlotRoles {
        SlotRoles::decode(self.state.load(Ordering::Acquire))
    }

    /// Applies `f` to the roles atomically. Returns (before, after).
    fn update(&self, f: impl Fn(SlotRoles) -> Option<SlotRoles>) -> Option<(SlotRoles, SlotRoles)> {
        let mut after = None;
        let before = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let next = f(SlotRoles::decode(bits))?;
                after = Some(next);
                Some(next.encode())
            })
            .ok()?;
        after.map(|after| (SlotRoles::decode(before), after))
    }
}

impl<T: Send + Sync + 'static> Inner<T> {
    /// Raises `pending_internal` and schedules the buffer on its first write
    /// of the cycle.
    fn mark_written(&self) {
        let changed = self.update(|mut roles| {
            roles.pending_internal = true;
            roles.next_stale = false;
            Some(roles)
        });

        let first_write = changed.is_some_and(|(before, _)| !before.pending_internal);
        if first_write {
            if let (Some(tracker), Some(me)) = (&self.tracker, self.self_ref.upgrade()) {
                tracker.schedule(me);
            }
        }
    }
}

impl<T: Send + Sync + 'static> FrameSynced for Inner<T> {
    fn advance_commit(&self) {
        self.update(|mut roles| {
            if !roles.pending_internal {
                return None;
            }
            std::mem::swap(&mut roles.last_updated, &mut roles.next_to_update);
            roles.pending_internal = false;
            roles.pending_external = true;
            roles.fresh = true;
            roles.next_stale = true;
            Some(roles)
        });
    }

    fn advance_active(&self) {
        self.update(|mut roles| {
            if !roles.fresh {
                return None;
            }
            std::mem::swap(&mut roles.active, &mut roles.last_updated);
            roles.fresh = false;
            roles.pending_external = true;
            Some(roles)
        });
    }

    fn clear_external_flag(&self) {
        self.state.fetch_and(!PENDING_EXTERNAL, Ordering::AcqRel);
    }
}

/// A three-slot synchronization cell for one value.
///
/// Cheap to clone; every clone refers to the same cell.
///
/// ## Thread roles
///
/// - producer: `write`, `read_writable`, `advance_commit`
/// - consumer: `read_active`, `advance_active`, `clear_external_flag`
///
/// ## Usage
///
/// ```rust,ignore
/// let cell = TripleBuffer::with_value(0_u32);
/// cell.write(7);
/// cell.advance_commit();
/// cell.advance_active();
/// assert_eq!(*cell.read_active(), 7);
/// assert!(cell.was_updated());
/// ```
pub struct TripleBuffer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TripleBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for TripleBuffer<T> {
    fn default() -> Self {
        Self {
            inner: Inner::new([T::default(), T::default(), T::default()], None),
        }
    }
}

impl<T: Clone> TripleBuffer<T> {
    /// Creates an untracked cell with every slot holding `value`.
    ///
    /// Rotations must be driven by hand (`advance_commit`/`advance_active`).
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self {
            inner: Inner::new([value.clone(), value.clone(), value], None),
        }
    }

    /// Creates a cell that schedules itself on `tracker` when written.
    #[must_use]
    pub fn tracked(tracker: &FrameTracker, value: T) -> Self {
        Self {
            inner: Inner::new([value.clone(), value.clone(), value], Some(tracker.link())),
        }
    }
}

impl<T> TripleBuffer<T> {
    /// Snapshot of the slot roles and flags.
    #[inline]
    #[must_use]
    pub fn roles(&self) -> SlotRoles {
        self.inner.roles()
    }

    /// Reads the active slot.
    ///
    /// Never waits on the producer: the producer only ever writes the
    /// `nextToUpdate` slot.
    #[inline]
    pub fn read_active(&self) -> RwLockReadGuard<'_, T> {
        let active = self.inner.roles().active;
        self.inner.slots[active].read()
    }

    /// Returns true if a commit happened since the flag was last cleared.
    #[inline]
    #[must_use]
    pub fn was_updated(&self) -> bool {
        self.inner.roles().pending_external
    }

    /// Returns true if both handles refer to the same cell.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> TripleBuffer<T> {
    /// Clones the value in the active slot.
    #[inline]
    #[must_use]
    pub fn active_value(&self) -> T {
        self.read_active().clone()
    }
}

impl<T: Send + Sync + 'static> TripleBuffer<T> {
    /// Stores `value` in the `nextToUpdate` slot.
    ///
    /// The active slot is never touched. The value becomes visible to the
    /// consumer after `advance_commit` followed by `advance_active`.
    pub fn write(&self, value: T) {
        let next = self.inner.roles().next_to_update;
        *self.inner.slots[next].write() = value;
        self.inner.mark_written();
    }

    /// Publishes the last write: `lastUpdated` takes the write slot and the
    /// write slot moves to the one remaining index.
    ///
    /// No-op if nothing was written since the last commit.
    pub fn advance_commit(&self) {
        self.inner.advance_commit();
    }

    /// Makes the newest committed slot active.
    ///
    /// No-op if nothing was committed since the last activation.
    pub fn advance_active(&self) {
        self.inner.advance_active();
    }

    /// Acknowledges the update reported by `was_updated`.
    pub fn clear_external_flag(&self) {
        self.inner.clear_external_flag();
    }
}

impl<T: Clone + Send + Sync + 'static> TripleBuffer<T> {
    /// Gives in-place write access to the `nextToUpdate` slot.
    ///
    /// If the write slot still holds data from before the last commit, it is
    /// refreshed from the newest committed value first, so the mutation
    /// starts from current state rather than from a value two frames old.
    /// Drop the guard before the frame is committed.
    pub fn read_writable(&self) -> RwLockWriteGuard<'_, T> {
        let roles = self.inner.roles();
        let mut guard = self.inner.slots[roles.next_to_update].write();

        if roles.next_stale {
            let source = if roles.fresh {
                roles.last_updated
            } else {
                roles.active
            };
            let newest = self.inner.slots[source].read().clone();
            *guard = newest;
        }

        self.inner.mark_written();
        guard
    }
}

impl<T: Send + Sync + 'static> TripleBuffer<T> {
    /// This cell as a frame-synced primitive, for manual scheduling.
    #[must_use]
    pub fn as_synced(&self) -> Arc<dyn FrameSynced> {
        self.inner.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for TripleBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripleBuffer")
            .field("active", &*self.read_active())
            .field("roles", &self.roles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_initial_roles_are_permutation() {
        let cell = TripleBuffer::with_value(0_u32);
        let roles = cell.roles();
        assert!(roles.is_permutation());
        assert_eq!((roles.active, roles.last_updated, roles.next_to_update), (0, 1, 2));
        assert!(!cell.was_updated());
    }

    #[test]
    fn test_write_commit_activate() {
        let cell = TripleBuffer::with_value(0_u32);

        cell.write(42);
        assert_eq!(*cell.read_active(), 0);
        assert!(cell.roles().pending_internal);

        cell.advance_commit();
        assert_eq!(*cell.read_active(), 0);
        assert!(cell.was_updated());

        cell.advance_active();
        assert_eq!(*cell.read_active(), 42);
        assert!(cell.was_updated());

        cell.clear_external_flag();
        assert!(!cell.was_updated());
        assert_eq!(*cell.read_active(), 42);
    }

    #[test]
    fn test_activate_without_commit_is_noop() {
        let cell = TripleBuffer::with_value(1_u32);
        let before = cell.roles();

        cell.advance_active();
        assert_eq!(cell.roles().active, before.active);

        cell.write(2);
        cell.advance_active();
        assert_eq!(cell.roles().active, before.active);
        assert_eq!(*cell.read_active(), 1);
    }

    #[test]
    fn test_commit_without_write_is_noop() {
        let cell = TripleBuffer::with_value(1_u32);
        let before = cell.roles();
        cell.advance_commit();
        assert_eq!(cell.roles(), before);
    }

    #[test]
    fn test_unread_commit_is_replaced_by_newer_one() {
        let cell = TripleBuffer::with_value("initial".to_string());

        cell.write("frame a".to_string());
        cell.advance_commit();
        cell.write("frame b".to_string());
        cell.advance_commit();

        cell.advance_active();
        assert_eq!(*cell.read_active(), "frame b");
    }

    #[test]
    fn test_read_writable_refreshes_stale_slot() {
        let cell = TripleBuffer::with_value(vec![1_u32]);

        cell.read_writable().push(2);
        cell.advance_commit();

        // The new write slot held [1]; it must start from [1, 2].
        cell.read_writable().push(3);
        cell.advance_commit();
        cell.advance_active();

        assert_eq!(*cell.read_active(), vec![1, 2, 3]);
    }

    #[test]
    fn test_read_writable_after_activation_uses_active() {
        let cell = TripleBuffer::with_value(10_i32);

        *cell.read_writable() += 1;
        cell.advance_commit();
        cell.advance_active();

        *cell.read_writable() += 1;
        cell.advance_commit();
        cell.advance_active();

        assert_eq!(*cell.read_active(), 12);
    }

    #[test]
    fn test_roles_stay_permutation_under_random_sequences() {
        let mut rng = StdRng::seed_from_u64(0x7121_b0ff);
        let cell = TripleBuffer::with_value(0_u64);
        let mut last_written = 0_u64;
        let mut last_committed = 0_u64;

        for step in 1..=10_000_u64 {
            match rng.gen_range(0..4) {
                0 => {
                    cell.write(step);
                    last_written = step;
                }
                1 => {
                    let pending = cell.roles().pending_internal;
                    cell.advance_commit();
                    if pending {
                        last_committed = last_written;
                    }
                }
                2 => {
                    let fresh = cell.roles().fresh;
                    cell.advance_active();
                    if fresh {
                        assert_eq!(*cell.read_active(), last_committed);
                    }
                }
                _ => cell.clear_external_flag(),
            }
            assert!(cell.roles().is_permutation(), "broken roles at step {step}");
        }
    }

    #[test]
    fn test_tracked_buffer_schedules_once_per_cycle() {
        let tracker = FrameTracker::new();
        let cell = TripleBuffer::tracked(&tracker, 0_u32);

        cell.write(1);
        cell.write(2);
        assert_eq!(tracker.touched_len(), 1);

        let set = tracker.commit_touched();
        assert_eq!(set.len(), 1);
        tracker.activate(set);
        assert_eq!(*cell.read_active(), 2);
        assert!(cell.was_updated());

        cell.write(3);
        assert_eq!(tracker.touched_len(), 1);
    }

    #[test]
    fn test_concurrent_reader_never_sees_torn_value() {
        let cell = TripleBuffer::with_value([0_u64; 8]);
        let reader = cell.clone();

        let handle = std::thread::spawn(move || {
            for _ in 0..20_000 {
                let snapshot = *reader.read_active();
                assert!(snapshot.iter().all(|v| *v == snapshot[0]));
                reader.advance_active();
            }
        });

        for i in 0..20_000_u64 {
            cell.write([i; 8]);
            cell.advance_commit();
        }

        handle.join().unwrap();
    }
}
