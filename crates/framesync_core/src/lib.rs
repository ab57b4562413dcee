//! # FRAMESYNC Core
//!
//! Synchronization primitives that let a producer thread (simulation logic)
//! and a consumer thread (the renderer) share mutable state without a shared
//! lock on the steady-state read/write path.
//!
//! ## Primitives
//!
//! 1. **`Guid`** - interned resource and bind names, O(1) hash/equality
//! 2. **`TripleBuffer<T>`** - one value, three slots, independent commit and
//!    activate rotations
//! 3. **`DeferredMap<K, V>`** - structural changes are queued and applied by a
//!    two-phase commit (freeze, then apply) at frame boundaries
//! 4. **`LayeredDeferredMap<OK, IK, V>`** - scope → name → value tables
//! 5. **`FrameTracker`** - remembers which primitives were touched and drives
//!    their commit/activate rotations
//!
//! ## Example
//!
//! ```rust,ignore
//! use framesync_core::{FrameTracker, TripleBuffer};
//!
//! let tracker = FrameTracker::new();
//! let exposure = TripleBuffer::tracked(&tracker, 1.0_f32);
//!
//! exposure.write(0.5);              // producer
//! let touched = tracker.commit_touched();
//! tracker.activate(touched);        // consumer, at a safe point
//! assert_eq!(*exposure.read_active(), 0.5);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod guid;
pub mod sync;

pub use error::{SyncError, SyncResult};
pub use guid::{Guid, GuidTable};
pub use sync::{
    DeferredMap, FrameSynced, FrameTracker, LayeredDeferredMap, LayeredOp, MapOp, OpLog, SlotRoles,
    TouchedSet, TripleBuffer,
};
