//! # Frame-Boundary Synchronization
//!
//! ## The Problem
//!
//! ```text
//! Producer (logic):    WRITE resources and bindings for frame N+1
//! Consumer (render):   READ resources and bindings of frame N
//!
//! Without synchronization: RACE CONDITION
//! With one big Mutex:      LOCK CONTENTION on every read
//! ```
//!
//! ## The Solution
//!
//! ```text
//! TripleBuffer:   [active] [lastUpdated] [nextToUpdate]
//!                    ▲          ▲              ▲
//!                 consumer   commit()       producer
//!                 reads      publishes      writes
//!
//! DeferredMap:    add/remove ──> op log ──freeze()──> apply() ──> committed table
//! ```
//!
//! Only the slot-role bookkeeping and the op logs are synchronized; each
//! rotation is owned by exactly one thread role. The `FrameTracker` records
//! which primitives were touched so a frame boundary only visits those.

mod deferred_map;
mod layered_map;
mod op_log;
mod tracker;
mod triple_buffer;

pub use deferred_map::DeferredMap;
pub use layered_map::{LayeredDeferredMap, LayeredOp};
pub use op_log::{MapOp, OpLog};
pub use tracker::{FrameSynced, FrameTracker, TouchedSet};
pub(crate) use tracker::TrackerLink;
pub use triple_buffer::{SlotRoles, TripleBuffer};
