//! # Frame Pipeline
//!
//! Hands job batches from the producer to the consumer through three slots
//! with rotating roles:
//!
//! ```text
//!                 submit()                      consumer_poll()
//!   producer ──> [toUpdate] <──swap──> [toUseNext] <──swap──> [toWorkWith] ──> consumer
//!                     │                                             │
//!             commit touched primitives               activate committed primitives
//! ```
//!
//! The producer only ever fills `toUpdate` and the consumer only ever reads
//! `toWorkWith`; `toUseNext` holds the newest finished frame. A second submit
//! before the consumer polls replaces the unread frame (last submission
//! wins, no backpressure).
//!
//! Both calls take one short pipeline lock. `submit` also commits every
//! primitive touched since the previous submit while holding it, so a poll
//! can never observe a frame whose commits are half applied.

use std::sync::Arc;

use framesync_core::{FrameTracker, TouchedSet};
use parking_lot::Mutex;
use tracing::debug;

/// A frame handed to the consumer.
#[derive(Debug)]
pub struct FrameTicket<B> {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// The submitted batch.
    pub batch: Arc<B>,
}

impl<B> Clone for FrameTicket<B> {
    fn clone(&self) -> Self {
        Self {
            frame: self.frame,
            batch: Arc::clone(&self.batch),
        }
    }
}

/// Pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames submitted.
    pub submitted: u64,
    /// Frames handed to the consumer.
    pub consumed: u64,
    /// Frames replaced before the consumer saw them.
    pub overwritten: u64,
}

struct Slot<B> {
    frame: u64,
    batch: Option<Arc<B>>,
}

impl<B> Default for Slot<B> {
    fn default() -> Self {
        Self {
            frame: 0,
            batch: None,
        }
    }
}

struct PipelineState<B> {
    slots: [Slot<B>; 3],
    to_update: usize,
    to_use_next: usize,
    to_work_with: usize,
    last_consumed: u64,
    /// Committed primitives not yet activated.
    ready: TouchedSet,
    stats: PipelineStats,
}

/// Three-slot producer/consumer frame exchange.
///
/// ## Usage
///
/// ```rust,ignore
/// let pipeline = FramePipeline::new(&tracker);
///
/// // Producer thread
/// bindings.bind(ScopeKind::Entity, ScopeId(7), vb0, cube_vb);
/// pipeline.submit(jobs);
///
/// // Consumer thread
/// if let Some(ticket) = pipeline.consumer_poll() {
///     renderer.render_frame(&ticket)?;
/// }
/// ```
pub struct FramePipeline<B> {
    tracker: FrameTracker,
    state: Mutex<PipelineState<B>>,
}

impl<B> FramePipeline<B> {
    /// Creates an empty pipeline driving `tracker`.
    #[must_use]
    pub fn new(tracker: &FrameTracker) -> Self {
        Self {
            tracker: tracker.clone(),
            state: Mutex::new(PipelineState {
                slots: [Slot::default(), Slot::default(), Slot::default()],
                to_update: 0,
                to_use_next: 1,
                to_work_with: 2,
                last_consumed: 0,
                ready: TouchedSet::new(),
                stats: PipelineStats::default(),
            }),
        }
    }

    /// The tracker whose primitives this pipeline commits.
    #[must_use]
    pub fn tracker(&self) -> &FrameTracker {
        &self.tracker
    }

    /// Publishes `batch` as the newest frame and returns its number.
    ///
    /// Every primitive touched since the previous submit is committed; the
    /// changes become visible to the consumer at its next successful poll.
    pub fn submit(&self, batch: B) -> u64 {
        let mut state = self.state.lock();

        state.stats.submitted += 1;
        let frame = state.stats.submitted;

        let unread = state.slots[state.to_use_next].frame;
        if unread > state.last_consumed {
            state.stats.overwritten += 1;
            debug!(frame = unread, "unread frame replaced");
        }

        let slot = state.to_update;
        state.slots[slot] = Slot {
            frame,
            batch: Some(Arc::new(batch)),
        };
        let PipelineState {
            to_update,
            to_use_next,
            ..
        } = &mut *state;
        std::mem::swap(to_update, to_use_next);

        let committed = self.tracker.commit_touched();
        let primitives = committed.len();
        state.ready.merge(committed);

        debug!(frame, primitives, "frame submitted");
        frame
    }

    /// Takes the newest submitted frame, if the consumer has not seen it.
    ///
    /// On success the primitives committed since the last successful poll
    /// are activated. Shares the pipeline lock with `submit`, which holds it
    /// while committing touched primitives, so a poll racing a submit waits
    /// for that commit to finish.
    pub fn consumer_poll(&self) -> Option<FrameTicket<B>> {
        let mut state = self.state.lock();

        let (frame, batch) = match &state.slots[state.to_use_next] {
            Slot {
                frame,
                batch: Some(batch),
            } if *frame > state.last_consumed => (*frame, Arc::clone(batch)),
            _ => return None,
        };

        let PipelineState {
            to_use_next,
            to_work_with,
            ..
        } = &mut *state;
        std::mem::swap(to_use_next, to_work_with);
        state.last_consumed = frame;
        state.stats.consumed += 1;

        let ready = std::mem::take(&mut state.ready);
        let primitives = ready.len();
        self.tracker.activate(ready);

        debug!(frame, primitives, "frame activated");
        Some(FrameTicket { frame, batch })
    }

    /// Frame number of the newest submit, 0 before the first.
    #[must_use]
    pub fn latest_frame(&self) -> u64 {
        self.state.lock().stats.submitted
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.state.lock().stats
    }
}

impl<B> std::fmt::Debug for FramePipeline<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
