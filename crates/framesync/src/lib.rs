//! # FRAMESYNC
//!
//! Decouples a producer thread (simulation logic submitting per-frame
//! rendering work) from a renderer thread that records and submits GPU
//! commands, without a shared lock on the steady-state read/write path.
//!
//! ## Crates
//!
//! 1. **`framesync_core`** - Guid interning, triple buffers, deferred maps,
//!    the frame tracker
//! 2. **`framesync_render`** - binding resolution, worker pool, frame
//!    pipeline, configuration
//! 3. **`framesync`** (this crate) - `RenderCore`, `FrameRenderer`,
//!    `RenderThread`
//!
//! ## Example
//!
//! ```rust,ignore
//! use framesync::{RenderCore, RenderConfig};
//!
//! let core = RenderCore::<Vec<Draw>>::new(RenderConfig::default())?;
//! let render_thread = core.spawn_render_thread(MyRecorder::new(&core), MySubmitter::new())?;
//!
//! loop {
//!     core.bindings().bind(ScopeKind::Entity, ScopeId(7), vb0, cube_vb);
//!     core.pipeline().submit(build_draws());
//! }
//! ```
//!
//! The graphics API stays behind `RecordCommands` (runs on pool workers)
//! and `SubmitCommands` (runs on the render thread).

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod render_core;
pub mod render_thread;
pub mod renderer;

pub use error::{FrameError, FrameResult};
pub use render_core::RenderCore;
pub use render_thread::{RenderThread, RenderThreadStats};
pub use renderer::{partition, FrameRenderer, FrameReport, JobBatch, RecordCommands, SubmitCommands};

pub use framesync_core::{
    DeferredMap, FrameSynced, FrameTracker, Guid, GuidTable, LayeredDeferredMap, SyncError,
    SyncResult, TripleBuffer,
};
pub use framesync_render::{
    Association, BindingResolver, BindingTables, FramePipeline, FrameTicket, PipelineStats,
    RenderConfig, RenderError, RenderResult, ResourceLookup, ResourceTable, ScopeId, ScopeKind,
    StatusCell, TaskFailure, TaskStatus, ValidationMode, WorkerPool,
};
