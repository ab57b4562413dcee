//! # FRAMESYNC Render
//!
//! The render-side half of FRAMESYNC: everything between "the producer
//! submitted a batch" and "the consumer recorded it".
//!
//! ## Components
//!
//! 1. **`FramePipeline<B>`** - three-slot exchange; commits touched
//!    primitives at submit, activates them at poll
//! 2. **`WorkerPool`** - fixed worker threads with tri-state `StatusCell`s
//!    and a panic side channel
//! 3. **`BindingTables` / `BindingResolver`** - global, group and entity
//!    bind-name resolution over triple-buffered bindings
//! 4. **`ResourceTable<T>`** - per-kind resource storage for handlers
//! 5. **`RenderConfig`** - thread count, task granularity, validation mode
//!
//! ## Frame Flow
//!
//! ```text
//!   producer                            consumer
//!   ────────                            ────────
//!   bind / create_or_update
//!   submit(batch)  ── commit ──┐
//!                              └──────> consumer_poll() ── activate
//!                                       resolve + record on WorkerPool
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod binding;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod resources;
pub mod worker_pool;

pub use binding::{Association, BindingResolver, BindingTable, BindingTables, ScopeId, ScopeKind};
pub use config::{RenderConfig, ValidationMode};
pub use error::{RenderError, RenderResult};
pub use pipeline::{FramePipeline, FrameTicket, PipelineStats};
pub use resources::{ResourceLookup, ResourceTable};
pub use worker_pool::{StatusCell, TaskFailure, TaskStatus, WorkerPool, FAILURE_BACKLOG};
