//! # Render Error Types
//!
//! All errors that can occur between the frame pipeline, the worker pool and
//! the binding resolver.

use framesync_core::{Guid, SyncError};
use thiserror::Error;

use crate::binding::{Association, ScopeId};

/// Errors that can occur in the render core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A scope or bind name has no binding.
    #[error("binding not found: {association:?} scope {scope:?} name {name}")]
    BindingNotFound {
        /// How the name was meant to be resolved.
        association: Association,
        /// Entity or group the lookup ran in, if any was supplied.
        scope: Option<ScopeId>,
        /// The bind name.
        name: Guid,
    },

    /// A resolved Guid has no resource in the owning table.
    #[error("resource not found: {0}")]
    ResourceNotFound(Guid),

    /// Task enqueued after the worker pool was shut down.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    /// Invalid configuration value or file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lookup miss inside a synchronization primitive.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type for render core operations.
pub type RenderResult<T> = Result<T, RenderError>;
