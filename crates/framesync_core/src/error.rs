//! # Core Error Types
//!
//! All errors that can occur in the synchronization primitives.

use thiserror::Error;

/// Errors that can occur in the synchronization primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A point lookup found neither a committed entry nor a pending add.
    ///
    /// Carries the debug-formatted key.
    #[error("key not found: {0}")]
    KeyNotFound(String),
}

impl SyncError {
    /// Builds a `KeyNotFound` from any debug-printable key.
    pub fn key_not_found(key: &impl std::fmt::Debug) -> Self {
        Self::KeyNotFound(format!("{key:?}"))
    }
}

/// Result type for synchronization primitives.
pub type SyncResult<T> = Result<T, SyncError>;
