//! # Frame Error Types
//!
//! Errors surfaced while rendering a frame or running the render thread.

use framesync_render::RenderError;
use thiserror::Error;

/// Errors that can occur while rendering frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Pool, binding or configuration failure.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Recording a job range failed; nothing of the frame was submitted.
    #[error("recording failed for jobs {start}..{end}: {reason}")]
    RecordFailed {
        /// First job of the range.
        start: usize,
        /// One past the last job of the range.
        end: usize,
        /// Reason reported by the recorder, or the task panic.
        reason: String,
    },

    /// The submitter rejected a command list.
    #[error("submission failed for frame {frame}: {reason}")]
    SubmitFailed {
        /// Frame being submitted.
        frame: u64,
        /// Reason reported by the submitter.
        reason: String,
    },

    /// The render thread could not be started.
    #[error("failed to spawn render thread: {0}")]
    ThreadSpawn(String),

    /// The render thread panicked.
    #[error("render thread panicked")]
    ThreadPanicked,
}

/// Result type for frame rendering.
pub type FrameResult<T> = Result<T, FrameError>;
