//! # Render Thread
//!
//! The dedicated consumer thread:
//!
//! ```text
//!   loop {
//!       consumer_poll() ── Some(ticket) ──> render_frame(ticket)
//!                     └─ None ──────────> park for idle_poll_interval
//!   } until stop()
//! ```
//!
//! A frame that fails to record or submit is logged and skipped; the thread
//! keeps running. It exits with an error only if the worker pool is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use framesync_render::{FramePipeline, RenderError};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{FrameError, FrameResult};
use crate::renderer::{FrameRenderer, JobBatch, RecordCommands, SubmitCommands};

/// Render thread counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderThreadStats {
    /// Frames recorded and submitted.
    pub frames_rendered: u64,
    /// Frames dropped because recording or submission failed.
    pub frames_failed: u64,
    /// Number of the last frame rendered successfully.
    pub last_frame: u64,
}

/// Handle to the consumer thread.
///
/// Dropping the handle stops and joins the thread.
pub struct RenderThread {
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<RenderThreadStats>>,
    handle: Option<JoinHandle<FrameResult<()>>>,
}

impl RenderThread {
    /// Starts the consumer loop.
    ///
    /// # Errors
    ///
    /// `FrameError::ThreadSpawn` if the OS refuses the thread.
    pub fn spawn<B, R, S>(
        pipeline: Arc<FramePipeline<B>>,
        mut renderer: FrameRenderer<B, R, S>,
        idle_poll_interval: Duration,
    ) -> FrameResult<Self>
    where
        B: JobBatch,
        R: RecordCommands<B>,
        S: SubmitCommands<R::Commands>,
    {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(RenderThreadStats::default()));

        let thread_running = Arc::clone(&running);
        let thread_stats = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name("framesync-render".to_string())
            .spawn(move || {
                info!("render thread started");
                while thread_running.load(Ordering::Acquire) {
                    let Some(ticket) = pipeline.consumer_poll() else {
                        thread::park_timeout(idle_poll_interval);
                        continue;
                    };

                    match renderer.render_frame(&ticket) {
                        Ok(report) => {
                            let mut stats = thread_stats.lock();
                            stats.frames_rendered += 1;
                            stats.last_frame = report.frame;
                        }
                        Err(FrameError::Render(RenderError::PoolShutdown)) => {
                            warn!(frame = ticket.frame, "worker pool shut down, render thread exiting");
                            return Err(FrameError::Render(RenderError::PoolShutdown));
                        }
                        Err(e) => {
                            warn!(frame = ticket.frame, error = %e, "frame dropped");
                            thread_stats.lock().frames_failed += 1;
                        }
                    }
                }
                info!("render thread stopped");
                Ok(())
            })
            .map_err(|e| FrameError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            running,
            stats,
            handle: Some(handle),
        })
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> RenderThreadStats {
        *self.stats.lock()
    }

    /// Returns true while the loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the loop after the frame in progress and joins the thread.
    ///
    /// # Errors
    ///
    /// The error the loop exited with, or `FrameError::ThreadPanicked`.
    pub fn stop(mut self) -> FrameResult<RenderThreadStats> {
        self.join()?;
        Ok(self.stats())
    }

    fn join(&mut self) -> FrameResult<()> {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.thread().unpark();
        handle.join().map_err(|_| FrameError::ThreadPanicked)?
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            warn!(error = %e, "render thread exited with an error");
        }
    }
}

impl std::fmt::Debug for RenderThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderThread")
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}
