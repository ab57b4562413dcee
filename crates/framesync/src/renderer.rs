//! # Frame Renderer
//!
//! Records one polled frame in parallel and submits it serially:
//!
//! ```text
//!   FrameTicket { batch: 0..N jobs }
//!        │
//!        ├── jobs 0..64    ──> pool task ──┐
//!        ├── jobs 64..128  ──> pool task ──┼──> (range index, commands) ──> channel
//!        └── jobs 128..N   ──> pool task ──┘
//!                                                    │
//!                         wait on every StatusCell   │
//!                                                    ▼
//!                         submit command lists in range order
//! ```
//!
//! A frame is submitted whole or not at all: if any range fails to record,
//! nothing is handed to the submitter. A range whose task panicked fails
//! with the panic message taken from the pool's failure reports.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use framesync_render::{FrameTicket, StatusCell, WorkerPool};
use tracing::{debug, warn};

use crate::error::{FrameError, FrameResult};

/// A batch of independent jobs.
pub trait JobBatch: Send + Sync + 'static {
    /// Number of jobs in the batch.
    fn job_count(&self) -> usize;
}

impl<T: Send + Sync + 'static> JobBatch for Vec<T> {
    fn job_count(&self) -> usize {
        self.len()
    }
}

impl JobBatch for () {
    fn job_count(&self) -> usize {
        0
    }
}

/// Records command lists for ranges of a batch. Runs on pool workers.
pub trait RecordCommands<B>: Send + Sync + 'static {
    /// One recorded command list.
    type Commands: Send + 'static;

    /// Records `jobs` of `batch` (frame number `frame`).
    ///
    /// # Errors
    ///
    /// A reason string; the frame is not submitted.
    fn record(&self, frame: u64, batch: &B, jobs: Range<usize>) -> Result<Self::Commands, String>;
}

/// Receives recorded command lists in job order. Runs on the render thread.
pub trait SubmitCommands<C>: Send + 'static {
    /// Submits one command list of frame `frame`.
    ///
    /// # Errors
    ///
    /// A reason string; the remaining lists of the frame are dropped.
    fn submit(&mut self, frame: u64, commands: C) -> Result<(), String>;
}

/// Outcome of one rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame: u64,
    /// Jobs in the batch.
    pub jobs: usize,
    /// Command lists submitted (one per range).
    pub submitted: usize,
}

/// Splits `0..jobs` into consecutive ranges of at most `per_task` jobs.
#[must_use]
pub fn partition(jobs: usize, per_task: usize) -> Vec<Range<usize>> {
    let per_task = per_task.max(1);
    (0..jobs)
        .step_by(per_task)
        .map(|start| start..(start + per_task).min(jobs))
        .collect()
}

/// Parallel recorder, serial submitter.
pub struct FrameRenderer<B, R, S> {
    pool: Arc<WorkerPool>,
    recorder: Arc<R>,
    submitter: S,
    jobs_per_task: usize,
    _batch: std::marker::PhantomData<fn(B)>,
}

impl<B, R, S> FrameRenderer<B, R, S>
where
    B: JobBatch,
    R: RecordCommands<B>,
    S: SubmitCommands<R::Commands>,
{
    /// Creates a renderer recording on `pool`, `jobs_per_task` jobs per task.
    #[must_use]
    pub fn new(pool: Arc<WorkerPool>, recorder: R, submitter: S, jobs_per_task: usize) -> Self {
        Self {
            pool,
            recorder: Arc::new(recorder),
            submitter,
            jobs_per_task: jobs_per_task.max(1),
            _batch: std::marker::PhantomData,
        }
    }

    /// The submitter.
    #[must_use]
    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Mutable access to the submitter.
    pub fn submitter_mut(&mut self) -> &mut S {
        &mut self.submitter
    }

    /// Records every job range of `ticket` on the pool, waits for all of
    /// them, then submits the command lists in range order.
    ///
    /// # Errors
    ///
    /// - `FrameError::Render(PoolShutdown)` if the pool is gone
    /// - `FrameError::RecordFailed` for the first range that failed or panicked
    /// - `FrameError::SubmitFailed` if the submitter rejects a list
    pub fn render_frame(&mut self, ticket: &FrameTicket<B>) -> FrameResult<FrameReport> {
        let frame = ticket.frame;
        let jobs = ticket.batch.job_count();
        let ranges = partition(jobs, self.jobs_per_task);

        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut cells: Vec<StatusCell> = Vec::with_capacity(ranges.len());
        let mut task_ids = Vec::with_capacity(ranges.len());

        for (index, range) in ranges.iter().cloned().enumerate() {
            let cell = StatusCell::new();
            let recorder = Arc::clone(&self.recorder);
            let batch = Arc::clone(&ticket.batch);
            let sender = sender.clone();

            let enqueued = self.pool.enqueue(
                move || {
                    let result = recorder.record(frame, &batch, range);
                    let _ = sender.send((index, result));
                },
                Some(cell.clone()),
            );
            match enqueued {
                Ok(id) => task_ids.push(id),
                Err(e) => {
                    // Ranges already queued finish before the error is reported.
                    for cell in &cells {
                        cell.wait();
                    }
                    return Err(e.into());
                }
            }
            cells.push(cell);
        }
        drop(sender);

        for cell in &cells {
            cell.wait();
        }

        let mut recorded: Vec<Option<Result<R::Commands, String>>> =
            std::iter::repeat_with(|| None).take(ranges.len()).collect();
        for (index, result) in receiver.try_iter() {
            recorded[index] = Some(result);
        }

        let mut panics = self.take_panics(&task_ids);

        let mut lists = Vec::with_capacity(ranges.len());
        for ((range, slot), id) in ranges.iter().zip(recorded).zip(&task_ids) {
            let reason = match slot {
                Some(Ok(commands)) => {
                    lists.push(commands);
                    continue;
                }
                Some(Err(reason)) => reason,
                None => panics
                    .remove(id)
                    .unwrap_or_else(|| "recording task panicked".to_string()),
            };
            warn!(frame, start = range.start, end = range.end, %reason, "frame not submitted");
            return Err(FrameError::RecordFailed {
                start: range.start,
                end: range.end,
                reason,
            });
        }

        let submitted = lists.len();
        for commands in lists {
            self.submitter
                .submit(frame, commands)
                .map_err(|reason| FrameError::SubmitFailed { frame, reason })?;
        }

        debug!(frame, jobs, submitted, "frame rendered");
        Ok(FrameReport {
            frame,
            jobs,
            submitted,
        })
    }

    /// Drains the pool's failure reports, keeping the panic messages of
    /// `task_ids`. Reports of other tasks were already logged by the pool.
    fn take_panics(&self, task_ids: &[u64]) -> HashMap<u64, String> {
        let mut panics = HashMap::new();
        for failure in self.pool.drain_failures() {
            if task_ids.contains(&failure.task_id) {
                panics.insert(failure.task_id, failure.message);
            } else {
                debug!(task_id = failure.task_id, "foreign failure report dropped");
            }
        }
        panics
    }
}

impl<B, R, S> std::fmt::Debug for FrameRenderer<B, R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRenderer")
            .field("jobs_per_task", &self.jobs_per_task)
            .finish_non_exhaustive()
    }
}
