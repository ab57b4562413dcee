//! # Worker Pool
//!
//! Fixed-size pool of OS threads used to parallelize command recording.
//!
//! ```text
//!   enqueue ──> [Mutex<VecDeque<Job>>] ──notify_one──> worker 0..N
//!                                                        │
//!                             Enqueued ─> Processing ─> Finished
//!                                                        │
//!                      panic ──catch_unwind──> [failure channel]
//! ```
//!
//! A task that panics never takes its worker down: the panic is caught, the
//! status cell is marked failed, and a `TaskFailure` goes out on a bounded
//! side channel. Reports that find the channel full are counted and dropped.
//! Waiting on a status cell blocks on a condition variable.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::error::{RenderError, RenderResult};

/// Failure reports held before new ones are dropped.
pub const FAILURE_BACKLOG: usize = 256;

/// Lifecycle of a pool task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    /// Waiting in the queue.
    Enqueued = 0,
    /// Running on a worker.
    Processing = 1,
    /// Done, successfully or not.
    Finished = 2,
}

impl TaskStatus {
    /// Status cells only ever store a `TaskStatus` discriminant.
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Enqueued,
            1 => Self::Processing,
            2 => Self::Finished,
            other => unreachable!("invalid task status byte {other}"),
        }
    }
}

struct StatusInner {
    status: AtomicU8,
    failed: AtomicBool,
    transitions: AtomicU8,
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// Tri-state completion cell for one task.
///
/// Only the pool moves the status forward. Cheap to clone; clones observe
/// the same task.
#[derive(Clone)]
pub struct StatusCell {
    inner: Arc<StatusInner>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    /// Creates a cell in the `Enqueued` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatusInner {
                status: AtomicU8::new(TaskStatus::Enqueued as u8),
                failed: AtomicBool::new(false),
                transitions: AtomicU8::new(0),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    /// Returns true once the task has finished.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status() == TaskStatus::Finished
    }

    /// Returns true if the task panicked or was discarded at shutdown.
    #[inline]
    #[must_use]
    pub fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Number of status changes since the cell was last enqueued.
    ///
    /// A task that ran to completion reports 3: enqueued, processing,
    /// finished.
    #[must_use]
    pub fn transitions(&self) -> u8 {
        self.inner.transitions.load(Ordering::Acquire)
    }

    /// Blocks until the task has finished.
    pub fn wait(&self) {
        if self.is_finished() {
            return;
        }
        let mut guard = self.inner.mutex.lock();
        while !self.is_finished() {
            self.inner.condvar.wait(&mut guard);
        }
    }

    /// Blocks until the task has finished or `timeout` elapses.
    ///
    /// Returns true if the task finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_finished() {
            return true;
        }
        let mut guard = self.inner.mutex.lock();
        if !self.is_finished() {
            self.inner.condvar.wait_for(&mut guard, timeout);
        }
        self.is_finished()
    }

    fn enqueued(&self) {
        self.inner.failed.store(false, Ordering::Release);
        self.inner
            .status
            .store(TaskStatus::Enqueued as u8, Ordering::Release);
        self.inner.transitions.store(1, Ordering::Release);
    }

    fn advance(&self, from: TaskStatus, to: TaskStatus) {
        let moved = self
            .inner
            .status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        debug_assert!(moved, "status cell moved out of order: {from:?} -> {to:?}");
        if moved {
            self.inner.transitions.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn finish(&self, failed: bool) {
        if failed {
            self.inner.failed.store(true, Ordering::Release);
        }
        // Status changes under the mutex so a waiter between its check and
        // its wait cannot miss the notification.
        let _guard = self.inner.mutex.lock();
        let from = self.status();
        self.advance(from, TaskStatus::Finished);
        self.inner.condvar.notify_all();
    }
}

impl std::fmt::Debug for StatusCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCell")
            .field("status", &self.status())
            .field("failed", &self.failed())
            .finish()
    }
}

/// Report of a task that did not complete normally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFailure {
    /// Id returned by `enqueue`.
    pub task_id: u64,
    /// Panic message, or the reason the task never ran.
    pub message: String,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
    id: u64,
    job: Job,
    status: Option<StatusCell>,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedTask>>,
    available: Condvar,
    active: AtomicBool,
    next_task_id: AtomicU64,
    completed: AtomicU64,
    failures: Sender<TaskFailure>,
    dropped_failures: AtomicU64,
}

impl Shared {
    fn report(&self, failure: TaskFailure) {
        warn!(task_id = failure.task_id, message = %failure.message, "pool task failed");
        // The pool holds a receiver, so the channel never disconnects.
        if self.failures.try_send(failure).is_err() {
            self.dropped_failures.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// Fixed-size thread pool with per-task status cells.
///
/// ## Usage
///
/// ```rust,ignore
/// let pool = WorkerPool::new(4)?;
/// let cell = StatusCell::new();
/// pool.enqueue(move || record_range(0..64), Some(cell.clone()))?;
/// cell.wait();
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    failures: Receiver<TaskFailure>,
    threads: usize,
}

impl WorkerPool {
    /// Starts `threads` workers (at least one).
    ///
    /// # Errors
    ///
    /// `RenderError::WorkerSpawn` if a thread cannot be started. Workers
    /// started before the failure are shut down.
    pub fn new(threads: usize) -> RenderResult<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(FAILURE_BACKLOG);

        let pool = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                active: AtomicBool::new(true),
                next_task_id: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failures: sender,
                dropped_failures: AtomicU64::new(0),
            }),
            workers: Mutex::new(Vec::with_capacity(threads)),
            failures: receiver,
            threads,
        };

        for index in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("framesync-worker-{index}"))
                .spawn(move || worker_loop(index, &shared))
                .map_err(|e| RenderError::WorkerSpawn(e.to_string()))?;
            pool.workers.lock().push(handle);
        }

        info!(threads, "worker pool started");
        Ok(pool)
    }

    /// Queues `task` and wakes one idle worker.
    ///
    /// `status`, if given, is reset to `Enqueued` and advanced by the worker
    /// that runs the task. Returns the task id used in failure reports.
    ///
    /// # Errors
    ///
    /// `RenderError::PoolShutdown` after `shutdown`.
    pub fn enqueue<F>(&self, task: F, status: Option<StatusCell>) -> RenderResult<u64>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut queue = self.shared.queue.lock();
            if !self.shared.active.load(Ordering::Acquire) {
                return Err(RenderError::PoolShutdown);
            }
            if let Some(cell) = &status {
                cell.enqueued();
            }
            queue.push_back(QueuedTask {
                id,
                job: Box::new(task),
                status,
            });
        }
        self.shared.available.notify_one();
        Ok(id)
    }

    /// Status of the task tracked by `cell`.
    #[must_use]
    pub fn status(&self, cell: &StatusCell) -> TaskStatus {
        cell.status()
    }

    /// Receiver for failure reports. Every clone sees each report once.
    #[must_use]
    pub fn failures(&self) -> Receiver<TaskFailure> {
        self.failures.clone()
    }

    /// Drains the failure reports received so far.
    #[must_use]
    pub fn drain_failures(&self) -> Vec<TaskFailure> {
        self.failures.try_iter().collect()
    }

    /// Failure reports dropped because `FAILURE_BACKLOG` reports were
    /// already waiting.
    #[must_use]
    pub fn dropped_failures(&self) -> u64 {
        self.shared.dropped_failures.load(Ordering::Acquire)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Tasks waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Tasks that ran to completion, including ones that panicked.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Returns true until `shutdown` is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Stops accepting tasks, wakes and joins every worker.
    ///
    /// A worker finishes the task it is running; tasks still queued are
    /// discarded, their cells marked finished and failed. Calling this more
    /// than once is harmless.
    pub fn shutdown(&self) {
        {
            let _queue = self.shared.queue.lock();
            self.shared.active.store(false, Ordering::Release);
        }
        self.shared.available.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        let joined = workers.len();
        for handle in workers {
            if handle.join().is_err() {
                warn!("worker thread exited abnormally");
            }
        }

        let abandoned = std::mem::take(&mut *self.shared.queue.lock());
        let discarded = abandoned.len();
        for task in abandoned {
            if let Some(cell) = &task.status {
                cell.finish(true);
            }
            self.shared.report(TaskFailure {
                task_id: task.id,
                message: "discarded at shutdown".to_string(),
            });
        }

        info!(workers = joined, discarded, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("active", &self.is_active())
            .field("queued", &self.queued())
            .finish()
    }
}

fn worker_loop(index: usize, shared: &Shared) {
    debug!(worker = index, "worker started");

    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if !shared.active.load(Ordering::Acquire) {
                    break None;
                }
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                shared.available.wait(&mut queue);
            }
        };

        let Some(task) = task else { break };
        run_task(task, shared);
    }

    debug!(worker = index, "worker exiting");
}

fn run_task(task: QueuedTask, shared: &Shared) {
    let QueuedTask { id, job, status } = task;

    if let Some(cell) = &status {
        cell.advance(TaskStatus::Enqueued, TaskStatus::Processing);
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(job));
    shared.completed.fetch_add(1, Ordering::AcqRel);

    let failed = outcome.is_err();
    if let Err(payload) = outcome {
        shared.report(TaskFailure {
            task_id: id,
            message: panic_message(payload.as_ref()),
        });
    }

    if let Some(cell) = &status {
        cell.finish(failed);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
