//! # Render Core
//!
//! One place that owns the shared pieces a renderer is built from: the
//! frame tracker, the binding tables, the pipeline and the worker pool.
//! Resource handlers get their tables from here so that everything commits
//! with the same tracker.

use std::sync::Arc;

use framesync_core::FrameTracker;
use framesync_render::{
    BindingResolver, BindingTables, FramePipeline, RenderConfig, ResourceTable, WorkerPool,
};
use tracing::info;

use crate::error::FrameResult;
use crate::render_thread::RenderThread;
use crate::renderer::{FrameRenderer, JobBatch, RecordCommands, SubmitCommands};

/// Shared state of one producer/renderer pair.
///
/// ## Usage
///
/// ```rust,ignore
/// let core = RenderCore::new(RenderConfig::default())?;
/// let meshes = core.resource_table::<Mesh>();
///
/// // Producer
/// meshes.create_or_update(cube_vb, mesh);
/// core.bindings().bind(ScopeKind::Entity, ScopeId(7), vb0, cube_vb);
/// core.pipeline().submit(draws);
///
/// // Consumer
/// let thread = core.spawn_render_thread(recorder, submitter)?;
/// ```
pub struct RenderCore<B> {
    config: RenderConfig,
    tracker: FrameTracker,
    bindings: BindingTables,
    pipeline: Arc<FramePipeline<B>>,
    pool: Arc<WorkerPool>,
}

impl<B: JobBatch> RenderCore<B> {
    /// Validates `config` and starts the worker pool.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad configuration, `WorkerSpawn` if the pool
    /// cannot start.
    pub fn new(config: RenderConfig) -> FrameResult<Self> {
        config.validate()?;

        let tracker = FrameTracker::new();
        let bindings = BindingTables::new(&tracker);
        let pipeline = Arc::new(FramePipeline::new(&tracker));
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);

        info!(
            workers = config.worker_threads,
            jobs_per_task = config.jobs_per_task,
            validation = ?config.validation,
            "render core ready"
        );

        Ok(Self {
            config,
            tracker,
            bindings,
            pipeline,
            pool,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The tracker every table and binding commits with.
    #[must_use]
    pub fn tracker(&self) -> &FrameTracker {
        &self.tracker
    }

    /// Entity and group bindings.
    #[must_use]
    pub fn bindings(&self) -> &BindingTables {
        &self.bindings
    }

    /// The frame pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<FramePipeline<B>> {
        &self.pipeline
    }

    /// The worker pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// A new resource table committing with this core's tracker.
    #[must_use]
    pub fn resource_table<T>(&self) -> ResourceTable<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        ResourceTable::new(&self.tracker)
    }

    /// A resolver over the bindings, using the configured validation mode.
    #[must_use]
    pub fn resolver(&self) -> BindingResolver<'_> {
        BindingResolver::new(&self.bindings, self.config.validation)
    }

    /// A renderer recording on this core's pool.
    #[must_use]
    pub fn renderer<R, S>(&self, recorder: R, submitter: S) -> FrameRenderer<B, R, S>
    where
        R: RecordCommands<B>,
        S: SubmitCommands<R::Commands>,
    {
        FrameRenderer::new(
            Arc::clone(&self.pool),
            recorder,
            submitter,
            self.config.jobs_per_task,
        )
    }

    /// Starts the consumer loop on its own thread.
    ///
    /// # Errors
    ///
    /// `FrameError::ThreadSpawn` if the thread cannot start.
    pub fn spawn_render_thread<R, S>(&self, recorder: R, submitter: S) -> FrameResult<RenderThread>
    where
        R: RecordCommands<B>,
        S: SubmitCommands<R::Commands>,
    {
        RenderThread::spawn(
            Arc::clone(&self.pipeline),
            self.renderer(recorder, submitter),
            self.config.idle_poll_interval(),
        )
    }
}

impl<B> std::fmt::Debug for RenderCore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCore")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
