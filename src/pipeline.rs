use crate::{
    config::Config,
    document::{Document, PageSource},
    engine::RecognitionEngine,
    error::{FatalErrorKind, PageFailure, PipelineError},
    postprocess::{self, LineFilter},
    reporter::{PageResult, Reporter},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Cancelling,
    Completed(Completion),
    Failed,
}

impl RunState {
    /// A run in this state holds the controller; new starts are rejected.
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::Cancelling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed(_) | RunState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub scale: f64,
}

impl RenderConfig {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.scale.is_finite() && self.scale > 0.0 {
            Ok(())
        } else {
            Err(PipelineError::InvalidScale(self.scale))
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { scale: 2.0 }
    }
}

impl From<&Config> for RenderConfig {
    fn from(cfg: &Config) -> Self {
        Self::new(cfg.render.scale)
    }
}

struct RunShared {
    id: u64,
    cancel: AtomicBool,
    state: Mutex<RunState>,
}

impl RunShared {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancel: AtomicBool::new(false),
            state: Mutex::new(RunState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> RunState {
        *self.lock()
    }

    fn set_state(&self, next: RunState) {
        let mut state = self.lock();
        debug!("run {}: {:?} -> {:?}", self.id, *state, next);
        *state = next;
    }

    fn request_cancel(&self) -> bool {
        let mut state = self.lock();
        if *state != RunState::Running {
            return false;
        }
        *state = RunState::Cancelling;
        self.cancel.store(true, Ordering::SeqCst);
        true
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Marks the run `Failed` if the worker unwinds before reaching a terminal state.
struct FailOnUnwind(Arc<RunShared>);

impl Drop for FailOnUnwind {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        if state.is_active() {
            warn!("run {}: worker exited while {:?}", self.0.id, *state);
            *state = RunState::Failed;
        }
    }
}

/// Handle to one run started by [`PipelineController::start`].
pub struct RunHandle {
    shared: Arc<RunShared>,
    worker: Option<JoinHandle<()>>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Request cancellation. Observed before the next page starts; a no-op once
    /// the run is cancelling or terminal.
    pub fn cancel(&self) {
        if self.shared.request_cancel() {
            info!("run {}: cancellation requested", self.shared.id);
        }
    }

    /// Block until the worker exits and return the terminal state.
    ///
    /// A panic after the run reached its terminal state leaves that state in place.
    pub fn wait(mut self) -> Result<RunState, PipelineError> {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                let mut state = self.shared.lock();
                if !state.is_terminal() {
                    *state = RunState::Failed;
                }
                return Err(PipelineError::WorkerPanicked);
            }
        }
        Ok(self.shared.state())
    }
}

/// Drives rasterize → recognize → report over every page of a document, one run
/// at a time.
pub struct PipelineController<E: RecognitionEngine + ?Sized> {
    cfg: Arc<Config>,
    engine: Arc<E>,
    filter: LineFilter,
    current: Mutex<Option<Arc<RunShared>>>,
    next_id: AtomicU64,
}

impl<E: RecognitionEngine + ?Sized + 'static> PipelineController<E> {
    pub fn new(cfg: &Config, engine: Arc<E>) -> Result<Self> {
        Ok(Self {
            cfg: Arc::new(cfg.clone()),
            engine,
            filter: LineFilter::from_config(cfg)?,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// State of the most recent run, `Idle` if none was started.
    pub fn state(&self) -> RunState {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| run.state())
            .unwrap_or(RunState::Idle)
    }

    pub fn cancel(&self, handle: &RunHandle) {
        handle.cancel();
    }

    /// Start processing `source` on a background worker.
    ///
    /// Rejects the request with `AlreadyRunning` while another run is active;
    /// a rejected source is closed without being read.
    /// When the engine is unavailable the reporter receives a single
    /// `on_fatal_error` before this returns, and the handle is already `Failed`.
    pub fn start<S, R>(
        &self,
        source: S,
        render: RenderConfig,
        reporter: R,
    ) -> Result<RunHandle, PipelineError>
    where
        S: PageSource + Send + 'static,
        R: Reporter + Send + 'static,
    {
        let mut document = Document::new(source);
        render.validate()?;
        let available = self.engine.is_available();

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = current.as_ref() {
            if run.state().is_active() {
                warn!("run {} still active; rejecting start", run.id);
                return Err(PipelineError::AlreadyRunning);
            }
        }

        let shared = Arc::new(RunShared::new(self.next_id.fetch_add(1, Ordering::SeqCst)));
        *current = Some(shared.clone());

        if !available {
            shared.set_state(RunState::Failed);
            drop(current);
            warn!(
                "run {}: engine {} unavailable: {}",
                shared.id,
                self.engine.name(),
                self.engine.availability_hint()
            );
            document.close();
            reporter.on_fatal_error(FatalErrorKind::EngineUnavailable);
            return Ok(RunHandle {
                shared,
                worker: None,
            });
        }

        shared.set_state(RunState::Running);
        drop(current);
        info!(
            "run {}: started scale={} engine={}",
            shared.id,
            render.scale,
            self.engine.name()
        );

        let worker = PageWorker {
            shared: shared.clone(),
            cfg: self.cfg.clone(),
            engine: self.engine.clone(),
            filter: self.filter.clone(),
            document,
            render,
            reporter,
        };

        let spawned = std::thread::Builder::new()
            .name("page-pipeline".into())
            .spawn(move || worker.run());

        match spawned {
            Ok(join) => Ok(RunHandle {
                shared,
                worker: Some(join),
            }),
            Err(e) => {
                shared.set_state(RunState::Failed);
                Err(PipelineError::Spawn(e))
            }
        }
    }
}

struct PageWorker<S: PageSource, R: Reporter, E: RecognitionEngine + ?Sized> {
    shared: Arc<RunShared>,
    cfg: Arc<Config>,
    engine: Arc<E>,
    filter: LineFilter,
    document: Document<S>,
    render: RenderConfig,
    reporter: R,
}

impl<S: PageSource, R: Reporter, E: RecognitionEngine + ?Sized> PageWorker<S, R, E> {
    fn run(mut self) {
        let _guard = FailOnUnwind(self.shared.clone());
        let id = self.shared.id;
        let page_count = self.document.page_count();
        debug!("run {id}: {page_count} pages");
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for index in 0..page_count {
            if self.shared.cancel_requested() {
                self.finish_cancelled(index);
                return;
            }

            let result = self.process_page(index);
            if result.ok {
                succeeded += 1;
            } else {
                failed += 1;
            }
            let progress = (index + 1) as f64 / page_count as f64;
            debug!("run {id}: page {} ok={} progress={progress:.3}", index + 1, result.ok);
            self.reporter.on_page(&result, progress);
        }

        if self.shared.cancel_requested() {
            self.finish_cancelled(page_count);
            return;
        }

        self.document.close();
        info!("run {id}: complete ok={succeeded} failed={failed}");
        self.shared.set_state(RunState::Completed(Completion::Finished));
        self.reporter.on_complete(succeeded, failed);
    }

    fn finish_cancelled(&mut self, pages_done: usize) {
        self.document.close();
        info!("run {}: cancelled after {pages_done} pages", self.shared.id);
        self.shared.set_state(RunState::Completed(Completion::Cancelled));
        self.reporter.on_cancelled(pages_done);
    }

    fn process_page(&mut self, index: usize) -> PageResult {
        let image = match self.document.rasterize(index, self.render.scale) {
            Ok(image) => image,
            Err(err) => {
                warn!("page {}: rasterize failed: {err}", index + 1);
                return PageResult::failed(PageFailure::RasterizeFailed {
                    index,
                    reason: err.to_string(),
                });
            }
        };

        match self.engine.recognize(&image) {
            Ok(raw) => {
                let lines = postprocess::clean_lines(&self.cfg, &self.filter, raw);
                let text = postprocess::page_block(&self.cfg, index, &lines);
                PageResult::success(index, lines, text)
            }
            Err(err) => {
                warn!("page {}: recognize failed: {err}", index + 1);
                PageResult::failed(PageFailure::RecognizeFailed {
                    index,
                    reason: err.to_string(),
                })
            }
        }
    }
}
