//! Pipeline lifecycle: load → start capture → run worker → shut down.
//!
//! The controller is the only component that changes pipeline state. Its
//! async methods are meant to be awaited from the presentation side; the
//! per-frame work happens on the worker thread.

use crate::capture::{Frame, FrameSource};
use crate::defaults;
use crate::error::{Result, VisionError};
use crate::model::{InputShape, ModelLoader, ModelRunner, Prediction};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::sink::StatusSink;
use crate::pipeline::state::PipelineState;
use crate::pipeline::worker::{InferenceWorker, WorkerContext, WorkerHandle, WorkerStats};
use crate::report::Reporter;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const STATUS_MODEL_LOADED: &str = "Loaded model. Starting camera...";
pub const STATUS_CAMERA_STARTED: &str = "Camera started. Running!";

pub struct PipelineController {
    runner: Arc<ModelRunner>,
    loader: Mutex<Option<ModelLoader>>,
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn StatusSink>,
    reporter: Option<Arc<Reporter>>,
    errors: Arc<dyn ErrorReporter>,
    capture_shape: InputShape,
    idle_poll: Duration,
    state: Arc<Mutex<PipelineState>>,
    last_error: Arc<Mutex<Option<String>>>,
    cancel: Mutex<Option<CancelToken>>,
    worker: Mutex<Option<WorkerHandle>>,
    /// Releases capture when the worker ends without being cancelled.
    watcher: Mutex<Option<JoinHandle<Option<Result<()>>>>>,
}

impl PipelineController {
    pub fn new(
        runner: ModelRunner,
        loader: ModelLoader,
        source: Arc<dyn FrameSource>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            runner: Arc::new(runner),
            loader: Mutex::new(Some(loader)),
            source,
            sink,
            reporter: None,
            errors: Arc::new(LogReporter),
            capture_shape: InputShape::default(),
            idle_poll: Duration::from_millis(defaults::IDLE_POLL_MS),
            state: Arc::new(Mutex::new(PipelineState::Idle)),
            last_error: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(None),
            worker: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_error_reporter(mut self, errors: Arc<dyn ErrorReporter>) -> Self {
        self.errors = errors;
        self
    }

    /// Capture shape used when the model does not declare one.
    pub fn with_capture_shape(mut self, shape: InputShape) -> Self {
        self.capture_shape = shape;
        self
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Reason the last start attempt or shutdown failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.runner.is_loaded()
    }

    /// True while the worker thread is alive. It exits on its own when
    /// capture stops underneath it, after which the controller releases the
    /// source and settles in `Stopped`.
    pub fn is_worker_active(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Load the model (once), start capture and launch the worker.
    ///
    /// On a capture failure the worker still runs in degraded mode, notices
    /// that nothing is capturing and exits at once; the controller ends in
    /// `Stopped` with the model loaded so [`classify`](Self::classify) works.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.can_start() {
                return Err(VisionError::Other(format!(
                    "cannot start pipeline while {}",
                    *state
                )));
            }
            *state = PipelineState::Loading;
        }
        *self.last_error.lock() = None;

        if !self.runner.is_loaded() {
            let loader = self.loader.lock().take();
            let loaded = match loader {
                Some(loader) => self.runner.load_model(loader).await,
                None => Err(VisionError::ModelLoad {
                    message: "no model loader configured".to_string(),
                }),
            };
            if let Err(e) = loaded {
                return Err(self.fail(format!("Error init: {e}"), e));
            }
        }
        self.sink.post(STATUS_MODEL_LOADED.to_string());

        self.set_state(PipelineState::Starting);
        let shape = self.runner.input_shape().unwrap_or(self.capture_shape);
        let capture = self.source.start(shape.width, shape.height).await;
        match &capture {
            Ok(()) => self.sink.post(STATUS_CAMERA_STARTED.to_string()),
            Err(e) => {
                tracing::error!("failed to start capture on {}: {e}", self.source.name());
                self.sink.post(format!(
                    "Failed to start camera: {e}. Using loaded/picked image."
                ));
            }
        }

        let cancel = CancelToken::new();
        let mut worker = match InferenceWorker::spawn(self.worker_context(), cancel.clone()) {
            Ok(worker) => worker,
            Err(e) => {
                if let Err(stop_err) = self.source.stop().await {
                    tracing::warn!("failed to release capture: {stop_err}");
                }
                return Err(self.fail(format!("Error init: {e}"), e));
            }
        };

        match capture {
            Ok(()) => {
                let exited = worker.take_exit_signal();
                *self.cancel.lock() = Some(cancel.clone());
                *self.worker.lock() = Some(worker);
                self.set_state(PipelineState::Running);
                if let Some(exited) = exited {
                    *self.watcher.lock() = Some(tokio::spawn(release_on_worker_exit(
                        exited,
                        cancel,
                        self.source.clone(),
                        self.state.clone(),
                        self.last_error.clone(),
                    )));
                }
                tracing::info!(
                    "pipeline running '{}' at {shape}, threshold {}",
                    self.runner.model_name().unwrap_or_default(),
                    self.runner.threshold()
                );
                Ok(())
            }
            Err(e) => {
                let stats = join_worker(worker).await;
                tracing::debug!("degraded worker exited: {stats:?}");
                if let Err(stop_err) = self.source.stop().await {
                    tracing::warn!("failed to release capture: {stop_err}");
                }
                *self.last_error.lock() = Some(e.to_string());
                self.set_state(PipelineState::Stopped);
                Err(e)
            }
        }
    }

    /// Cancel the worker, let the in-flight iteration finish, then release
    /// the capture device. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let cancel = self.cancel.lock().take();
        let worker = self.worker.lock().take();
        let watcher = self.watcher.lock().take();
        if cancel.is_none() && worker.is_none() && watcher.is_none() {
            return Ok(());
        }

        self.set_state(PipelineState::Stopping);
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(worker) = worker {
            let stats = join_worker(worker).await;
            let (captured, dropped) = self.source.frame_counters();
            tracing::info!(
                "worker stopped: {} frames evaluated, {} predictions, {} below threshold, {} faults ({} captured, {} dropped unread)",
                stats.iterations,
                stats.predictions,
                stats.below_threshold,
                stats.faults,
                captured,
                dropped
            );
        }

        let released = match watcher {
            Some(watcher) => watcher.await.unwrap_or_else(|e| {
                tracing::error!("capture watcher failed: {e}");
                None
            }),
            None => None,
        };
        let stopped = match released {
            Some(stopped) => stopped,
            None => stop_source(self.source.as_ref(), &self.last_error).await,
        };
        self.set_state(PipelineState::Stopped);
        stopped
    }

    /// Evaluate a manually supplied frame with the loaded model.
    pub fn classify(&self, frame: &Frame) -> Result<Prediction> {
        self.runner.evaluate(frame)
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            source: self.source.clone(),
            runner: self.runner.clone(),
            sink: self.sink.clone(),
            reporter: self.reporter.clone(),
            errors: self.errors.clone(),
            idle_poll: self.idle_poll,
        }
    }

    fn set_state(&self, state: PipelineState) {
        transition(&self.state, state);
    }

    /// Surface a terminal start failure once and collapse to `Stopped`.
    fn fail(&self, status: String, error: VisionError) -> VisionError {
        tracing::error!("{status}");
        self.sink.post(status);
        *self.last_error.lock() = Some(error.to_string());
        self.set_state(PipelineState::Stopped);
        error
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
    }
}

fn transition(current: &Mutex<PipelineState>, state: PipelineState) {
    let mut current = current.lock();
    tracing::debug!("pipeline {} -> {}", *current, state);
    *current = state;
}

async fn stop_source(source: &dyn FrameSource, last_error: &Mutex<Option<String>>) -> Result<()> {
    let stopped = source.stop().await;
    if let Err(e) = &stopped {
        tracing::error!("failed to stop capture: {e}");
        *last_error.lock() = Some(e.to_string());
    }
    stopped
}

/// Wait for the worker loop to end. If nobody cancelled it, capture died
/// underneath the pipeline: run Stopping → `stop()` → Stopped here.
///
/// Returns the stop result when this task released the source, `None` when
/// the exit was a requested shutdown.
async fn release_on_worker_exit(
    exited: oneshot::Receiver<()>,
    cancel: CancelToken,
    source: Arc<dyn FrameSource>,
    state: Arc<Mutex<PipelineState>>,
    last_error: Arc<Mutex<Option<String>>>,
) -> Option<Result<()>> {
    if exited.await.is_err() {
        tracing::debug!("inference worker ended without signalling");
    }
    if cancel.is_cancelled() {
        return None;
    }

    tracing::warn!("capture ended on {}, stopping pipeline", source.name());
    transition(&state, PipelineState::Stopping);
    let stopped = stop_source(source.as_ref(), &last_error).await;
    transition(&state, PipelineState::Stopped);
    Some(stopped)
}

/// Join the worker without blocking the async executor.
async fn join_worker(worker: WorkerHandle) -> WorkerStats {
    let joined = tokio::task::spawn_blocking(move || worker.join()).await;
    match joined {
        Ok(Ok(stats)) => stats,
        Ok(Err(panic_info)) => {
            let msg = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            tracing::error!("inference worker panicked: {msg}");
            WorkerStats::default()
        }
        Err(e) => {
            tracing::error!("failed to join inference worker: {e}");
            WorkerStats::default()
        }
    }
}
