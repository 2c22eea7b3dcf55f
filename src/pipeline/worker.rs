//! The capture → evaluate → present → report loop.
//!
//! Runs on its own OS thread so the blocking acquire-and-infer cycle never
//! stalls the presentation thread or the async runtime.

use crate::capture::FrameSource;
use crate::error::{Result, VisionError};
use crate::model::ModelRunner;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::error::ErrorReporter;
use crate::pipeline::sink::StatusSink;
use crate::report::Reporter;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Thread name of the inference worker.
pub const WORKER_THREAD_NAME: &str = "inference-worker";

/// Counters returned when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Frames evaluated, successfully or not.
    pub iterations: u64,
    /// Evaluations that produced a concrete label.
    pub predictions: u64,
    /// Evaluations that ended in the no-prediction sentinel.
    pub below_threshold: u64,
    /// Per-frame evaluation errors.
    pub faults: u64,
    /// Polls that found no new frame.
    pub idle_polls: u64,
}

/// Everything one worker run needs.
pub struct WorkerContext {
    pub source: Arc<dyn FrameSource>,
    pub runner: Arc<ModelRunner>,
    pub sink: Arc<dyn StatusSink>,
    pub reporter: Option<Arc<Reporter>>,
    pub errors: Arc<dyn ErrorReporter>,
    pub idle_poll: Duration,
}

pub struct InferenceWorker;

impl InferenceWorker {
    /// Start the loop on a dedicated thread.
    pub fn spawn(context: WorkerContext, cancel: CancelToken) -> Result<WorkerHandle> {
        let (exit_tx, exit_rx) = oneshot::channel();
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let stats = run_loop(&context, &cancel);
                if exit_tx.send(()).is_err() {
                    tracing::trace!("no one is waiting for the worker exit");
                }
                stats
            })
            .map_err(|e| VisionError::Other(format!("failed to spawn inference worker: {e}")))?;

        Ok(WorkerHandle {
            thread,
            exited: Some(exit_rx),
        })
    }
}

/// Running worker thread plus a one-shot signal fired when its loop ends.
///
/// The signal also resolves (with an error) if the thread panics.
pub struct WorkerHandle {
    thread: JoinHandle<WorkerStats>,
    exited: Option<oneshot::Receiver<()>>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn thread(&self) -> &thread::Thread {
        self.thread.thread()
    }

    /// Take the exit signal. Returns `None` after the first call.
    pub fn take_exit_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        self.exited.take()
    }

    /// Block until the worker thread ends.
    pub fn join(self) -> thread::Result<WorkerStats> {
        self.thread.join()
    }
}

/// Run iterations until cancelled or capture is no longer active.
///
/// A frame that was already evaluated is not evaluated again; the loop idles
/// until the source publishes a newer one.
pub fn run_loop(context: &WorkerContext, cancel: &CancelToken) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut last_frame: Option<(u64, Instant)> = None;

    tracing::debug!("inference worker started");

    loop {
        if cancel.is_cancelled() {
            tracing::debug!("inference worker cancelled");
            break;
        }
        if !context.source.is_capturing() {
            tracing::debug!("capture is not active, inference worker exiting");
            break;
        }

        let outcome = {
            let Some(frame) = context.source.latest_frame() else {
                stats.idle_polls += 1;
                thread::sleep(context.idle_poll);
                continue;
            };
            let key = (frame.sequence, frame.captured_at);
            if last_frame == Some(key) {
                drop(frame);
                stats.idle_polls += 1;
                thread::sleep(context.idle_poll);
                continue;
            }
            last_frame = Some(key);
            context.runner.evaluate(&frame)
        };

        stats.iterations += 1;
        match outcome {
            Ok(prediction) => {
                if prediction.is_no_prediction() {
                    stats.below_threshold += 1;
                } else {
                    stats.predictions += 1;
                }
                context.sink.post(prediction.status_text());
                if let Some(reporter) = &context.reporter {
                    reporter.report(&prediction.label);
                }
            }
            Err(e) => {
                stats.faults += 1;
                context.errors.report("evaluate", &e);
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, MockFrameSource};
    use crate::model::{Classifier, MockClassifier, loader};
    use crate::pipeline::error::CollectingReporter;
    use crate::pipeline::sink::CollectorSink;

    async fn loaded_runner(model: MockClassifier) -> Arc<ModelRunner> {
        let runner = ModelRunner::new(0.3);
        runner
            .load_model(loader(move || {
                let model: Arc<dyn Classifier> = Arc::new(model);
                Ok(model)
            }))
            .await
            .unwrap();
        Arc::new(runner)
    }

    fn context(
        source: Arc<MockFrameSource>,
        runner: Arc<ModelRunner>,
        sink: Arc<CollectorSink>,
        errors: Arc<CollectingReporter>,
    ) -> WorkerContext {
        WorkerContext {
            source,
            runner,
            sink,
            reporter: None,
            errors,
            idle_poll: Duration::from_millis(1),
        }
    }

    fn cat_model() -> MockClassifier {
        MockClassifier::new(&["dog", "cat"])
            .with_scores(&[0.1, 0.9])
            .with_input_shape(4, 4)
    }

    #[tokio::test]
    async fn test_exits_immediately_when_not_capturing() {
        let source = Arc::new(MockFrameSource::new().with_frame(Frame::solid(4, 4, [0; 3], 1)));
        let sink = Arc::new(CollectorSink::new());
        let ctx = context(
            source.clone(),
            loaded_runner(cat_model()).await,
            sink.clone(),
            Arc::new(CollectingReporter::new()),
        );

        let stats = run_loop(&ctx, &CancelToken::new());

        assert_eq!(stats, WorkerStats::default());
        assert_eq!(source.acquisitions(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_exits_immediately_when_cancelled() {
        let source = Arc::new(MockFrameSource::new().with_frame(Frame::solid(4, 4, [0; 3], 1)));
        source.start(4, 4).await.unwrap();
        let ctx = context(
            source.clone(),
            loaded_runner(cat_model()).await,
            Arc::new(CollectorSink::new()),
            Arc::new(CollectingReporter::new()),
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        let stats = run_loop(&ctx, &cancel);

        assert_eq!(stats.iterations, 0);
        assert_eq!(source.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_evaluates_each_frame_once_and_posts_status() {
        let source = Arc::new(MockFrameSource::new().with_frame(Frame::solid(4, 4, [0; 3], 1)));
        source.start(4, 4).await.unwrap();
        let sink = Arc::new(CollectorSink::new());
        let model = cat_model();
        let ctx = context(
            source.clone(),
            loaded_runner(model.clone()).await,
            sink.clone(),
            Arc::new(CollectingReporter::new()),
        );

        let cancel = CancelToken::new();
        let handle = InferenceWorker::spawn(ctx, cancel.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let stats = handle.join().unwrap();

        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.predictions, 1);
        assert!(stats.idle_polls > 0);
        assert_eq!(model.calls(), 1);

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Prediction: cat, Probability: 90%"));
        assert_eq!(source.outstanding_frames(), 0);
    }

    #[tokio::test]
    async fn test_inference_errors_are_reported_and_loop_continues() {
        let source = Arc::new(MockFrameSource::new().with_frame(Frame::new(vec![0; 5], 4, 4, 1)));
        source.start(4, 4).await.unwrap();
        let errors = Arc::new(CollectingReporter::new());
        let sink = Arc::new(CollectorSink::new());
        let ctx = context(
            source.clone(),
            loaded_runner(cat_model()).await,
            sink.clone(),
            errors.clone(),
        );

        let cancel = CancelToken::new();
        let handle = InferenceWorker::spawn(ctx, cancel.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while errors.errors().is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        source.push_frame(Frame::solid(4, 4, [0; 3], 2));
        while sink.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        let stats = handle.join().unwrap();

        assert_eq!(stats.faults, 1);
        assert_eq!(stats.predictions, 1);
        assert!(errors.errors()[0].starts_with("evaluate: Inference failed"));
        assert_eq!(source.outstanding_frames(), 0);
    }

    #[tokio::test]
    async fn test_capture_fault_ends_loop() {
        let source = Arc::new(MockFrameSource::new());
        source.start(4, 4).await.unwrap();
        let ctx = context(
            source.clone(),
            loaded_runner(cat_model()).await,
            Arc::new(CollectorSink::new()),
            Arc::new(CollectingReporter::new()),
        );

        let handle = InferenceWorker::spawn(ctx, CancelToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.simulate_fault();

        let stats = handle.join().unwrap();
        assert_eq!(stats.iterations, 0);
        assert!(stats.idle_polls > 0);
    }

    #[tokio::test]
    async fn test_exit_signal_fires_when_loop_ends() {
        let source = Arc::new(MockFrameSource::new());
        source.start(4, 4).await.unwrap();
        let ctx = context(
            source.clone(),
            loaded_runner(cat_model()).await,
            Arc::new(CollectorSink::new()),
            Arc::new(CollectingReporter::new()),
        );

        let mut handle = InferenceWorker::spawn(ctx, CancelToken::new()).unwrap();
        let exited = handle.take_exit_signal().unwrap();
        assert!(handle.take_exit_signal().is_none());

        source.simulate_fault();
        tokio::time::timeout(Duration::from_secs(2), exited)
            .await
            .unwrap()
            .unwrap();
        assert!(handle.join().is_ok());
    }

    #[tokio::test]
    async fn test_worker_thread_is_named() {
        let source = Arc::new(MockFrameSource::new());
        let ctx = context(
            source,
            loaded_runner(cat_model()).await,
            Arc::new(CollectorSink::new()),
            Arc::new(CollectingReporter::new()),
        );

        let handle = InferenceWorker::spawn(ctx, CancelToken::new()).unwrap();
        assert_eq!(handle.thread().name(), Some(WORKER_THREAD_NAME));
        handle.join().unwrap();
    }
}
