//! Application entry points.
//!
//! Builds the pipeline from configuration and plays the presentation role:
//! the calling async task drains status updates and renders them, while the
//! worker thread does the per-frame work.

use crate::capture::{
    DeviceFrameSource, FrameSource, StillImageDevice, SyntheticDevice, load_image_frame,
};
use crate::config::{CaptureConfig, CaptureKind, Config, ModelConfig, ReportConfig, StatusTarget};
use crate::error::{Result, VisionError};
use crate::model::{InputShape, ModelLoader, ModelRunner, Prediction, loader};
use crate::output::{finish_status, render_status};
use crate::pipeline::{PipelineController, StatusReceiver, StatusSink, status_channel};
use crate::report::{CoordinateGenerator, ReportTransport, Reporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// How often the presentation loop drains status updates.
const STATUS_TICK: Duration = Duration::from_millis(50);

/// Command-line overrides applied on top of file and environment config.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub model: Option<PathBuf>,
    pub labels: Option<PathBuf>,
    pub threshold: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub image: Option<PathBuf>,
    pub report_endpoint: Option<String>,
    pub no_report: bool,
    pub status: Option<StatusTarget>,
}

impl RunOverrides {
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(model) = self.model {
            config.model.path = model;
        }
        if let Some(labels) = self.labels {
            config.model.labels = Some(labels);
        }
        if let Some(threshold) = self.threshold {
            config.model.probability_threshold = threshold;
        }
        if let Some(width) = self.width {
            config.model.input_width = width;
        }
        if let Some(height) = self.height {
            config.model.input_height = height;
        }
        if let Some(image) = self.image {
            config.capture.source = CaptureKind::Image;
            config.capture.image = Some(image);
        }
        if let Some(endpoint) = self.report_endpoint {
            config.report.endpoint = endpoint;
        }
        if self.no_report {
            config.report.enabled = false;
        }
        if let Some(status) = self.status {
            config.display.target = status;
        }
        config
    }
}

/// Deferred construction of the configured model.
#[cfg(feature = "backend-tract")]
pub fn build_loader(model: &ModelConfig) -> ModelLoader {
    use crate::model::{Classifier, TractClassifier};

    let path = model.path.clone();
    let labels = model.labels.clone();
    let shape = InputShape::new(model.input_width, model.input_height);
    loader(move || {
        let classifier: Arc<dyn Classifier> =
            Arc::new(TractClassifier::load(&path, labels.as_deref(), shape)?);
        Ok(classifier)
    })
}

#[cfg(not(feature = "backend-tract"))]
pub fn build_loader(_model: &ModelConfig) -> ModelLoader {
    loader(|| {
        Err(VisionError::ModelLoad {
            message: "built without an inference backend (enable the `backend-tract` feature)"
                .to_string(),
        })
    })
}

/// Capture source for the configured device.
pub fn build_source(capture: &CaptureConfig) -> Result<Arc<dyn FrameSource>> {
    let source = match capture.source {
        CaptureKind::Synthetic => {
            DeviceFrameSource::new(Box::new(SyntheticDevice::new(capture.fps)))
        }
        CaptureKind::Image => {
            let path = capture
                .image
                .clone()
                .ok_or_else(|| VisionError::ConfigInvalidValue {
                    key: "capture.image".to_string(),
                    message: "required when capture.source = \"image\"".to_string(),
                })?;
            DeviceFrameSource::new(Box::new(StillImageDevice::new(path, capture.fps)))
        }
    };
    Ok(Arc::new(source))
}

/// Reporter for the configured endpoint, or `None` when reporting is off.
pub fn build_reporter(report: &ReportConfig, runtime: Handle) -> Result<Option<Arc<Reporter>>> {
    if !report.enabled {
        tracing::debug!("prediction reporting disabled");
        return Ok(None);
    }

    #[cfg(feature = "report-http")]
    {
        let transport = crate::report::HttpTransport::new(
            &report.endpoint,
            &report.content_type,
            Duration::from_millis(report.timeout_ms),
        )?;
        tracing::info!("reporting predictions to {}", transport.endpoint());
        Ok(Some(Arc::new(configure_reporter(
            Arc::new(transport),
            report,
            runtime,
        ))))
    }

    #[cfg(not(feature = "report-http"))]
    {
        let _ = runtime;
        tracing::warn!("built without `report-http`; predictions will not be reported");
        Ok(None)
    }
}

/// Apply the `[report]` limits and coordinate seed to a reporter.
pub fn configure_reporter(
    transport: Arc<dyn ReportTransport>,
    report: &ReportConfig,
    runtime: Handle,
) -> Reporter {
    let reporter = Reporter::new(transport, runtime).with_max_in_flight(report.max_in_flight);
    match report.coordinate_seed {
        Some(seed) => reporter.with_coordinates(CoordinateGenerator::seeded(seed)),
        None => reporter,
    }
}

fn build_runner(model: &ModelConfig) -> ModelRunner {
    ModelRunner::new(model.probability_threshold).with_softmax(model.apply_softmax)
}

/// Assemble a controller from configuration.
pub fn build_controller(
    config: &Config,
    sink: Arc<dyn StatusSink>,
    runtime: Handle,
) -> Result<PipelineController> {
    let source = build_source(&config.capture)?;
    let mut controller = PipelineController::new(
        build_runner(&config.model),
        build_loader(&config.model),
        source,
        sink,
    )
    .with_capture_shape(InputShape::new(
        config.model.input_width,
        config.model.input_height,
    ))
    .with_idle_poll(config.capture.idle_poll());

    if let Some(reporter) = build_reporter(&config.report, runtime)? {
        controller = controller.with_reporter(reporter);
    }
    Ok(controller)
}

fn drain_status(receiver: &StatusReceiver, target: StatusTarget) {
    for status in receiver.try_iter() {
        render_status(target, &status);
    }
}

/// Run the live pipeline until Ctrl+C or until capture ends.
pub async fn run_pipeline(config: Config) -> Result<()> {
    config.validate()?;

    let target = config.display.target;
    let (sink, receiver) = status_channel();
    let controller = build_controller(&config, Arc::new(sink), Handle::current())?;

    if let Err(e) = controller.start().await {
        drain_status(&receiver, target);
        finish_status(target);
        return fall_back_to_image(&controller, &config, e);
    }
    drain_status(&receiver, target);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut tick = tokio::time::interval(STATUS_TICK);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    tracing::warn!("failed to listen for Ctrl+C: {e}");
                }
                tracing::info!("interrupt received, shutting down");
                break;
            }
            _ = tick.tick() => {
                if let Some(status) = receiver.latest() {
                    render_status(target, &status);
                }
                if !controller.is_worker_active() {
                    tracing::warn!("capture ended, shutting down");
                    break;
                }
            }
        }
    }

    let stopped = controller.shutdown().await;
    if let Some(status) = receiver.latest() {
        render_status(target, &status);
    }
    finish_status(target);
    stopped
}

/// After a failed start, classify the configured still image if the model
/// did load. Otherwise return the start error.
fn fall_back_to_image(
    controller: &PipelineController,
    config: &Config,
    error: VisionError,
) -> Result<()> {
    let (true, Some(image)) = (controller.is_model_loaded(), config.capture.image.as_deref())
    else {
        return Err(error);
    };

    tracing::info!("classifying {} instead of live capture", image.display());
    let frame = load_image_frame(image, None)?;
    let prediction = controller.classify(&frame)?;
    render_status(config.display.target, &prediction.status_text());
    finish_status(config.display.target);
    Ok(())
}

/// Classify one image file and optionally report the result.
pub async fn run_classify(config: Config, image: &Path, report: bool) -> Result<Prediction> {
    config.validate()?;

    let runner = build_runner(&config.model);
    runner.load_model(build_loader(&config.model)).await?;

    let frame = load_image_frame(image, None)?;
    let prediction = runner.evaluate(&frame)?;

    if report && let Some(reporter) = build_reporter(&config.report, Handle::current())? {
        match reporter.submit(&prediction.label).await {
            Ok(true) => tracing::info!("prediction reported"),
            Ok(false) => tracing::info!("'{}' is not reported", prediction.label),
            Err(e) => tracing::warn!("report failed: {e}"),
        }
    }

    Ok(prediction)
}
