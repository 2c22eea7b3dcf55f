//! End-to-end pipeline behaviour with in-memory collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use visionloop::capture::{DeviceFrameSource, Frame, FrameSource, MockFrameSource, SyntheticDevice};
use visionloop::model::{Classifier, MockClassifier, ModelLoader, ModelRunner, loader};
use visionloop::pipeline::{
    CollectingReporter, CollectorSink, PipelineController, PipelineState, STATUS_CAMERA_STARTED,
    STATUS_MODEL_LOADED,
};
use visionloop::report::{MemoryTransport, Reporter};
use visionloop::{VisionError, defaults};

fn model_loader(model: MockClassifier) -> ModelLoader {
    loader(move || {
        let model: Arc<dyn Classifier> = Arc::new(model);
        Ok(model)
    })
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

struct Harness {
    controller: PipelineController,
    source: Arc<MockFrameSource>,
    sink: Arc<CollectorSink>,
    transport: MemoryTransport,
}

fn harness(model: MockClassifier, source: MockFrameSource) -> Harness {
    let source = Arc::new(source);
    let sink = Arc::new(CollectorSink::new());
    let transport = MemoryTransport::new();
    let reporter = Arc::new(Reporter::new(
        Arc::new(transport.clone()),
        Handle::current(),
    ));

    let controller = PipelineController::new(
        ModelRunner::new(defaults::PROBABILITY_THRESHOLD),
        model_loader(model),
        source.clone(),
        sink.clone(),
    )
    .with_reporter(reporter)
    .with_error_reporter(Arc::new(CollectingReporter::new()))
    .with_idle_poll(Duration::from_millis(1));

    Harness {
        controller,
        source,
        sink,
        transport,
    }
}

fn cat_model() -> MockClassifier {
    MockClassifier::new(&["dog", "cat", "bird"])
        .with_scores(&[0.05, 0.9, 0.05])
        .with_input_shape(224, 224)
}

fn digit_model(digit: usize) -> MockClassifier {
    let labels: Vec<String> = (0..10).map(|d| d.to_string()).collect();
    let names: Vec<&str> = labels.iter().map(String::as_str).collect();
    let mut scores = vec![0.01; 10];
    scores[digit] = 0.91;
    MockClassifier::new(&names)
        .with_scores(&scores)
        .with_input_shape(224, 224)
}

fn frame(sequence: u64) -> Frame {
    Frame::solid(224, 224, [120, 90, 60], sequence)
}

#[tokio::test]
async fn confident_frame_is_shown_and_reported_once() {
    let h = harness(cat_model(), MockFrameSource::new().with_frame(frame(1)));

    h.controller.start().await.unwrap();
    assert_eq!(h.controller.state(), PipelineState::Running);
    assert_eq!(h.source.requested_shape(), Some((224, 224)));

    assert!(wait_until(|| h.transport.count() == 1).await);
    h.controller.shutdown().await.unwrap();

    let messages = h.sink.messages();
    assert_eq!(messages[0], STATUS_MODEL_LOADED);
    assert_eq!(messages[1], STATUS_CAMERA_STARTED);
    let predictions: Vec<_> = messages.iter().filter(|m| m.contains("cat")).collect();
    assert_eq!(predictions.len(), 1);
    assert!(predictions[0].contains("90%"), "{}", predictions[0]);

    let bodies = h.transport.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("\"prediction\": ca "), "{}", bodies[0]);

    let prediction = h.controller.classify(&frame(2)).unwrap();
    assert_eq!(prediction.label, "cat");
    assert_eq!(prediction.probability, 0.9);
    assert_eq!(h.source.outstanding_frames(), 0);
}

#[tokio::test]
async fn numeric_label_is_reported_as_bare_number() {
    let h = harness(digit_model(3), MockFrameSource::new().with_frame(frame(1)));

    h.controller.start().await.unwrap();
    assert!(wait_until(|| h.transport.count() == 1).await);
    h.controller.shutdown().await.unwrap();

    let body = &h.transport.bodies()[0];
    assert!(body.ends_with("\"prediction\": 3 }}]}"), "{body}");
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(parsed["records"][0]["value"]["prediction"], 3);
    for c in parsed["records"][0]["value"]["coordinates"]
        .as_array()
        .unwrap()
    {
        let c = c.as_f64().unwrap();
        assert!((0.0..50.0).contains(&c));
    }
}

#[tokio::test]
async fn low_confidence_frame_is_shown_but_not_reported() {
    let model = MockClassifier::new(&["dog", "cat"])
        .with_scores(&[0.2, 0.25])
        .with_input_shape(224, 224);
    let h = harness(model, MockFrameSource::new().with_frame(frame(1)));

    h.controller.start().await.unwrap();
    assert!(wait_until(|| h.sink.len() == 3).await);
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.controller.shutdown().await.unwrap();

    let messages = h.sink.messages();
    assert!(messages[2].contains(defaults::NO_PREDICTION_LABEL));
    assert_eq!(h.transport.count(), 0);
}

#[tokio::test]
async fn capture_failure_is_surfaced_once_and_never_runs() {
    let h = harness(
        cat_model(),
        MockFrameSource::new()
            .with_frame(frame(1))
            .with_start_failure("camera is busy"),
    );

    let result = h.controller.start().await;
    assert!(matches!(result, Err(VisionError::CaptureInit { .. })));
    assert_eq!(h.controller.state(), PipelineState::Stopped);
    assert!(h.controller.last_error().unwrap().contains("camera is busy"));

    let failures: Vec<_> = h
        .sink
        .messages()
        .into_iter()
        .filter(|m| m.contains("camera is busy"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(h.source.acquisitions(), 0);
    assert_eq!(h.transport.count(), 0);
}

#[tokio::test]
async fn shutdown_lets_in_flight_iteration_finish() {
    let model = cat_model().with_delay(Duration::from_millis(300));
    let observer = model.clone();
    let h = harness(model, MockFrameSource::new().with_frame(frame(1)));

    h.controller.start().await.unwrap();
    assert!(wait_until(|| observer.calls() == 1).await);

    // A fresh frame is waiting, but no new iteration may start after shutdown.
    h.source.push_frame(frame(2));
    h.controller.shutdown().await.unwrap();

    assert_eq!(h.controller.state(), PipelineState::Stopped);
    assert_eq!(observer.calls(), 1);
    assert!(h.sink.messages().iter().any(|m| m.contains("cat")));
    assert!(wait_until(|| h.transport.count() == 1).await);
    assert_eq!(h.source.stop_count(), 1);
    assert!(!h.source.is_capturing());
    assert_eq!(h.source.outstanding_frames(), 0);
}

#[tokio::test]
async fn stop_twice_is_harmless() {
    let h = harness(cat_model(), MockFrameSource::new());

    h.controller.start().await.unwrap();
    h.controller.shutdown().await.unwrap();
    assert!(!h.source.is_capturing());
    h.controller.shutdown().await.unwrap();
    assert!(!h.source.is_capturing());

    assert!(h.source.stop().await.is_ok());
    assert!(h.source.stop().await.is_ok());
    assert!(!h.source.is_capturing());
}

#[tokio::test]
async fn synthetic_camera_drives_the_loop() {
    let model = MockClassifier::new(&["pattern"])
        .with_scores(&[0.8])
        .with_input_shape(32, 32);
    let observer = model.clone();
    let source = Arc::new(DeviceFrameSource::new(Box::new(SyntheticDevice::new(200))));
    let sink = Arc::new(CollectorSink::new());

    let controller = PipelineController::new(
        ModelRunner::new(0.3),
        model_loader(model),
        source.clone(),
        sink.clone(),
    )
    .with_idle_poll(Duration::from_millis(1));

    controller.start().await.unwrap();
    assert!(wait_until(|| observer.calls() >= 5).await);
    controller.shutdown().await.unwrap();

    assert!(!source.is_capturing());
    assert!(source.latest_frame().is_none());
    assert_eq!(source.outstanding_frames(), 0);
    let (captured, _) = source.frame_counters();
    assert!(captured >= 5);
    assert!(
        sink.messages()
            .iter()
            .any(|m| m.starts_with("Prediction: pattern, Probability: 80%"))
    );
}
