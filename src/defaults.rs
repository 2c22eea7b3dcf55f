//! Default configuration constants for visionloop.
//!
//! Shared by the configuration types, the pipeline and the reporter so the
//! values stay consistent across the crate.

/// Default minimum probability a class must exceed to be reported as a prediction.
pub const PROBABILITY_THRESHOLD: f32 = 0.3;

/// Default model input width in pixels.
pub const INPUT_WIDTH: u32 = 224;

/// Default model input height in pixels.
pub const INPUT_HEIGHT: u32 = 224;

/// Label emitted when no class exceeds the probability threshold.
pub const NO_PREDICTION_LABEL: &str = "No prediction exceeded probability threshold.";

/// Label some models emit for "nothing recognised". Treated like the sentinel by the reporter.
pub const NONE_LABEL: &str = "None";

/// Default capture rate for the built-in devices.
pub const CAPTURE_FPS: u32 = 30;

/// How long the worker sleeps when no frame has arrived yet.
pub const IDLE_POLL_MS: u64 = 5;

/// Consecutive device read failures after which capture is considered faulted.
pub const MAX_CONSECUTIVE_CAPTURE_ERRORS: u32 = 10;

/// Default report endpoint (Kafka REST proxy topic).
pub const REPORT_ENDPOINT: &str = "http://localhost:8082/topics/SCP476";

/// Content type of the Kafka REST JSON record batch format.
pub const REPORT_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Per-request timeout for report submissions.
pub const REPORT_TIMEOUT_MS: u64 = 5000;

/// Report submissions allowed in flight before new reports are dropped.
pub const REPORT_MAX_IN_FLIGHT: usize = 8;

/// Synthetic report coordinates are drawn from `[COORDINATE_MIN, COORDINATE_MAX)`.
pub const COORDINATE_MIN: f64 = 0.0;
pub const COORDINATE_MAX: f64 = 50.0;

/// Report the inference backend compiled into this build.
pub fn inference_backend() -> &'static str {
    if cfg!(feature = "backend-tract") {
        "tract-onnx"
    } else {
        "none"
    }
}
