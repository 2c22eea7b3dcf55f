//! Inference pipeline: a controller that owns the lifecycle and a worker
//! thread that runs the capture → evaluate → present → report loop.

pub mod cancel;
pub mod controller;
pub mod error;
pub mod sink;
pub mod state;
pub mod worker;

pub use cancel::CancelToken;
pub use controller::{PipelineController, STATUS_CAMERA_STARTED, STATUS_MODEL_LOADED};
pub use error::{CollectingReporter, ErrorReporter, LogReporter};
pub use sink::{ChannelSink, CollectorSink, StatusReceiver, StatusSink, status_channel};
pub use state::PipelineState;
pub use worker::{InferenceWorker, WorkerContext, WorkerHandle, WorkerStats};
