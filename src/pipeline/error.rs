//! Reporting of per-frame faults from the inference worker.

use crate::error::VisionError;
use parking_lot::Mutex;

/// Trait for reporting worker errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a pipeline stage.
    fn report(&self, stage: &str, error: &VisionError);
}

/// Error reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &VisionError) {
        if error.is_per_frame() {
            tracing::warn!(stage = stage, "{error}");
        } else {
            tracing::error!(stage = stage, "{error}");
        }
    }
}

/// Collects reported errors as `"stage: message"` strings, for tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, stage: &str, error: &VisionError) {
        self.errors.lock().push(format!("{stage}: {error}"));
    }
}
