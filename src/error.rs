//! Error types for visionloop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Model errors
    #[error("Model load failed: {message}")]
    ModelLoad { message: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    // Capture errors
    #[error("Capture initialization failed: {message}")]
    CaptureInit { message: String },

    #[error("Frame capture failed: {message}")]
    Capture { message: String },

    // Reporting errors
    #[error("Report failed: {message}")]
    Report { message: String },

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VisionError {
    /// True for faults that affect a single frame and leave the pipeline running.
    pub fn is_per_frame(&self) -> bool {
        matches!(self, VisionError::Inference { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VisionError>;
