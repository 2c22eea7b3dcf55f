//! visionloop - real-time frame classification
//!
//! Pulls frames from a capture source, classifies each with a pre-loaded
//! model, shows the top prediction and reports it to a remote collector on a
//! best-effort basis.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod capture;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod model;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod report;

// Composition root - needs the terminal renderer
#[cfg(feature = "cli")]
pub mod app;

// Core seams (source → model → sink/reporter)
pub use capture::{Frame, FrameGuard, FrameSource};
pub use model::{Classifier, ModelRunner, Prediction};
pub use pipeline::{PipelineController, PipelineState, StatusSink};
pub use report::{ReportTransport, Reporter};

// Error handling
pub use error::{Result, VisionError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_suffix_when_available() {
        let ver = version_string();
        if let Some(hash) = option_env!("GIT_HASH").filter(|h| !h.is_empty()) {
            assert!(ver.ends_with(hash));
            assert!(ver.contains('+'));
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
