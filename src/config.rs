use crate::defaults;
use crate::error::VisionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub capture: CaptureConfig,
    pub report: ReportConfig,
    pub display: DisplayConfig,
}

/// Model artifact and evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub labels: Option<PathBuf>,
    pub probability_threshold: f32,
    pub input_width: u32,
    pub input_height: u32,
    /// Apply softmax to raw model scores (for models that emit logits).
    pub apply_softmax: bool,
}

/// Frame capture settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: CaptureKind,
    pub image: Option<PathBuf>,
    pub fps: u32,
    pub idle_poll_ms: u64,
}

/// Built-in capture devices
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Moving test pattern.
    Synthetic,
    /// A still image replayed at the capture rate.
    Image,
}

/// Prediction reporting settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub content_type: String,
    pub timeout_ms: u64,
    pub max_in_flight: usize,
    /// Fixed seed for report coordinates, for reproducible payloads.
    pub coordinate_seed: Option<u64>,
}

/// Status display settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub target: StatusTarget,
}

/// Where the presentation layer renders status text
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusTarget {
    Stdout,
    Stderr,
    Log,
}

impl std::str::FromStr for StatusTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "log" => Ok(Self::Log),
            other => Err(format!(
                "{} is not a supported status target. Use `stdout`, `stderr` or `log`.",
                other
            )),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model.onnx"),
            labels: None,
            probability_threshold: defaults::PROBABILITY_THRESHOLD,
            input_width: defaults::INPUT_WIDTH,
            input_height: defaults::INPUT_HEIGHT,
            apply_softmax: false,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureKind::Synthetic,
            image: None,
            fps: defaults::CAPTURE_FPS,
            idle_poll_ms: defaults::IDLE_POLL_MS,
        }
    }
}

impl CaptureConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: defaults::REPORT_ENDPOINT.to_string(),
            content_type: defaults::REPORT_CONTENT_TYPE.to_string(),
            timeout_ms: defaults::REPORT_TIMEOUT_MS,
            max_in_flight: defaults::REPORT_MAX_IN_FLIGHT,
            coordinate_seed: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            target: StatusTarget::Stdout,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VISIONLOOP_MODEL → model.path
    /// - VISIONLOOP_LABELS → model.labels
    /// - VISIONLOOP_THRESHOLD → model.probability_threshold
    /// - VISIONLOOP_REPORT_ENDPOINT → report.endpoint
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VISIONLOOP_MODEL")
            && !model.is_empty()
        {
            self.model.path = PathBuf::from(model);
        }

        if let Ok(labels) = std::env::var("VISIONLOOP_LABELS")
            && !labels.is_empty()
        {
            self.model.labels = Some(PathBuf::from(labels));
        }

        if let Ok(threshold) = std::env::var("VISIONLOOP_THRESHOLD") {
            match threshold.parse::<f32>() {
                Ok(value) => self.model.probability_threshold = value,
                Err(_) if threshold.is_empty() => {}
                Err(e) => tracing::warn!("ignoring VISIONLOOP_THRESHOLD={threshold:?}: {e}"),
            }
        }

        if let Ok(endpoint) = std::env::var("VISIONLOOP_REPORT_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.report.endpoint = endpoint;
        }

        self
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), VisionError> {
        let threshold = self.model.probability_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "model.probability_threshold",
                format!("{threshold} is not between 0 and 1"),
            ));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(invalid(
                "model.input_width",
                format!(
                    "input shape {}x{} must be non-zero",
                    self.model.input_width, self.model.input_height
                ),
            ));
        }
        if self.capture.fps == 0 {
            return Err(invalid("capture.fps", "must be at least 1".to_string()));
        }
        if self.capture.idle_poll_ms == 0 {
            return Err(invalid(
                "capture.idle_poll_ms",
                "must be at least 1".to_string(),
            ));
        }
        if self.capture.source == CaptureKind::Image && self.capture.image.is_none() {
            return Err(invalid(
                "capture.image",
                "required when capture.source = \"image\"".to_string(),
            ));
        }
        if self.report.enabled && self.report.max_in_flight == 0 {
            return Err(invalid(
                "report.max_in_flight",
                "must be at least 1 when reporting is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/visionloop/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("visionloop")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: String) -> VisionError {
    VisionError::ConfigInvalidValue {
        key: key.to_string(),
        message,
    }
}
