//! Model ownership, one-time loading and per-frame evaluation.

use crate::capture::Frame;
use crate::defaults;
use crate::error::{Result, VisionError};
use crate::model::classifier::{Classifier, InputShape};
use crate::model::preprocess;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Deferred model construction, run once on the blocking pool.
pub type ModelLoader = Box<dyn FnOnce() -> Result<Arc<dyn Classifier>> + Send>;

/// Wrap a loading closure as a [`ModelLoader`].
pub fn loader<F>(f: F) -> ModelLoader
where
    F: FnOnce() -> Result<Arc<dyn Classifier>> + Send + 'static,
{
    Box::new(f)
}

/// Result of evaluating one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Winning class name, or [`defaults::NO_PREDICTION_LABEL`].
    pub label: String,
    /// Score of the top class.
    pub probability: f32,
    /// Threshold the score was compared against.
    pub threshold: f32,
    /// Wall-clock time spent in the model.
    pub duration: Duration,
    /// Index of the top class, `None` when no score was usable.
    pub class_index: Option<usize>,
}

impl Prediction {
    pub fn is_no_prediction(&self) -> bool {
        self.label == defaults::NO_PREDICTION_LABEL
    }

    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }

    /// Probability as a percentage rounded to one decimal place.
    pub fn percent(&self) -> f64 {
        (f64::from(self.probability) * 1000.0).round() / 10.0
    }

    /// Human-readable line for the presentation sink.
    pub fn status_text(&self) -> String {
        format!(
            "Prediction: {}, Probability: {}% Inference time: {} ms",
            self.label,
            self.percent(),
            self.duration_ms()
        )
    }
}

/// Owns the loaded model and turns frames into predictions.
pub struct ModelRunner {
    model: OnceLock<Arc<dyn Classifier>>,
    threshold: f32,
    apply_softmax: bool,
}

impl ModelRunner {
    pub fn new(threshold: f32) -> Self {
        Self {
            model: OnceLock::new(),
            threshold,
            apply_softmax: false,
        }
    }

    /// Normalize raw model output with softmax before thresholding.
    pub fn with_softmax(mut self, enabled: bool) -> Self {
        self.apply_softmax = enabled;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Input shape of the loaded model.
    pub fn input_shape(&self) -> Option<InputShape> {
        self.model.get().map(|m| m.input_shape())
    }

    pub fn model_name(&self) -> Option<String> {
        self.model.get().map(|m| m.model_name().to_string())
    }

    /// Load the model. May only succeed once per runner.
    pub async fn load_model(&self, loader: ModelLoader) -> Result<()> {
        if self.is_loaded() {
            return Err(already_loaded());
        }

        let started = Instant::now();
        let model = tokio::task::spawn_blocking(loader)
            .await
            .map_err(|e| VisionError::ModelLoad {
                message: format!("loader task failed: {e}"),
            })??;

        let name = model.model_name().to_string();
        let shape = model.input_shape();
        let classes = model.labels().len();
        self.model.set(model).map_err(|_| already_loaded())?;

        tracing::info!(
            "loaded model '{}' ({}, {} classes) in {:?}",
            name,
            shape,
            classes,
            started.elapsed()
        );
        Ok(())
    }

    /// Classify one frame.
    pub fn evaluate(&self, frame: &Frame) -> Result<Prediction> {
        let model = self.model.get().ok_or_else(|| VisionError::Inference {
            message: "model is not loaded".to_string(),
        })?;

        let input = preprocess::frame_to_tensor(frame, model.input_shape())?;

        let started = Instant::now();
        let mut scores = model.infer(&input)?;
        let duration = started.elapsed();

        if scores.is_empty() {
            return Err(VisionError::Inference {
                message: "model produced no scores".to_string(),
            });
        }
        if self.apply_softmax {
            preprocess::softmax(&mut scores);
        }

        let prediction = select(&scores, model.labels(), self.threshold, duration);
        tracing::debug!(
            "frame {}: {} ({:.3}) in {:?}",
            frame.sequence,
            prediction.label,
            prediction.probability,
            duration
        );
        Ok(prediction)
    }
}

fn already_loaded() -> VisionError {
    VisionError::ModelLoad {
        message: "model is already loaded".to_string(),
    }
}

/// Pick the top class. NaN scores never win.
fn select(scores: &[f32], labels: &[String], threshold: f32, duration: Duration) -> Prediction {
    let best = scores
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .fold(None::<(usize, f32)>, |best, (i, &p)| match best {
            Some((_, top)) if top >= p => best,
            _ => Some((i, p)),
        });

    match best {
        Some((index, probability)) if probability > threshold => Prediction {
            label: labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| index.to_string()),
            probability,
            threshold,
            duration,
            class_index: Some(index),
        },
        Some((index, probability)) => Prediction {
            label: defaults::NO_PREDICTION_LABEL.to_string(),
            probability,
            threshold,
            duration,
            class_index: Some(index),
        },
        None => Prediction {
            label: defaults::NO_PREDICTION_LABEL.to_string(),
            probability: 0.0,
            threshold,
            duration,
            class_index: None,
        },
    }
}
