//! ONNX classifier backed by tract.

use crate::error::{Result, VisionError};
use crate::model::classifier::{Classifier, InputShape};
use parking_lot::Mutex;
use std::path::Path;
use tract_onnx::prelude::*;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Classification model loaded from a local ONNX file.
pub struct TractClassifier {
    plan: Mutex<Plan>,
    shape: InputShape,
    labels: Vec<String>,
    name: String,
}

impl TractClassifier {
    /// Load and optimize an ONNX model with a fixed `1×3×H×W` input.
    pub fn load(model_path: &Path, labels_path: Option<&Path>, shape: InputShape) -> Result<Self> {
        if !model_path.exists() {
            return Err(VisionError::ModelLoad {
                message: format!("model file not found: {}", model_path.display()),
            });
        }

        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(
                        f32::datum_type(),
                        tvec!(1, 3, shape.height as usize, shape.width as usize),
                    ),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| VisionError::ModelLoad {
                message: format!("{}: {e}", model_path.display()),
            })?;

        let labels = match labels_path {
            Some(path) => read_labels(path)?,
            None => Vec::new(),
        };

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        Ok(Self {
            plan: Mutex::new(plan),
            shape,
            labels,
            name,
        })
    }
}

/// Read one class name per line. Blank lines are skipped.
pub fn read_labels(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| VisionError::ModelLoad {
        message: format!("cannot read labels {}: {e}", path.display()),
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

impl Classifier for TractClassifier {
    fn infer(&self, input: &[f32]) -> Result<Vec<f32>> {
        let tensor = Tensor::from_shape(
            &[1, 3, self.shape.height as usize, self.shape.width as usize],
            input,
        )
        .map_err(|e| VisionError::Inference {
            message: format!("bad input tensor: {e}"),
        })?;

        let outputs = self
            .plan
            .lock()
            .run(tvec!(tensor.into()))
            .map_err(|e| VisionError::Inference {
                message: format!("ONNX inference failed: {e}"),
            })?;

        let output = outputs.first().ok_or_else(|| VisionError::Inference {
            message: "model produced no outputs".to_string(),
        })?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|e| VisionError::Inference {
                message: format!("model output tensor was not f32: {e}"),
            })?;
        Ok(scores.iter().copied().collect())
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
