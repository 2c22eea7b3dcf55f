use crate::defaults;
use crate::error::{Result, VisionError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Fixed input size a model was exported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
}

impl InputShape {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of f32 values in a `1×3×H×W` tensor of this shape.
    pub fn tensor_len(&self) -> usize {
        3 * self.width as usize * self.height as usize
    }
}

impl Default for InputShape {
    fn default() -> Self {
        Self::new(defaults::INPUT_WIDTH, defaults::INPUT_HEIGHT)
    }
}

impl std::fmt::Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Trait for image classification models.
///
/// This trait allows swapping implementations (ONNX runtime vs mock).
pub trait Classifier: Send + Sync {
    /// Run the model on a normalized `1×3×H×W` tensor.
    ///
    /// # Returns
    /// One score per class, in label order
    fn infer(&self, input: &[f32]) -> Result<Vec<f32>>;

    /// Input shape the model expects.
    fn input_shape(&self) -> InputShape;

    /// Class names, indexed like the scores returned by `infer`.
    fn labels(&self) -> &[String];

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;
}

impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    fn infer(&self, input: &[f32]) -> Result<Vec<f32>> {
        (**self).infer(input)
    }

    fn input_shape(&self) -> InputShape {
        (**self).input_shape()
    }

    fn labels(&self) -> &[String] {
        (**self).labels()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock classifier for testing
///
/// Returns fixed scores. Clones share the inference counter, so a test can
/// hand one clone to the pipeline and watch it through another.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    model_name: String,
    labels: Vec<String>,
    scores: Vec<f32>,
    shape: InputShape,
    failure: Option<String>,
    delay: Duration,
    calls: Arc<AtomicU32>,
}

impl MockClassifier {
    /// Create a mock with the given labels and uniform scores.
    pub fn new(labels: &[&str]) -> Self {
        let count = labels.len().max(1);
        Self {
            model_name: "mock-classifier".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            scores: vec![1.0 / count as f32; labels.len()],
            shape: InputShape::default(),
            failure: None,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Configure the scores returned by every inference
    pub fn with_scores(mut self, scores: &[f32]) -> Self {
        self.scores = scores.to_vec();
        self
    }

    /// Configure the expected input shape
    pub fn with_input_shape(mut self, width: u32, height: u32) -> Self {
        self.shape = InputShape::new(width, height);
        self
    }

    /// Configure the mock to fail every inference
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Make every inference take at least this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `infer` calls so far, across all clones.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for MockClassifier {
    fn infer(&self, input: &[f32]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(message) = &self.failure {
            return Err(VisionError::Inference {
                message: message.clone(),
            });
        }
        if input.len() != self.shape.tensor_len() {
            return Err(VisionError::Inference {
                message: format!(
                    "expected {} input values, received {}",
                    self.shape.tensor_len(),
                    input.len()
                ),
            });
        }
        Ok(self.scores.clone())
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape_default_and_len() {
        let shape = InputShape::default();
        assert_eq!(shape, InputShape::new(224, 224));
        assert_eq!(shape.tensor_len(), 3 * 224 * 224);
        assert_eq!(shape.to_string(), "224x224");
    }

    #[test]
    fn test_mock_returns_configured_scores() {
        let model = MockClassifier::new(&["cat", "dog"])
            .with_scores(&[0.9, 0.1])
            .with_input_shape(2, 2);

        let scores = model.infer(&[0.0; 12]).unwrap();
        assert_eq!(scores, vec![0.9, 0.1]);
        assert_eq!(model.labels(), &["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn test_mock_uniform_scores_by_default() {
        let model = MockClassifier::new(&["a", "b", "c", "d"]).with_input_shape(1, 1);
        let scores = model.infer(&[0.0; 3]).unwrap();
        assert_eq!(scores, vec![0.25; 4]);
    }

    #[test]
    fn test_mock_rejects_wrong_input_len() {
        let model = MockClassifier::new(&["a"]).with_input_shape(2, 2);
        assert!(matches!(
            model.infer(&[0.0; 5]),
            Err(VisionError::Inference { .. })
        ));
    }

    #[test]
    fn test_mock_failure() {
        let model = MockClassifier::new(&["a"])
            .with_input_shape(1, 1)
            .with_failure("kernel fault");
        match model.infer(&[0.0; 3]) {
            Err(VisionError::Inference { message }) => assert_eq!(message, "kernel fault"),
            other => panic!("Expected Inference error, got {:?}", other),
        }
    }

    #[test]
    fn test_clones_share_call_counter() {
        let model = MockClassifier::new(&["a"]).with_input_shape(1, 1);
        let shared: Arc<dyn Classifier> = Arc::new(model.clone());

        shared.infer(&[0.0; 3]).unwrap();
        shared.infer(&[0.0; 3]).unwrap();
        assert_eq!(model.calls(), 2);
        assert_eq!(shared.model_name(), "mock-classifier");
    }
}
