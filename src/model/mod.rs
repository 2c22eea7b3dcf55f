//! Classification model: the `Classifier` seam, preprocessing and the runner.

pub mod classifier;
pub mod preprocess;
pub mod runner;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use classifier::{Classifier, InputShape, MockClassifier};
pub use runner::{ModelLoader, ModelRunner, Prediction, loader};
#[cfg(feature = "backend-tract")]
pub use tract::TractClassifier;
