//! Risk classifier: artifact metadata, row encoding, ONNX inference and loading

pub mod artifact;
pub mod encoding;
pub mod inference;
pub mod loader;
pub mod onnx;

pub use artifact::ModelArtifact;
pub use inference::{ArtifactClassifier, Classifier, Estimator, Prediction};
pub use loader::{ModelHandle, ModelLoader};
