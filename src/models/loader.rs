//! Model artifact loading and the process-wide model handle

use super::artifact::{EstimatorSpec, ModelArtifact};
use super::encoding::RowEncoder;
use super::inference::{ArtifactClassifier, Classifier, Estimator};
use super::onnx::OnnxEstimator;
use crate::error::{RiskError, RiskResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Loader for model artifacts
#[derive(Debug, Clone)]
pub struct ModelLoader {
    /// Path to the JSON artifact
    artifact_path: PathBuf,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new<P: Into<PathBuf>>(artifact_path: P) -> Self {
        Self::with_threads(artifact_path, 1)
    }

    pub fn with_threads<P: Into<PathBuf>>(artifact_path: P, onnx_threads: usize) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            onnx_threads: onnx_threads.max(1),
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Read, validate and assemble the classifier. Any failure leaves no
    /// partially built model behind.
    pub fn load(&self) -> RiskResult<ArtifactClassifier> {
        let path = &self.artifact_path;
        info!(path = %path.display(), "Loading risk model artifact");

        let json = std::fs::read_to_string(path).map_err(|e| {
            RiskError::model_unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        self.load_from_str(&json, base_dir)
    }

    /// Assemble a classifier from artifact JSON. A relative graph path
    /// resolves against `base_dir`.
    pub fn load_from_str(&self, json: &str, base_dir: &Path) -> RiskResult<ArtifactClassifier> {
        let artifact = ModelArtifact::from_json(json)?;
        artifact.validate()?;

        let encoder = RowEncoder::new(&artifact.encoding, &artifact.schema);
        let estimator = self.build_estimator(&artifact, base_dir)?;

        info!(
            model_version = %artifact.model_version,
            estimator = estimator.name(),
            classes = ?artifact.classes,
            width = encoder.width(),
            "Model loaded successfully"
        );

        Ok(ArtifactClassifier::new(
            artifact.model_version,
            artifact.classes,
            artifact.schema,
            encoder,
            estimator,
        ))
    }

    fn build_estimator(
        &self,
        artifact: &ModelArtifact,
        base_dir: &Path,
    ) -> RiskResult<Box<dyn Estimator>> {
        match &artifact.estimator {
            EstimatorSpec::Onnx { path } => Ok(Box::new(OnnxEstimator::load(
                &base_dir.join(path),
                &artifact.classes,
                self.onnx_threads,
            )?)),
        }
    }
}

/// Shared slot holding the active classifier.
///
/// Readers clone the inner `Arc` and release the lock before inference, so a
/// reload never blocks or tears an in-flight assessment.
#[derive(Default)]
pub struct ModelHandle {
    current: RwLock<Option<Arc<dyn Classifier>>>,
}

impl ModelHandle {
    /// Handle with no model installed; assessments fail until one is.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            current: RwLock::new(Some(classifier)),
        }
    }

    /// The installed classifier, or `ModelUnavailable`.
    pub fn current(&self) -> RiskResult<Arc<dyn Classifier>> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| RiskError::model_unavailable("no risk model loaded"))
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn version(&self) -> Option<String> {
        self.current().ok().map(|c| c.version().to_string())
    }

    /// Swap in a new classifier, returning the previous one.
    pub fn install(&self, classifier: Arc<dyn Classifier>) -> Option<Arc<dyn Classifier>> {
        let mut slot = self.current.write().unwrap_or_else(|p| p.into_inner());
        slot.replace(classifier)
    }

    /// Load outside the lock, then swap. On failure the previous model stays
    /// active and the error is returned.
    pub fn reload(&self, loader: &ModelLoader) -> RiskResult<String> {
        match loader.load() {
            Ok(classifier) => {
                let version = classifier.version().to_string();
                let previous = self.install(Arc::new(classifier));
                info!(
                    model_version = %version,
                    previous = ?previous.as_ref().map(|p| p.version().to_string()),
                    "Risk model installed"
                );
                Ok(version)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    active = ?self.version(),
                    "Model reload failed, keeping active model"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::{FeatureRecord, NUMERIC_FEATURES};
    use std::io::Write;

    fn demo_artifact() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("models/risk_model.json")
    }

    fn demo_graph() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("models/risk_model.onnx")
    }

    /// Demo artifact under a new version, pointing at the shipped graph.
    fn artifact_body(version: &str) -> String {
        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(demo_artifact()).unwrap()).unwrap();
        value["model_version"] = version.into();
        value["estimator"]["path"] = demo_graph().to_string_lossy().into_owned().into();
        value.to_string()
    }

    fn write_artifact(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("risk_model.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn record(values: [f64; 6]) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        for (name, v) in NUMERIC_FEATURES.iter().zip(values) {
            record.push_numeric(name, v);
        }
        record.push_categorical("client_type", "client");
        record
    }

    #[test]
    fn test_load_shipped_artifact() {
        let classifier = ModelLoader::new(demo_artifact()).load().unwrap();

        assert_eq!(classifier.version(), "demo-forest-1");
        assert_eq!(classifier.estimator_name(), "onnx");
        let punctual = classifier
            .classify(&record([200.0, 0.0, 0.0, 1.0, 200.0, 0.0]))
            .unwrap();
        assert_eq!(punctual.label, 2);
        let chased = classifier
            .classify(&record([600.0, 9.0, 0.0, 3.0, 600.0, 0.0]))
            .unwrap();
        assert_eq!(chased.label, 0);
    }

    #[test]
    fn test_relative_graph_path_resolves_against_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::copy(demo_graph(), dir.path().join("copied.onnx")).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&artifact_body("copy-1")).unwrap();
        value["estimator"]["path"] = "copied.onnx".into();
        let path = write_artifact(dir.path(), &value.to_string());

        assert_eq!(ModelLoader::new(&path).load().unwrap().version(), "copy-1");
    }

    #[test]
    fn test_missing_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelLoader::new(dir.path().join("absent.json"))
            .load()
            .err()
            .unwrap();
        assert!(matches!(err, RiskError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_truncated_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let body = artifact_body("demo-2");
        let path = write_artifact(dir.path(), &body[..body.len() / 2]);

        let err = ModelLoader::new(&path).load().err().unwrap();
        assert!(matches!(err, RiskError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_missing_graph_is_unavailable() {
        let mut value: serde_json::Value = serde_json::from_str(&artifact_body("demo-2")).unwrap();
        value["estimator"]["path"] = "absent.onnx".into();

        let dir = tempfile::tempdir().unwrap();
        let err = ModelLoader::new("unused.json")
            .load_from_str(&value.to_string(), dir.path())
            .err()
            .unwrap();
        assert!(matches!(err, RiskError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_empty_handle_is_unavailable() {
        let handle = ModelHandle::empty();
        assert!(!handle.is_loaded());
        assert!(matches!(
            handle.current().err().unwrap(),
            RiskError::ModelUnavailable { .. }
        ));
    }

    #[test]
    fn test_failed_reload_keeps_active_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &artifact_body("demo-2"));
        let loader = ModelLoader::new(&path);
        let handle = ModelHandle::empty();

        assert_eq!(handle.reload(&loader).unwrap(), "demo-2");

        write_artifact(dir.path(), "{ corrupt");
        assert!(handle.reload(&loader).is_err());
        assert_eq!(handle.version().as_deref(), Some("demo-2"));

        write_artifact(dir.path(), &artifact_body("demo-3"));
        assert_eq!(handle.reload(&loader).unwrap(), "demo-3");
        assert_eq!(handle.version().as_deref(), Some("demo-3"));
    }

    #[test]
    fn test_held_classifier_survives_swap() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &artifact_body("demo-2"));
        let loader = ModelLoader::new(&path);
        let handle = ModelHandle::empty();
        handle.reload(&loader).unwrap();

        let held = handle.current().unwrap();
        write_artifact(dir.path(), &artifact_body("demo-3"));
        handle.reload(&loader).unwrap();

        assert_eq!(held.version(), "demo-2");
        assert_eq!(handle.current().unwrap().version(), "demo-3");
        assert!(held.classify(&record([0.0; 6])).is_ok());
    }
}
