//! Classifier inference contract.

use super::encoding::RowEncoder;
use crate::error::{RiskError, RiskResult};
use crate::feature_extractor::{FeatureRecord, FeatureSchema};
use tracing::debug;

/// Result of model inference
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class label
    pub label: i64,
    /// Per-class probabilities, in the artifact's class order
    pub probabilities: Option<Vec<f64>>,
}

impl Prediction {
    /// Pick the most probable class; ties go to the lowest index.
    pub fn from_probabilities(classes: &[i64], probabilities: Vec<f64>) -> RiskResult<Self> {
        if probabilities.len() != classes.len() {
            return Err(RiskError::model_unavailable(format!(
                "estimator returned {} probabilities for {} classes",
                probabilities.len(),
                classes.len()
            )));
        }
        let best = argmax(&probabilities)
            .ok_or_else(|| RiskError::model_unavailable("estimator returned no usable probability"))?;

        Ok(Self {
            label: classes[best],
            probabilities: Some(probabilities),
        })
    }

    /// Probability of the predicted class, if probabilities are exposed.
    pub fn confidence(&self) -> Option<f64> {
        let probabilities = self.probabilities.as_ref()?;
        argmax(probabilities).map(|i| probabilities[i])
    }
}

/// Index of the largest finite value, lowest index on ties.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, current)) if v <= current => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// A loaded, immutable risk classifier.
pub trait Classifier: Send + Sync {
    fn classify(&self, record: &FeatureRecord) -> RiskResult<Prediction>;

    /// Version string of the underlying artifact
    fn version(&self) -> &str;
}

/// Fitted estimator over an encoded row.
pub trait Estimator: Send + Sync {
    /// One probability per class, in artifact class order.
    fn predict_proba(&self, row: &[f32]) -> RiskResult<Vec<f64>>;

    fn name(&self) -> &'static str;
}

/// Classifier assembled from a model artifact: schema check, row encoding,
/// estimator, arg-max.
pub struct ArtifactClassifier {
    version: String,
    classes: Vec<i64>,
    schema: FeatureSchema,
    encoder: RowEncoder,
    estimator: Box<dyn Estimator>,
}

impl ArtifactClassifier {
    pub fn new(
        version: String,
        classes: Vec<i64>,
        schema: FeatureSchema,
        encoder: RowEncoder,
        estimator: Box<dyn Estimator>,
    ) -> Self {
        Self {
            version,
            classes,
            schema,
            encoder,
            estimator,
        }
    }

    pub fn estimator_name(&self) -> &'static str {
        self.estimator.name()
    }
}

impl Classifier for ArtifactClassifier {
    fn classify(&self, record: &FeatureRecord) -> RiskResult<Prediction> {
        self.schema.validate(record)?;

        let row = self.encoder.encode(record)?;
        let probabilities = self.estimator.predict_proba(&row)?;
        let prediction = Prediction::from_probabilities(&self.classes, probabilities)?;

        debug!(
            model_version = %self.version,
            estimator = self.estimator.name(),
            label = prediction.label,
            probabilities = ?prediction.probabilities,
            "Inference complete"
        );

        Ok(prediction)
    }

    fn version(&self) -> &str {
        &self.version
    }
}
