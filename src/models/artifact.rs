//! Model artifact metadata.
//!
//! A JSON document sits beside the exported ONNX graph and records what the
//! graph was trained on: the class labels, the feature schema and the
//! categories known to the one-hot encoding. Numeric scaling lives inside
//! the graph.

use crate::error::{RiskError, RiskResult};
use crate::feature_extractor::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model_version: String,
    /// Class labels the probabilities are reported for
    pub classes: Vec<i64>,
    pub schema: FeatureSchema,
    pub encoding: EncodingSpec,
    pub estimator: EstimatorSpec,
}

/// Known categories per categorical column, in graph input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingSpec {
    pub categories: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorSpec {
    /// Exported graph; `path` is relative to the artifact file
    Onnx { path: PathBuf },
}

impl ModelArtifact {
    /// Parse an artifact document. Malformed JSON means a corrupt artifact.
    pub fn from_json(json: &str) -> RiskResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| RiskError::model_unavailable(format!("corrupt model artifact: {e}")))
    }

    pub fn validate(&self) -> RiskResult<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(RiskError::model_unavailable(format!(
                "unsupported artifact format version {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }

        self.schema.ensure_canonical()?;

        if self.classes.is_empty() {
            return Err(RiskError::model_unavailable("artifact declares no classes"));
        }
        let unique: HashSet<i64> = self.classes.iter().copied().collect();
        if unique.len() != self.classes.len() {
            return Err(RiskError::model_unavailable(format!(
                "duplicate class labels {:?}",
                self.classes
            )));
        }

        if self.encoding.categories.len() != self.schema.categorical.len() {
            return Err(RiskError::model_unavailable(format!(
                "encoding lists {} categorical columns, schema has {}",
                self.encoding.categories.len(),
                self.schema.categorical.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact_json(schema_numeric: Vec<&str>) -> String {
        json!({
            "format_version": 1,
            "model_version": "test-1",
            "classes": [0, 1, 2],
            "schema": { "numeric": schema_numeric, "categorical": ["client_type"] },
            "encoding": { "categories": [["client"]] },
            "estimator": { "kind": "onnx", "path": "model.onnx" }
        })
        .to_string()
    }

    #[test]
    fn test_parse_and_validate() {
        let artifact = ModelArtifact::from_json(&artifact_json(
            crate::feature_extractor::NUMERIC_FEATURES.to_vec(),
        ))
        .unwrap();

        assert!(artifact.validate().is_ok());
        let EstimatorSpec::Onnx { path } = &artifact.estimator;
        assert_eq!(path, &PathBuf::from("model.onnx"));
    }

    #[test]
    fn test_corrupt_json_is_unavailable() {
        let err = ModelArtifact::from_json("{ not json").unwrap_err();
        assert!(matches!(err, RiskError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_unknown_estimator_kind_is_unavailable() {
        let mut value: serde_json::Value =
            serde_json::from_str(&artifact_json(crate::feature_extractor::NUMERIC_FEATURES.to_vec()))
                .unwrap();
        value["estimator"] = json!({ "kind": "random_forest", "trees": [] });

        let err = ModelArtifact::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, RiskError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_encoding_must_cover_categorical_columns() {
        let mut artifact = ModelArtifact::from_json(&artifact_json(
            crate::feature_extractor::NUMERIC_FEATURES.to_vec(),
        ))
        .unwrap();
        artifact.encoding.categories.clear();

        assert!(matches!(
            artifact.validate(),
            Err(RiskError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn test_schema_drift_is_schema_error() {
        let artifact = ModelArtifact::from_json(&artifact_json(vec![
            "montant_total",
            "nb_relances",
            "delai_paiement",
            "nb_commandes_client",
            "total_achats_client",
            "moyenne_retard_client",
        ]))
        .unwrap();

        assert!(matches!(artifact.validate(), Err(RiskError::Schema(_))));
    }
}
