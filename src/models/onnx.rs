//! ONNX Runtime estimator

use super::inference::Estimator;
use crate::error::{RiskError, RiskResult};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DynMapValueType, DynSequenceValueType, DowncastableTarget, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

fn ort_error(e: impl std::fmt::Display) -> RiskError {
    RiskError::model_unavailable(format!("onnx runtime: {e}"))
}

/// ONNX graph taking the encoded row as a `[1, width]` float tensor and
/// producing class probabilities, either as a tensor or as one
/// `map(int64, float)` per row.
pub struct OnnxEstimator {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    classes: Vec<i64>,
}

impl OnnxEstimator {
    pub fn load(path: &Path, classes: &[i64], threads: usize) -> RiskResult<Self> {
        info!(path = %path.display(), threads, "Loading ONNX estimator");

        let session = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error)?
            .with_intra_threads(threads)
            .map_err(ort_error)?
            .commit_from_file(path)
            .map_err(|e| {
                RiskError::model_unavailable(format!("failed to load {}: {e}", path.display()))
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        // skl2onnx exports `output_label` and `output_probability`
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| RiskError::model_unavailable("onnx graph has no outputs"))?;

        info!(input = %input_name, output = %output_name, "ONNX estimator loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            classes: classes.to_vec(),
        })
    }

    fn extract(&self, outputs: &SessionOutputs) -> RiskResult<Vec<f64>> {
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            RiskError::model_unavailable(format!("missing output '{}'", self.output_name))
        })?;

        // Plain tensor, shape [1, n_classes], columns in graph label order.
        // A width that disagrees with the artifact is rejected by the caller.
        if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
            let row: Vec<f64> = data.iter().map(|p| *p as f64).collect();
            debug!(probabilities = ?row, "Extracted from tensor");
            return Ok(row);
        }

        // seq(map(int64, float)), one map per row, keyed by label
        let dtype = output.dtype();
        if DynSequenceValueType::can_downcast(&dtype) {
            let allocator = Allocator::default();
            let sequence = output
                .downcast_ref::<DynSequenceValueType>()
                .map_err(ort_error)?;
            let maps = sequence
                .try_extract_sequence::<DynMapValueType>(&allocator)
                .map_err(ort_error)?;
            let first = maps
                .first()
                .ok_or_else(|| RiskError::model_unavailable("empty probability sequence"))?;
            let pairs = first.try_extract_key_values::<i64, f32>().map_err(ort_error)?;

            let row = self
                .classes
                .iter()
                .map(|class| {
                    pairs
                        .iter()
                        .find(|(k, _)| k == class)
                        .map(|(_, p)| *p as f64)
                        .unwrap_or(0.0)
                })
                .collect::<Vec<_>>();
            debug!(probabilities = ?row, "Extracted from seq(map)");
            return Ok(row);
        }

        Err(RiskError::model_unavailable(format!(
            "unsupported output type for '{}'",
            self.output_name
        )))
    }
}

impl Estimator for OnnxEstimator {
    fn predict_proba(&self, row: &[f32]) -> RiskResult<Vec<f64>> {
        let input = row.to_vec();
        let tensor = Tensor::from_array((vec![1_i64, input.len() as i64], input)).map_err(ort_error)?;

        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(ort_error)?;
        self.extract(&outputs)
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
