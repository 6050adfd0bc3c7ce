//! Feature record to graph input row.
//!
//! Numeric columns pass through unscaled; the graph standardizes them.
//! Each categorical column expands into a one-hot block over its known
//! categories, and an unknown category encodes as an all-zero block.

use super::artifact::EncodingSpec;
use crate::error::{RiskError, RiskResult};
use crate::feature_extractor::{FeatureRecord, FeatureSchema, FeatureValue};

#[derive(Debug, Clone)]
pub struct RowEncoder {
    categories: Vec<Vec<String>>,
    width: usize,
}

impl RowEncoder {
    pub fn new(spec: &EncodingSpec, schema: &FeatureSchema) -> Self {
        let width =
            schema.numeric.len() + spec.categories.iter().map(Vec::len).sum::<usize>();
        Self {
            categories: spec.categories.clone(),
            width,
        }
    }

    /// Length of an encoded row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Encode a record that already passed schema validation.
    pub fn encode(&self, record: &FeatureRecord) -> RiskResult<Vec<f32>> {
        let mut row = Vec::with_capacity(self.width);
        let mut categorical_idx = 0;

        for (name, value) in record.iter() {
            match value {
                FeatureValue::Numeric(v) => row.push(*v as f32),
                FeatureValue::Categorical(category) => {
                    let known = self.categories.get(categorical_idx).ok_or_else(|| {
                        RiskError::Schema(format!("unexpected categorical field '{name}'"))
                    })?;
                    row.extend(known.iter().map(|k| if k == category { 1.0 } else { 0.0 }));
                    categorical_idx += 1;
                }
            }
        }

        if row.len() != self.width {
            return Err(RiskError::Schema(format!(
                "encoded row has {} columns, expected {}",
                row.len(),
                self.width
            )));
        }
        Ok(row)
    }
}
