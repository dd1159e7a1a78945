//! Feature Vector - Core data structure for model input
//!
//! **Versioned feature vector with layout validation**
//!
//! Built once per submission, immutable afterwards. Carries the version and
//! layout hash of the schema it was built against so a stale or foreign
//! vector is rejected before it reaches the predictor.

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use super::layout::FeatureSchema;
use crate::logic::error::{RiskError, RiskResult};

// ============================================================================
// VERSIONED FEATURE VECTOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Feature layout version
    version: u8,
    /// CRC32 hash of the feature layout (for mismatch detection)
    layout_hash: u32,
    /// Feature values in schema order
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build from values already in schema order
    pub fn from_values(schema: &FeatureSchema, values: Vec<f64>) -> RiskResult<Self> {
        if values.len() != schema.len() {
            return Err(RiskError::SchemaMismatch(format!(
                "expected {} values, got {}",
                schema.len(),
                values.len()
            )));
        }

        Ok(Self {
            version: schema.version,
            layout_hash: schema.layout_hash(),
            values,
        })
    }

    /// Vector holding every feature's default value
    pub fn defaults(schema: &FeatureSchema) -> Self {
        Self {
            version: schema.version,
            layout_hash: schema.layout_hash(),
            values: schema.specs.iter().map(|s| s.default_value()).collect(),
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn layout_hash(&self) -> u32 {
        self.layout_hash
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get values as slice
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(self.values.as_slice())
    }

    /// Get feature by index
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Get feature by name
    pub fn get_by_name(&self, schema: &FeatureSchema, name: &str) -> Option<f64> {
        schema.feature_index(name).and_then(|i| self.get(i))
    }

    /// Validate that this vector was built against `schema`
    pub fn validate(&self, schema: &FeatureSchema) -> RiskResult<()> {
        schema.validate_stamp(self.version, self.layout_hash)?;
        if self.values.len() != schema.len() {
            return Err(RiskError::SchemaMismatch(format!(
                "vector has {} values, schema has {}",
                self.values.len(),
                schema.len()
            )));
        }
        Ok(())
    }

    /// Batch of one, shaped (1, n_features)
    pub fn to_batch(&self) -> Array2<f64> {
        self.view().insert_axis(ndarray::Axis(0)).to_owned()
    }

    /// Convert to JSON-serializable format for logging
    pub fn to_log_entry(&self, schema: &FeatureSchema) -> serde_json::Value {
        serde_json::json!({
            "feature_version": self.version,
            "layout_hash": self.layout_hash,
            "named_values": schema.names()
                .zip(self.values.iter())
                .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
                .collect::<serde_json::Map<_, _>>(),
        })
    }
}

/// Stack vectors into an (n, n_features) batch; all must share one schema
pub fn stack_batch(schema: &FeatureSchema, vectors: &[FeatureVector]) -> RiskResult<Array2<f64>> {
    let mut data = Vec::with_capacity(vectors.len() * schema.len());
    for vector in vectors {
        vector.validate(schema)?;
        data.extend_from_slice(vector.as_slice());
    }

    Array2::from_shape_vec((vectors.len(), schema.len()), data)
        .map_err(|e| RiskError::SchemaMismatch(format!("batch shape error: {}", e)))
}
