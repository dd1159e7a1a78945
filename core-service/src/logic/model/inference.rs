//! Inference - Predictor capability and model loading
//!
//! The model artifact is loaded once at process start and shared read-only
//! (`Arc<dyn Predictor>`). It is passed explicitly into the attribution
//! engine; there is no global model state.

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::linear::{LogisticModel, LogisticModelDef};
use super::tree::{TreeEnsemble, TreeEnsembleDef};
use crate::logic::error::{RiskError, RiskResult};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Model metadata
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelMetadata {
    pub model_path: String,
    pub model_type: String,
    /// SHA-256 of the artifact bytes
    pub checksum: String,
    pub features: usize,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

/// How the model reports scores and attributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputShape {
    /// One undifferentiated output, already for the positive class
    Single,
    /// One output per class
    PerClass { classes: usize },
}

impl OutputShape {
    pub fn outputs(&self) -> usize {
        match self {
            OutputShape::Single => 1,
            OutputShape::PerClass { classes } => *classes,
        }
    }
}

/// Additive attributions for a batch, in the model's margin space
#[derive(Debug, Clone)]
pub enum AttributionOutput {
    Single {
        expected_value: f64,
        /// (n_samples, n_features)
        values: Array2<f64>,
    },
    PerClass {
        expected_values: Vec<f64>,
        /// One (n_samples, n_features) matrix per class
        values: Vec<Array2<f64>>,
    },
}

// ============================================================================
// PREDICTOR TRAIT
// ============================================================================

/// Trait for fitted binary classifiers that can explain their scores
pub trait Predictor: Send + Sync {
    fn metadata(&self) -> &ModelMetadata;

    /// Column names in the order the model consumes them
    fn feature_names(&self) -> &[String];

    fn output_shape(&self) -> OutputShape;

    /// Margin scores, shaped (n_samples, outputs)
    fn raw_scores(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>>;

    /// Class probabilities, shaped (n_samples, 2): [no event, event]
    fn predict_proba(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>>;

    /// Per-feature contributions such that expected + Σ values == raw score
    fn attributions(&self, batch: ArrayView2<'_, f64>) -> RiskResult<AttributionOutput>;
}

/// Reject batches whose width disagrees with the model
pub(crate) fn check_batch(batch: &ArrayView2<'_, f64>, features: usize) -> Result<(), String> {
    if batch.ncols() != features {
        return Err(format!(
            "model expects {} features, batch has {}",
            features,
            batch.ncols()
        ));
    }
    Ok(())
}

pub(crate) fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

// ============================================================================
// MODEL ARTIFACT
// ============================================================================

/// On-disk model artifact, tagged by `model_type`
#[derive(Debug, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum ModelFile {
    GradientBoostedTrees(TreeEnsembleDef),
    LogisticRegression(LogisticModelDef),
}

impl ModelFile {
    fn type_name(&self) -> &'static str {
        match self {
            ModelFile::GradientBoostedTrees(_) => "gradient_boosted_trees",
            ModelFile::LogisticRegression(_) => "logistic_regression",
        }
    }
}

/// Load a model artifact from disk
pub fn load_model(model_path: impl AsRef<Path>) -> RiskResult<Arc<dyn Predictor>> {
    let path = model_path.as_ref();
    log::info!("Loading model from: {}", path.display());

    let bytes = std::fs::read(path).map_err(|e| RiskError::ModelLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let model = parse_model(&bytes, &path.display().to_string())?;

    let meta = model.metadata();
    log::info!(
        "Model loaded: {} ({} features, sha256 {})",
        meta.model_type,
        meta.features,
        &meta.checksum[..12]
    );

    Ok(model)
}

/// Parse and validate a model artifact already in memory
pub fn parse_model(bytes: &[u8], source: &str) -> RiskResult<Arc<dyn Predictor>> {
    let load_err = |reason: String| RiskError::ModelLoad {
        path: source.to_string(),
        reason,
    };

    let file: ModelFile = serde_json::from_slice(bytes).map_err(|e| load_err(e.to_string()))?;

    let metadata = ModelMetadata {
        model_path: source.to_string(),
        model_type: file.type_name().to_string(),
        checksum: hex::encode(Sha256::digest(bytes)),
        features: 0,
        loaded_at: chrono::Utc::now(),
    };

    let model: Arc<dyn Predictor> = match file {
        ModelFile::GradientBoostedTrees(def) => {
            Arc::new(TreeEnsemble::from_def(def, metadata).map_err(load_err)?)
        }
        ModelFile::LogisticRegression(def) => {
            Arc::new(LogisticModel::from_def(def, metadata).map_err(load_err)?)
        }
    };

    Ok(model)
}
