//! Logistic regression with exact linear attributions
//!
//! With independent features the Shapley value of feature i is
//! `w_i * (x_i - mean_i)` in log-odds space; the baseline is the margin at the
//! background means.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Deserialize;

use super::inference::{
    check_batch, sigmoid, AttributionOutput, ModelMetadata, OutputShape, Predictor,
};
use crate::logic::error::{RiskError, RiskResult};

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModelDef {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Background (training) means; defaults to zeros
    #[serde(default)]
    pub feature_means: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct LogisticModel {
    metadata: ModelMetadata,
    feature_names: Vec<String>,
    coefficients: Array1<f64>,
    intercept: f64,
    feature_means: Array1<f64>,
}

impl LogisticModel {
    pub fn from_def(def: LogisticModelDef, mut metadata: ModelMetadata) -> Result<Self, String> {
        let n = def.feature_names.len();
        if n == 0 {
            return Err("model declares no features".to_string());
        }
        if def.coefficients.len() != n {
            return Err(format!("{} coefficients for {} features", def.coefficients.len(), n));
        }
        let means = def.feature_means.unwrap_or_else(|| vec![0.0; n]);
        if means.len() != n {
            return Err(format!("{} feature means for {} features", means.len(), n));
        }
        if !def.intercept.is_finite()
            || def.coefficients.iter().chain(&means).any(|v| !v.is_finite())
        {
            return Err("coefficients, intercept and means must be finite".to_string());
        }

        metadata.features = n;

        Ok(Self {
            metadata,
            feature_names: def.feature_names,
            coefficients: Array1::from(def.coefficients),
            intercept: def.intercept,
            feature_means: Array1::from(means),
        })
    }

    fn expected_value(&self) -> f64 {
        self.intercept + self.coefficients.dot(&self.feature_means)
    }
}

impl Predictor for LogisticModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn output_shape(&self) -> OutputShape {
        OutputShape::Single
    }

    fn raw_scores(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>> {
        check_batch(&batch, self.feature_names.len()).map_err(RiskError::SchemaMismatch)?;
        let margins = batch.dot(&self.coefficients) + self.intercept;
        Ok(margins.insert_axis(Axis(1)))
    }

    fn predict_proba(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>> {
        let scores = self.raw_scores(batch)?;
        let mut proba = Array2::zeros((scores.nrows(), 2));
        for (r, margin) in scores.column(0).iter().enumerate() {
            let positive = sigmoid(*margin);
            proba[[r, 0]] = 1.0 - positive;
            proba[[r, 1]] = positive;
        }
        Ok(proba)
    }

    fn attributions(&self, batch: ArrayView2<'_, f64>) -> RiskResult<AttributionOutput> {
        check_batch(&batch, self.feature_names.len()).map_err(RiskError::Attribution)?;
        let centered = &batch - &self.feature_means;
        let values = centered * &self.coefficients;
        Ok(AttributionOutput::Single {
            expected_value: self.expected_value(),
            values,
        })
    }
}
