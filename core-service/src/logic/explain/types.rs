use ndarray::Array2;
use serde::Serialize;

use crate::constants::OTHER_LABEL;

/// Signed shift of the score caused by one feature.
/// Positive pushes toward the event class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub feature_name: String,
    pub value: f64,
}

impl Contribution {
    pub fn new(feature_name: impl Into<String>, value: f64) -> Self {
        Self {
            feature_name: feature_name.into(),
            value,
        }
    }

    pub fn other(value: f64) -> Self {
        Self::new(OTHER_LABEL, value)
    }
}

/// Attributions for one vector: baseline + Σ contributions == raw_score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub baseline: f64,
    pub raw_score: f64,
    /// One per feature, schema order
    pub contributions: Vec<Contribution>,
}

impl Explanation {
    pub fn total(&self) -> f64 {
        self.baseline + self.contributions.iter().map(|c| c.value).sum::<f64>()
    }
}

/// Attributions for a batch, rows in submission order
#[derive(Debug, Clone)]
pub struct BatchExplanation {
    pub baseline: f64,
    pub feature_names: Vec<String>,
    /// (n_samples, n_features)
    pub values: Array2<f64>,
    pub raw_scores: Vec<f64>,
}

impl BatchExplanation {
    pub fn row(&self, index: usize) -> Option<Explanation> {
        if index >= self.values.nrows() {
            return None;
        }
        let raw_score = *self.raw_scores.get(index)?;
        Some(Explanation {
            baseline: self.baseline,
            raw_score,
            contributions: self
                .feature_names
                .iter()
                .zip(self.values.row(index))
                .map(|(name, value)| Contribution::new(name.clone(), *value))
                .collect(),
        })
    }
}

/// Top-K contributors kept individually, the rest folded into "Other"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedExplanation {
    pub baseline: f64,
    /// Most important first
    pub top_contributions: Vec<Contribution>,
    pub other: Contribution,
}

impl AggregatedExplanation {
    /// Top contributors followed by "Other"
    pub fn contributors(&self) -> impl Iterator<Item = &Contribution> {
        self.top_contributions.iter().chain(std::iter::once(&self.other))
    }

    /// baseline + every contributor; equals the model's raw score
    pub fn final_value(&self) -> f64 {
        self.baseline + self.contributors().map(|c| c.value).sum::<f64>()
    }
}
