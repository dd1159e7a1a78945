//! Error taxonomy for the risk pipeline
//!
//! Every failure reaches the presentation layer as a user-visible message.
//! Nothing here is retried; the user resubmits.

use std::path::PathBuf;

use thiserror::Error;

pub type RiskResult<T> = Result<T, RiskError>;

#[derive(Debug, Error)]
pub enum RiskError {
    /// Collected values disagree with the schema (length, order or layout stamp).
    /// Raised before the predictor is called.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A single form value could not be turned into a feature value
    #[error("Invalid value for '{feature}': {reason}")]
    InvalidInput { feature: String, reason: String },

    /// Model artifact missing, unreadable or structurally invalid
    #[error("Failed to load model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    /// Predictor could not produce attributions for the vector
    #[error("Attribution failed: {0}")]
    Attribution(String),

    /// Plotting failed; no partial image is produced
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Write or decode-verify of the image failed
    #[error("Could not persist explanation image at {}: {reason}", path.display())]
    ImagePersist { path: PathBuf, reason: String },
}

impl RiskError {
    pub fn invalid_input(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::InvalidInput {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub fn image_persist(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RiskError::ImagePersist {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors caused by what the user typed, as opposed to server-side failures
    pub fn is_client_error(&self) -> bool {
        matches!(self, RiskError::SchemaMismatch(_) | RiskError::InvalidInput { .. })
    }

    /// Short machine-readable kind, used in API payloads and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RiskError::SchemaMismatch(_) => "schema_mismatch",
            RiskError::InvalidInput { .. } => "invalid_input",
            RiskError::ModelLoad { .. } => "model_load",
            RiskError::Attribution(_) => "attribution",
            RiskError::Render(_) => "render",
            RiskError::ImagePersist { .. } => "image_persist",
        }
    }
}
