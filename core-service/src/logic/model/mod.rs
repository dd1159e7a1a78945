//! Model Module - Predictor capability
//!
//! Tách logic inference khỏi pipeline giải thích.
//! The attribution engine only sees `dyn Predictor`; new model formats plug in here.

pub mod inference;
pub mod linear;
pub mod tree;


// Re-export common types
pub use inference::{load_model, parse_model, AttributionOutput, ModelMetadata, OutputShape, Predictor};
pub use linear::LogisticModel;
pub use tree::TreeEnsemble;
