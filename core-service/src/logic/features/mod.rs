//! Features Module - Schema, Feature Vector, Input Collection
//!
//! The schema is process-wide and read-only; vectors are built per submission.

pub mod collector;
pub mod layout;
pub mod vector;


// Re-export common types
pub use collector::{InputCollector, RawValue};
pub use layout::{
    CategoricalOption, FeatureKind, FeatureSchema, FeatureSpec, FormColumn, LayoutInfo,
    FEATURE_COUNT, FEATURE_VERSION, MACE_FEATURES, MACE_SCHEMA,
};
pub use vector::{stack_batch, FeatureVector};
