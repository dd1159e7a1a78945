//! Explain Module - Additive attributions and top-K aggregation

pub mod aggregate;
pub mod engine;
pub mod types;

pub use aggregate::{aggregate_batch, aggregate_top_k, rank_by_mean_abs};
pub use engine::AttributionEngine;
pub use types::{AggregatedExplanation, BatchExplanation, Contribution, Explanation};
