//! Logic Module - Pipeline stages
//!
//! - `features/` - schema, feature vector, input collector
//! - `model/` - predictor capability and bundled model formats
//! - `explain/` - attribution engine and top-K aggregation
//! - `render/` - waterfall plot rasterizer
//! - `display/` - image persistence with decode verification

pub mod config;
pub mod error;
pub mod pipeline;

pub mod display;
pub mod explain;
pub mod features;
pub mod model;
pub mod render;
