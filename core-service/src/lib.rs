//! MACE Risk Core - 10-year major adverse cardiac event risk with explanations
//!
//! Pipeline per submission:
//!
//! ```text
//! raw form values ─► InputCollector ─► FeatureVector
//!                                         │
//!            Predictor (loaded once) ◄────┤
//!                                         ▼
//!                              AttributionEngine ─► Explanation
//!                                                      │
//!                                    aggregate_top_k ◄─┘
//!                                         │
//!                           render_waterfall ─► ExplanationImage
//!                                                      │
//!                                  ImageStore::publish ◄┘
//! ```

pub mod constants;
pub mod logic;

pub use logic::config::{ImageMode, PipelineConfig};
pub use logic::display::{ImageNaming, ImageStore, PublishedImage};
pub use logic::error::{RiskError, RiskResult};
pub use logic::explain::{
    aggregate_top_k, AggregatedExplanation, AttributionEngine, BatchExplanation, Contribution,
    Explanation,
};
pub use logic::features::{
    CategoricalOption, FeatureKind, FeatureSchema, FeatureSpec, FeatureVector, FormColumn,
    InputCollector,
    LayoutInfo, RawValue, MACE_SCHEMA,
};
pub use logic::model::{load_model, AttributionOutput, ModelMetadata, OutputShape, Predictor};
pub use logic::pipeline::{Assessment, Prediction, PublishedExplanation, RiskPipeline};
pub use logic::render::{render_waterfall, ExplanationImage, RenderConfig, WaterfallLayout};
