//! Central Configuration Constants
//!
//! Single source of truth for pipeline defaults.
//! Runtime overrides come from `logic::config::PipelineConfig::from_env`.

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "MACE Risk";

/// Number of contributors kept individually in an explanation
pub const DEFAULT_TOP_K: usize = 5;

/// Label of the synthetic contributor that bundles everything outside the top-K
pub const OTHER_LABEL: &str = "Other";

/// Index of the "event occurs" class for per-class model outputs
pub const POSITIVE_CLASS: usize = 1;

/// Absolute tolerance for baseline + contributions == raw score
pub const ADDITIVITY_TOLERANCE: f64 = 1e-6;

// ============================================
// Rendering defaults
// ============================================

/// Raster resolution of the explanation image
pub const DEFAULT_DPI: u32 = 1200;

/// Figure width in inches
pub const DEFAULT_WIDTH_IN: f64 = 4.0;

/// Figure height in inches
pub const DEFAULT_HEIGHT_IN: f64 = 1.5;

/// Largest accepted edge of the rendered image, in pixels
pub const MAX_IMAGE_EDGE_PX: u32 = 20_000;

// ============================================
// Display bridge defaults
// ============================================

/// Default model artifact, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "core-service/models/mace_xgb.json";

/// Default directory for rendered explanation images
pub const DEFAULT_IMAGE_DIR: &str = "explanations";

/// File name used when images are written to one shared path
pub const DEFAULT_FIXED_IMAGE_NAME: &str = "shap_force_plot_class_1_selected";

/// Age after which per-request images are swept (seconds)
pub const DEFAULT_IMAGE_TTL_SECS: u64 = 15 * 60;
