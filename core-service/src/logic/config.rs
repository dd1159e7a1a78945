//! Pipeline configuration
//!
//! Defaults live in `constants`; every field can be overridden from the
//! environment. Unparseable values fall back to the default with a warning.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::constants::{
    DEFAULT_DPI, DEFAULT_FIXED_IMAGE_NAME, DEFAULT_HEIGHT_IN, DEFAULT_IMAGE_DIR,
    DEFAULT_IMAGE_TTL_SECS, DEFAULT_MODEL_PATH, DEFAULT_TOP_K, DEFAULT_WIDTH_IN,
};
use crate::logic::display::ImageNaming;
use crate::logic::render::RenderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMode {
    /// Unique file per submission
    PerRequest,
    /// Single shared file, last writer wins
    Fixed,
}

impl ImageMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per_request" | "per-request" => Some(ImageMode::PerRequest),
            "fixed" => Some(ImageMode::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub model_path: PathBuf,
    pub image_dir: PathBuf,
    pub image_mode: ImageMode,
    pub fixed_image_name: String,
    pub render: RenderConfig,
    #[serde(with = "secs")]
    pub image_ttl: Duration,
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            image_mode: ImageMode::PerRequest,
            fixed_image_name: DEFAULT_FIXED_IMAGE_NAME.to_string(),
            render: RenderConfig::default(),
            image_ttl: Duration::from_secs(DEFAULT_IMAGE_TTL_SECS),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let parsed = |key: &str| -> Option<String> {
            lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };

        fn number<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
            match raw {
                None => default,
                Some(value) => value.parse().unwrap_or_else(|_| {
                    log::warn!("Ignoring {}={:?}: not a valid number", key, value);
                    default
                }),
            }
        }

        let image_mode = match parsed("IMAGE_MODE") {
            None => defaults.image_mode,
            Some(value) => ImageMode::parse(&value).unwrap_or_else(|| {
                log::warn!("Ignoring IMAGE_MODE={:?}: expected per_request or fixed", value);
                defaults.image_mode
            }),
        };

        let top_k = match number("EXPLAIN_TOP_K", parsed("EXPLAIN_TOP_K"), defaults.top_k) {
            0 => {
                log::warn!("EXPLAIN_TOP_K must be at least 1, using {}", defaults.top_k);
                defaults.top_k
            }
            k => k,
        };

        // Print resolution floor
        let dpi = match number("IMAGE_DPI", parsed("IMAGE_DPI"), defaults.render.dpi) {
            dpi if dpi < DEFAULT_DPI => {
                log::warn!("IMAGE_DPI must be at least {}, got {}", DEFAULT_DPI, dpi);
                defaults.render.dpi
            }
            dpi => dpi,
        };

        Self {
            model_path: parsed("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            image_dir: parsed("IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.image_dir),
            image_mode,
            fixed_image_name: parsed("IMAGE_FIXED_NAME").unwrap_or(defaults.fixed_image_name),
            render: RenderConfig::new(
                dpi,
                number("IMAGE_WIDTH_IN", parsed("IMAGE_WIDTH_IN"), defaults.render.width_in),
                number("IMAGE_HEIGHT_IN", parsed("IMAGE_HEIGHT_IN"), defaults.render.height_in),
            ),
            image_ttl: Duration::from_secs(number(
                "IMAGE_TTL_SECS",
                parsed("IMAGE_TTL_SECS"),
                defaults.image_ttl.as_secs(),
            )),
            top_k,
        }
    }

    pub fn image_naming(&self) -> ImageNaming {
        match self.image_mode {
            ImageMode::PerRequest => ImageNaming::PerRequest,
            ImageMode::Fixed => ImageNaming::Fixed(self.fixed_image_name.clone()),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
