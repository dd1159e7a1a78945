//! Render Module - Waterfall image of an aggregated explanation
//!
//! The image stands on its own: every contributor is labelled with its name
//! and signed value, and the baseline and final values are printed at their
//! markers. Text uses a font embedded in the binary, so the same explanation
//! always rasterizes to the same bytes.

pub mod waterfall;

use serde::Serialize;

use crate::constants::{DEFAULT_DPI, DEFAULT_HEIGHT_IN, DEFAULT_WIDTH_IN, MAX_IMAGE_EDGE_PX};
use crate::logic::error::{RiskError, RiskResult};

pub use waterfall::{render_waterfall, Direction, Segment, WaterfallLayout};

/// Physical size and resolution of the rendered figure
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderConfig {
    pub dpi: u32,
    pub width_in: f64,
    pub height_in: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            width_in: DEFAULT_WIDTH_IN,
            height_in: DEFAULT_HEIGHT_IN,
        }
    }
}

impl RenderConfig {
    pub fn new(dpi: u32, width_in: f64, height_in: f64) -> Self {
        Self {
            dpi,
            width_in,
            height_in,
        }
    }

    /// Pixel dimensions, rejecting empty or oversized figures
    pub fn pixel_size(&self) -> RiskResult<(u32, u32)> {
        let edge = |inches: f64, what: &str| -> RiskResult<u32> {
            let px = (inches * self.dpi as f64).round();
            if !px.is_finite() || px < 1.0 || px > MAX_IMAGE_EDGE_PX as f64 {
                return Err(RiskError::Render(format!(
                    "{} of {} in at {} dpi gives {} px (allowed 1..={})",
                    what, inches, self.dpi, px, MAX_IMAGE_EDGE_PX
                )));
            }
            Ok(px as u32)
        };
        Ok((edge(self.width_in, "width")?, edge(self.height_in, "height")?))
    }

    /// pHYs density in pixels per metre
    pub fn pixels_per_metre(&self) -> u32 {
        (self.dpi as f64 / 0.0254).round() as u32
    }
}

/// Encoded PNG plus the facts needed to verify it after a round trip
#[derive(Debug, Clone)]
pub struct ExplanationImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}
