//! Waterfall layout and rasterization
//!
//! One horizontal bar per contributor, top to bottom in aggregation order.
//! Each bar spans the running total before and after that contributor, so the
//! last bar ends at the model's raw score.
//!
//! The left column carries each contributor's name and signed value. The
//! baseline value sits above its marker and the final value below its marker.

use std::sync::OnceLock;

use plotters::prelude::{BitMapBackend, Color, IntoDrawingArea, RGBColor, Rectangle, WHITE};
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{register_font, FontDesc, FontFamily, FontStyle, TextStyle};
use serde::Serialize;

use super::{ExplanationImage, RenderConfig};
use crate::logic::error::{RiskError, RiskResult};
use crate::logic::explain::AggregatedExplanation;

/// Pushes risk up
const RISK_UP: RGBColor = RGBColor(255, 0, 81);
/// Pushes risk down
const RISK_DOWN: RGBColor = RGBColor(0, 139, 251);
const NEUTRAL: RGBColor = RGBColor(170, 170, 170);
const BASELINE_MARK: RGBColor = RGBColor(110, 110, 110);
const FINAL_MARK: RGBColor = RGBColor(0, 0, 0);
const TEXT: RGBColor = RGBColor(34, 34, 34);

/// Fraction of the value span added on each side
const RANGE_PAD: f64 = 0.05;

/// Share of the inner width given to the label column
const LABEL_SHARE: f64 = 0.35;
/// Glyph height relative to a row band
const TEXT_SCALE: f64 = 0.6;

/// Embedded so output does not depend on the host's fonts
const FONT_FAMILY: &str = "DejaVu Sans";
static FONT_BYTES: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub direction: Direction,
}

impl Segment {
    pub fn value(&self) -> f64 {
        self.end - self.start
    }
}

/// Geometry of the plot in value space, independent of pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallLayout {
    pub baseline: f64,
    pub final_value: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub segments: Vec<Segment>,
}

impl WaterfallLayout {
    pub fn from_aggregated(explanation: &AggregatedExplanation) -> RiskResult<Self> {
        if !explanation.baseline.is_finite() {
            return Err(RiskError::Render(format!(
                "baseline is not finite ({})",
                explanation.baseline
            )));
        }

        let mut running = explanation.baseline;
        let mut segments = Vec::new();
        for contribution in explanation.contributors() {
            if !contribution.value.is_finite() {
                return Err(RiskError::Render(format!(
                    "contribution of '{}' is not finite",
                    contribution.feature_name
                )));
            }
            let start = running;
            running += contribution.value;
            let direction = if contribution.value > 0.0 {
                Direction::Up
            } else if contribution.value < 0.0 {
                Direction::Down
            } else {
                Direction::Flat
            };
            segments.push(Segment {
                label: contribution.feature_name.clone(),
                start,
                end: running,
                direction,
            });
        }

        if segments.is_empty() {
            return Err(RiskError::Render("no contributors to draw".to_string()));
        }

        let (lo, hi) = segments
            .iter()
            .flat_map(|s| [s.start, s.end])
            .fold((explanation.baseline, explanation.baseline), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        let (x_min, x_max) = if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            let center = (lo + hi) / 2.0;
            (center - 1.0, center + 1.0)
        } else {
            let pad = (hi - lo) * RANGE_PAD;
            (lo - pad, hi + pad)
        };

        Ok(Self {
            baseline: explanation.baseline,
            final_value: running,
            x_min,
            x_max,
            segments,
        })
    }

    /// Map a value onto the pixel span [left, right]
    pub fn to_pixel(&self, value: f64, left: i32, right: i32) -> i32 {
        let t = (value - self.x_min) / (self.x_max - self.x_min);
        left + (t * (right - left) as f64).round() as i32
    }
}

fn render_err(e: impl std::fmt::Display) -> RiskError {
    RiskError::Render(e.to_string())
}

/// Render an aggregated explanation to PNG bytes
pub fn render_waterfall(
    explanation: &AggregatedExplanation,
    config: &RenderConfig,
) -> RiskResult<ExplanationImage> {
    let layout = WaterfallLayout::from_aggregated(explanation)?;
    let (width, height) = config.pixel_size()?;

    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    draw(&layout, &mut buffer, width, height)?;

    let png = encode_png(&buffer, width, height, config)?;
    log::debug!(
        "Rendered waterfall: {} segments, {}x{} px, {} bytes",
        layout.segments.len(),
        width,
        height,
        png.len()
    );

    Ok(ExplanationImage {
        png,
        width,
        height,
        dpi: config.dpi,
    })
}

/// Register the embedded font with plotters once per process
fn ensure_font() -> RiskResult<()> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).map_err(|_| "invalid font data".to_string())
        })
        .clone()
        .map_err(|e| RiskError::Render(format!("cannot load font '{}': {}", FONT_FAMILY, e)))
}

fn text_style(px: f64, h_pos: HPos) -> TextStyle<'static> {
    FontDesc::new(FontFamily::Name(FONT_FAMILY), px, FontStyle::Normal)
        .color(&TEXT)
        .pos(Pos::new(h_pos, VPos::Center))
}

fn segment_label(segment: &Segment) -> String {
    format!("{} {:+.3}", segment.label, segment.value())
}

/// Pixel frame: a header band, one band per row, a footer band
#[derive(Debug, Clone, Copy)]
struct Frame {
    left: i32,
    right: i32,
    /// Right edge of the label column
    label_right: i32,
    /// Left edge of the bar area
    bar_left: i32,
    top: i32,
    band: f64,
    margin: i32,
    line: i32,
}

impl Frame {
    fn new(width: u32, height: u32, rows: usize) -> Self {
        let w = width as i32;
        let h = height as i32;
        let margin = (h / 20).max(1);
        let (left, right) = (margin, (w - margin).max(margin + 2));
        let (top, bottom) = (margin, (h - margin).max(margin + 1));

        let label_right = left + ((right - left) as f64 * LABEL_SHARE).round() as i32;
        let bar_left = (label_right + margin).min(right - 1);

        Self {
            left,
            right,
            label_right,
            bar_left,
            top,
            band: (bottom - top) as f64 / (rows + 2) as f64,
            margin,
            line: (h / 150).max(1),
        }
    }

    /// Vertical extent of band `k`; 0 is the header, `rows + 1` the footer
    fn band(&self, k: usize) -> (i32, i32) {
        let y0 = self.top + (k as f64 * self.band).round() as i32;
        let y1 = self.top + ((k + 1) as f64 * self.band).round() as i32;
        (y0, y1.max(y0 + 1))
    }

    fn row(&self, i: usize) -> (i32, i32) {
        self.band(i + 1)
    }

    fn center(&self, k: usize) -> i32 {
        let (y0, y1) = self.band(k);
        (y0 + y1) / 2
    }
}

fn draw(layout: &WaterfallLayout, buffer: &mut [u8], width: u32, height: u32) -> RiskResult<()> {
    ensure_font()?;

    let root = BitMapBackend::with_buffer(buffer, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let rows = layout.segments.len();
    let frame = Frame::new(width, height, rows);
    let (left, right) = (frame.bar_left, frame.right);
    let line = frame.line;
    let bar_pad = (frame.band * 0.15).round() as i32;

    let labels: Vec<String> = layout.segments.iter().map(segment_label).collect();

    // Shrink the text until the widest label fits its column
    let mut text_px = (frame.band * TEXT_SCALE).max(1.0);
    let column = (frame.label_right - frame.left - frame.margin).max(1) as f64;
    let mut widest = 0u32;
    for label in &labels {
        let (w, _) = root
            .estimate_text_size(label, &text_style(text_px, HPos::Right))
            .map_err(render_err)?;
        widest = widest.max(w);
    }
    if widest as f64 > column {
        text_px = (text_px * column / widest as f64 * 0.95).max(1.0);
    }
    let label_style = text_style(text_px, HPos::Right);
    let value_style = text_style(text_px, HPos::Center);

    let (marks_top, _) = frame.row(0);
    let (_, marks_bottom) = frame.row(rows - 1);

    // Markers first so bars stay on top
    for (value, color) in [
        (layout.baseline, BASELINE_MARK),
        (layout.final_value, FINAL_MARK),
    ] {
        let x = layout.to_pixel(value, left, right);
        root.draw(&Rectangle::new(
            [(x - line / 2, marks_top), (x + (line - line / 2), marks_bottom)],
            color.filled(),
        ))
        .map_err(render_err)?;
    }

    // Baseline value in the header, final value in the footer
    for (text, value, band) in [
        (format!("base value {:.3}", layout.baseline), layout.baseline, 0),
        (format!("f(x) {:.3}", layout.final_value), layout.final_value, rows + 1),
    ] {
        let (tw, _) = root
            .estimate_text_size(&text, &value_style)
            .map_err(render_err)?;
        let half = (tw / 2) as i32;
        let x = layout
            .to_pixel(value, left, right)
            .min(right - half)
            .max(left + half);
        root.draw_text(&text, &value_style, (x, frame.center(band)))
            .map_err(render_err)?;
    }

    for (i, (segment, label)) in layout.segments.iter().zip(&labels).enumerate() {
        let (band_top, band_bottom) = frame.row(i);
        let y0 = band_top + bar_pad;
        let y1 = (band_bottom - bar_pad).max(y0 + 1);

        root.draw_text(
            label,
            &label_style,
            (frame.label_right, frame.center(i + 1)),
        )
        .map_err(render_err)?;

        let xa = layout.to_pixel(segment.start, left, right);
        let xb = layout.to_pixel(segment.end, left, right);
        let (x0, x1) = (xa.min(xb), xa.max(xb).max(xa.min(xb) + line));

        let color = match segment.direction {
            Direction::Up => RISK_UP,
            Direction::Down => RISK_DOWN,
            Direction::Flat => NEUTRAL,
        };
        root.draw(&Rectangle::new([(x0, y0), (x1, y1)], color.filled()))
            .map_err(render_err)?;

        // Connector to the next bar
        if i + 1 < rows {
            let (next_top, _) = frame.row(i + 1);
            root.draw(&Rectangle::new(
                [(xb - line / 2, y1), (xb + (line - line / 2), next_top + bar_pad)],
                NEUTRAL.filled(),
            ))
            .map_err(render_err)?;
        }
    }

    root.present().map_err(render_err)?;
    Ok(())
}

fn encode_png(buffer: &[u8], width: u32, height: u32, config: &RenderConfig) -> RiskResult<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let ppm = config.pixels_per_metre();
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: ppm,
            yppu: ppm,
            unit: png::Unit::Meter,
        }));

        let mut writer = encoder.write_header().map_err(render_err)?;
        writer.write_image_data(buffer).map_err(render_err)?;
        writer.finish().map_err(render_err)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::explain::Contribution;

    fn small() -> RenderConfig {
        RenderConfig::new(100, 4.0, 1.5)
    }

    fn aggregated(values: &[f64], other: f64) -> AggregatedExplanation {
        AggregatedExplanation {
            baseline: -2.0,
            top_contributions: values
                .iter()
                .enumerate()
                .map(|(i, v)| Contribution::new(format!("f{}", i), *v))
                .collect(),
            other: Contribution::other(other),
        }
    }

    #[test]
    fn test_layout_running_total() {
        let agg = aggregated(&[0.8, -0.3, 0.1, 0.0, -0.05], 0.02);
        let layout = WaterfallLayout::from_aggregated(&agg).unwrap();

        assert_eq!(layout.segments.len(), 6);
        assert_eq!(layout.segments[0].start, -2.0);
        for pair in layout.segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(layout.segments[3].direction, Direction::Flat);
        assert_eq!(layout.segments[1].direction, Direction::Down);
        assert_eq!(layout.segments[5].label, "Other");
        assert!((layout.final_value - agg.final_value()).abs() < 1e-12);
        assert!(layout.x_min < -2.0 && layout.x_max > layout.final_value);
    }

    #[test]
    fn test_all_zero_widens_range() {
        let agg = aggregated(&[0.0; 5], 0.0);
        let layout = WaterfallLayout::from_aggregated(&agg).unwrap();
        assert_eq!((layout.x_min, layout.x_max), (-3.0, -1.0));

        let image = render_waterfall(&agg, &small()).unwrap();
        assert!(!image.png.is_empty());
    }

    #[test]
    fn test_single_contributor_renders() {
        let agg = aggregated(&[], 0.4);
        let image = render_waterfall(&agg, &small()).unwrap();
        assert_eq!((image.width, image.height), (400, 150));
    }

    #[test]
    fn test_non_finite_is_render_error() {
        let agg = aggregated(&[f64::NAN], 0.0);
        assert!(matches!(
            render_waterfall(&agg, &small()),
            Err(RiskError::Render(_))
        ));

        let mut agg = aggregated(&[0.1], 0.0);
        agg.baseline = f64::INFINITY;
        assert!(WaterfallLayout::from_aggregated(&agg).is_err());
    }

    #[test]
    fn test_deterministic_output() {
        let agg = aggregated(&[0.8, -0.3, 0.1, 0.05, -0.05], 0.02);
        let a = render_waterfall(&agg, &small()).unwrap();
        let b = render_waterfall(&agg, &small()).unwrap();
        assert_eq!(a.png, b.png);
    }

    #[test]
    fn test_png_decodes_with_density() {
        let agg = aggregated(&[0.8, -0.3], 0.0);
        let config = small();
        let image = render_waterfall(&agg, &config).unwrap();

        let decoded = ::image::load_from_memory(&image.png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (400, 150));

        // Both sign colors made it into the raster
        assert!(decoded.pixels().any(|p| p.0 == [255, 0, 81]));
        assert!(decoded.pixels().any(|p| p.0 == [0, 139, 251]));

        let reader = png::Decoder::new(std::io::Cursor::new(&image.png))
            .read_info()
            .unwrap();
        let dims = reader.info().pixel_dims.unwrap();
        assert_eq!(dims.xppu, config.pixels_per_metre());
        assert_eq!(dims.unit, png::Unit::Meter);
    }

    /// Pixels darker than the lightest fill, inside [x0, x1) x [y0, y1)
    fn ink(image: &::image::RgbImage, (x0, x1): (i32, i32), (y0, y1): (i32, i32)) -> usize {
        (y0.max(0)..y1)
            .flat_map(|y| (x0.max(0)..x1).map(move |x| (x as u32, y as u32)))
            .filter(|&(x, y)| x < image.width() && y < image.height())
            .filter(|&(x, y)| image.get_pixel(x, y).0.iter().all(|&c| c < 200))
            .count()
    }

    #[test]
    fn test_labels_drawn_in_each_row() {
        let agg = aggregated(&[0.8, -0.3, 0.1, 0.05, -0.05], 0.02);
        let image = render_waterfall(&agg, &small()).unwrap();
        let decoded = ::image::load_from_memory(&image.png).unwrap().to_rgb8();

        let frame = Frame::new(400, 150, 6);
        let column = (frame.left, frame.label_right + 1);
        for row in 0..6 {
            assert!(ink(&decoded, column, frame.row(row)) > 0, "row {} has no label", row);
        }

        // Baseline value above the bars, final value below them
        let bars = (frame.bar_left, frame.right);
        assert!(ink(&decoded, bars, frame.band(0)) > 0);
        assert!(ink(&decoded, bars, frame.band(7)) > 0);
    }

    #[test]
    fn test_label_column_holds_only_text() {
        let agg = aggregated(&[0.8, -0.3], 0.0);
        let image = render_waterfall(&agg, &small()).unwrap();
        let decoded = ::image::load_from_memory(&image.png).unwrap().to_rgb8();

        // No bar or marker reaches into the label column
        let frame = Frame::new(400, 150, 3);
        let column = (frame.left, frame.label_right + 1);
        assert!(!decoded
            .enumerate_pixels()
            .filter(|(x, _, _)| (*x as i32) >= column.0 && (*x as i32) < column.1)
            .any(|(_, _, p)| p.0 == [255, 0, 81] || p.0 == [0, 139, 251]));
    }

    #[test]
    fn test_long_label_shrinks_into_column() {
        let mut agg = aggregated(&[0.8], 0.1);
        agg.top_contributions[0].feature_name = "Number of non-cancer illnesses".to_string();
        let config = RenderConfig::new(200, 4.0, 1.5);
        let image = render_waterfall(&agg, &config).unwrap();
        let decoded = ::image::load_from_memory(&image.png).unwrap().to_rgb8();

        let frame = Frame::new(800, 300, 2);
        assert!(ink(&decoded, (frame.left, frame.label_right + 1), frame.row(0)) > 0);
        // Nothing spills into the left margin
        assert_eq!(ink(&decoded, (0, frame.left), (0, 300)), 0);
    }

    #[test]
    fn test_labels_change_the_raster() {
        let a = aggregated(&[0.8, -0.3], 0.0);
        let mut b = a.clone();
        b.top_contributions[0].feature_name = "Age".to_string();
        let a = render_waterfall(&a, &small()).unwrap();
        let b = render_waterfall(&b, &small()).unwrap();
        assert_ne!(a.png, b.png);
    }

    #[test]
    fn test_oversized_is_render_error() {
        let agg = aggregated(&[0.1], 0.0);
        let huge = RenderConfig::new(10_000, 4.0, 1.5);
        assert!(matches!(
            render_waterfall(&agg, &huge),
            Err(RiskError::Render(_))
        ));
    }
}
