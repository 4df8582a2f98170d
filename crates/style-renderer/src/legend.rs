//! Static legend images for value-map, ramp and hybrid styles.
//!
//! All drawing goes through one shared canvas (font, scratch buffer, render
//! counter) guarded by a single mutex. A render holds the lock from the
//! first pixel to the encoded PNG, so concurrent requests for any style are
//! serialised. [`LegendRenderer::global`] is the process-wide instance.
//! Each renderer created with [`LegendRenderer::new`] owns an independent
//! canvas and lock, so only renders through the same instance are
//! serialised against each other.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use once_cell::sync::Lazy;
use raster_common::{StyleError, StyleResult};
use rusttype::{point, Font, Scale};
use tracing::{debug, warn};

use crate::color::{unit_to_byte, Channel};
use crate::config::LegendConfig;
use crate::png;
use crate::style::{ColorRamp, Style, ValueMapStyle};

const DEFAULT_WIDTH: u32 = 400;
const DEFAULT_HEIGHT: u32 = 125;

const MARGIN: i32 = 20;
const TITLE_SIZE: f32 = 14.0;
const LABEL_SIZE: f32 = 11.0;
const ROW_HEIGHT: u32 = 22;
const SWATCH: u32 = 16;

/// Most ticks a ramp legend carries.
pub const MAX_LEGEND_TICKS: usize = 100;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// A rendered or referenced legend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Legend {
    /// PNG bytes
    Image(Vec<u8>),
    /// Externally hosted legend
    External(String),
}

/// Legend renderer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendSettings {
    /// TrueType font for titles and labels; without one only the graphics
    /// are drawn
    pub font_path: Option<PathBuf>,
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for LegendSettings {
    fn default() -> Self {
        Self {
            font_path: None,
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
        }
    }
}

impl LegendSettings {
    /// Read `LEGEND_FONT_PATH`, `LEGEND_DEFAULT_WIDTH` and
    /// `LEGEND_DEFAULT_HEIGHT`, falling back to defaults.
    pub fn from_env() -> Self {
        let dimension = |key: &str, default: u32| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(default)
        };
        Self {
            font_path: std::env::var_os("LEGEND_FONT_PATH").map(PathBuf::from),
            default_width: dimension("LEGEND_DEFAULT_WIDTH", DEFAULT_WIDTH),
            default_height: dimension("LEGEND_DEFAULT_HEIGHT", DEFAULT_HEIGHT),
        }
    }
}

/// One labelled tick on a ramp colour bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub value: f64,
    pub label: String,
}

/// One labelled patch of a value-map legend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendEntry {
    pub label: String,
    pub color: [u8; 4],
}

struct Canvas {
    font: Option<Font<'static>>,
    scratch: RgbaImage,
    renders: u64,
    warned_missing_font: bool,
}

pub struct LegendRenderer {
    settings: LegendSettings,
    canvas: Mutex<Canvas>,
}

static GLOBAL: Lazy<LegendRenderer> = Lazy::new(|| LegendRenderer::new(LegendSettings::from_env()));

impl LegendRenderer {
    /// Renderer with its own canvas and lock, independent of
    /// [`LegendRenderer::global`].
    pub fn new(settings: LegendSettings) -> Self {
        let font = settings.font_path.as_ref().and_then(|path| {
            let font = std::fs::read(path).ok().and_then(Font::try_from_vec);
            if font.is_none() {
                warn!(path = %path.display(), "Failed to load legend font");
            }
            font
        });
        Self {
            canvas: Mutex::new(Canvas {
                font,
                scratch: RgbaImage::new(settings.default_width, settings.default_height),
                renders: 0,
                warned_missing_font: false,
            }),
            settings,
        }
    }

    /// Process-wide renderer configured from the environment.
    pub fn global() -> &'static LegendRenderer {
        &GLOBAL
    }

    pub fn settings(&self) -> &LegendSettings {
        &self.settings
    }

    /// Number of legends drawn so far.
    pub fn render_count(&self) -> u64 {
        self.lock().renders
    }

    fn lock(&self) -> MutexGuard<'_, Canvas> {
        self.canvas.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Legend for a style: the configured URL if any, `None` when the style
    /// has no legend, otherwise a freshly drawn opaque PNG.
    pub fn render(&self, style: &Style) -> StyleResult<Option<Legend>> {
        let def = style.definition();
        if let Some(url) = &def.legend.url {
            return Ok(Some(Legend::External(url.clone())));
        }
        if !def.auto_legend {
            return Ok(None);
        }

        let title = legend_title(&def.title, &def.legend);
        match style {
            Style::ValueMap(s) => {
                let entries = value_map_entries(s);
                if entries.is_empty() {
                    return Ok(None);
                }
                let width = def.legend.width.unwrap_or(self.settings.default_width);
                let height = def
                    .legend
                    .height
                    .unwrap_or(ROW_HEIGHT * (entries.len() as u32 + 1) + MARGIN as u32);
                self.draw(style.name(), width, height, |canvas, font| {
                    draw_patches(canvas, font, &title, &entries)
                })
            }
            Style::Ramp(_) | Style::Hybrid(_) => {
                let ramp = match style.color_ramp() {
                    Some(r) => r,
                    None => return Ok(None),
                };
                let ticks = ramp_ticks(ramp, &def.legend);
                let (begin, end) = bar_span(ramp, &def.legend, &ticks);
                let width = def.legend.width.unwrap_or(self.settings.default_width);
                let height = def.legend.height.unwrap_or(self.settings.default_height);
                self.draw(style.name(), width, height, |canvas, font| {
                    draw_color_bar(canvas, font, &title, ramp, begin, end, &ticks)
                })
            }
            Style::Linear(_) => Ok(None),
        }
    }

    fn draw<F>(&self, style: &str, width: u32, height: u32, paint: F) -> StyleResult<Option<Legend>>
    where
        F: FnOnce(&mut RgbaImage, Option<&Font<'static>>),
    {
        if width == 0 || height == 0 {
            return Err(StyleError::Legend(format!(
                "legend for '{}' has empty size {}x{}",
                style, width, height
            )));
        }

        let mut guard = self.lock();
        let canvas = &mut *guard;
        if canvas.font.is_none() && !canvas.warned_missing_font {
            warn!("No legend font configured; legend labels will be omitted");
            canvas.warned_missing_font = true;
        }
        if canvas.scratch.dimensions() != (width, height) {
            canvas.scratch = RgbaImage::new(width, height);
        }
        for px in canvas.scratch.pixels_mut() {
            *px = WHITE;
        }

        paint(&mut canvas.scratch, canvas.font.as_ref());
        flatten_onto_white(&mut canvas.scratch);
        let bytes = png::encode_auto(canvas.scratch.as_raw(), width as usize, height as usize)?;
        canvas.renders += 1;
        debug!(style, width, height, bytes = bytes.len(), "Rendered legend");
        Ok(Some(Legend::Image(bytes)))
    }
}

fn legend_title(style_title: &str, legend: &LegendConfig) -> String {
    let title = legend.title.as_deref().unwrap_or(style_title);
    match &legend.units {
        Some(units) if !units.is_empty() => format!("{} ({})", title, units),
        _ => title.to_string(),
    }
}

/// Patches for every rule carrying both a title and an abstract.
pub fn value_map_entries(style: &ValueMapStyle) -> Vec<LegendEntry> {
    style
        .value_map()
        .iter()
        .flat_map(|(_, rules)| rules)
        .filter(|r| r.has_legend_entry())
        .map(|r| {
            let [red, green, blue] = r.color.to_u8();
            LegendEntry {
                label: r.legend_label(),
                color: [red, green, blue, unit_to_byte(r.alpha)],
            }
        })
        .collect()
}

fn format_value(value: f64, legend: &LegendConfig) -> String {
    let places = legend.decimal_places.unwrap_or(1) as usize;
    format!("{:.*}", places, value * legend.scale.unwrap_or(1.0))
}

fn tick_label(value: f64, point_label: Option<&str>, legend: &LegendConfig) -> String {
    let default = legend.tick_labels.get("default");
    let specific = legend
        .tick_labels
        .iter()
        .filter(|(k, _)| k.as_str() != "default")
        .find(|(k, _)| k.parse::<f64>().map_or(false, |v| (v - value).abs() < 1e-9))
        .map(|(_, t)| t);

    let body = specific
        .and_then(|t| t.label.clone())
        .or_else(|| point_label.map(str::to_string))
        .unwrap_or_else(|| format_value(value, legend));
    let prefix = specific
        .and_then(|t| t.prefix.as_deref())
        .or_else(|| default.and_then(|t| t.prefix.as_deref()))
        .unwrap_or("");
    let suffix = specific
        .and_then(|t| t.suffix.as_deref())
        .or_else(|| default.and_then(|t| t.suffix.as_deref()))
        .unwrap_or("");
    format!("{}{}{}", prefix, body, suffix)
}

fn tick_bounds(ramp: &ColorRamp, legend: &LegendConfig) -> (f64, f64) {
    let begin = legend.begin.unwrap_or_else(|| ramp.first_value());
    let end = legend.end.unwrap_or_else(|| ramp.last_value());
    (begin, end)
}

/// Evenly spaced intervals between `begin` and `end` from `ticks_every` or
/// `tick_count`.
fn tick_intervals(legend: &LegendConfig, begin: f64, end: f64) -> usize {
    match legend.ticks_every.filter(|e| *e > 0.0) {
        Some(every) => ((end - begin) / every + 1e-9).floor().max(0.0) as usize,
        None => legend.tick_count.unwrap_or(1).max(1) as usize,
    }
}

/// Reject legend settings asking for more than [`MAX_LEGEND_TICKS`] ticks.
pub fn check_ticks(ramp: &ColorRamp, legend: &LegendConfig) -> Result<(), String> {
    if ramp.has_legend_points() {
        return Ok(());
    }
    let requested = match &legend.ticks {
        Some(ticks) => ticks.len(),
        None => {
            let (begin, end) = tick_bounds(ramp, legend);
            tick_intervals(legend, begin, end).saturating_add(1)
        }
    };
    if requested > MAX_LEGEND_TICKS {
        return Err(format!(
            "legend asks for {} ticks, at most {} are allowed",
            requested, MAX_LEGEND_TICKS
        ));
    }
    Ok(())
}

/// Ticks for a ramp colour bar.
///
/// Ramp points carrying legend metadata are the ticks when there are any.
/// Otherwise ticks run from `begin` to `end` (the ramp's end points by
/// default), given as an explicit list, a fixed stride or a number of
/// intervals.
pub fn ramp_ticks(ramp: &ColorRamp, legend: &LegendConfig) -> Vec<Tick> {
    if ramp.has_legend_points() {
        return ramp
            .points()
            .iter()
            .filter_map(|p| {
                let meta = p.legend.as_ref()?;
                Some(Tick {
                    value: p.value,
                    label: tick_label(p.value, meta.label.as_deref(), legend),
                })
            })
            .collect();
    }

    let (begin, end) = tick_bounds(ramp, legend);
    let values: Vec<f64> = if let Some(ticks) = &legend.ticks {
        ticks.iter().copied().take(MAX_LEGEND_TICKS).collect()
    } else if let Some(every) = legend.ticks_every.filter(|e| *e > 0.0) {
        let steps = tick_intervals(legend, begin, end).min(MAX_LEGEND_TICKS - 1);
        (0..=steps).map(|i| begin + every * i as f64).collect()
    } else {
        let count = tick_intervals(legend, begin, end).min(MAX_LEGEND_TICKS - 1);
        (0..=count)
            .map(|i| begin + (end - begin) * i as f64 / count as f64)
            .collect()
    };

    values
        .into_iter()
        .map(|value| Tick {
            value,
            label: tick_label(value, None, legend),
        })
        .collect()
}

fn bar_span(ramp: &ColorRamp, legend: &LegendConfig, ticks: &[Tick]) -> (f64, f64) {
    if ramp.has_legend_points() {
        let first = ticks.first().map(|t| t.value).unwrap_or_else(|| ramp.first_value());
        let last = ticks.last().map(|t| t.value).unwrap_or_else(|| ramp.last_value());
        (first, last)
    } else {
        (
            legend.begin.unwrap_or_else(|| ramp.first_value()),
            legend.end.unwrap_or_else(|| ramp.last_value()),
        )
    }
}

fn text_width(font: &Font<'_>, scale: Scale, text: &str) -> i32 {
    font.layout(text, scale, point(0.0, 0.0))
        .filter_map(|g| g.pixel_bounding_box())
        .map(|bb| bb.max.x)
        .max()
        .unwrap_or(0)
}

fn draw_patches(canvas: &mut RgbaImage, font: Option<&Font<'static>>, title: &str, entries: &[LegendEntry]) {
    if let Some(font) = font {
        draw_text_mut(canvas, BLACK, MARGIN / 2, 4, Scale::uniform(TITLE_SIZE), font, title);
    }
    for (row, entry) in entries.iter().enumerate() {
        let top = ROW_HEIGHT * (row as u32 + 1);
        let color = Rgba(entry.color);
        for y in top..top + SWATCH {
            for x in (MARGIN as u32 / 2)..(MARGIN as u32 / 2 + SWATCH) {
                if x < canvas.width() && y < canvas.height() {
                    canvas.put_pixel(x, y, color);
                }
            }
        }
        if let Some(font) = font {
            let x = MARGIN / 2 + SWATCH as i32 + 6;
            draw_text_mut(canvas, BLACK, x, top as i32 + 2, Scale::uniform(LABEL_SIZE), font, &entry.label);
        }
    }
}

fn draw_color_bar(
    canvas: &mut RgbaImage,
    font: Option<&Font<'static>>,
    title: &str,
    ramp: &ColorRamp,
    begin: f64,
    end: f64,
    ticks: &[Tick],
) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    if let Some(font) = font {
        draw_text_mut(canvas, BLACK, MARGIN, 4, Scale::uniform(TITLE_SIZE), font, title);
    }

    let left = MARGIN.min(width / 4);
    let right = (width - left - 1).max(left);
    let top = 26.min(height / 4);
    let bar_height = (height - top - 44).clamp(4.min(height - top), 30);
    let bottom = top + bar_height;
    let span = end - begin;
    let position = |value: f64| -> i32 {
        if span == 0.0 || right == left {
            return left;
        }
        let t = ((value - begin) / span).clamp(0.0, 1.0);
        left + (t * (right - left) as f64).round() as i32
    };

    for x in left..=right {
        let value = if right == left {
            begin
        } else {
            begin + span * (x - left) as f64 / (right - left) as f64
        };
        let rgba = Channel::ALL.map(|c| unit_to_byte(ramp.intensity(c, value)));
        for y in top..bottom {
            if (0..width).contains(&x) && (0..height).contains(&y) {
                canvas.put_pixel(x as u32, y as u32, Rgba(rgba));
            }
        }
    }

    let label_scale = Scale::uniform(LABEL_SIZE);
    for tick in ticks {
        let x = position(tick.value) as f32;
        draw_line_segment_mut(canvas, (x, bottom as f32), (x, (bottom + 5) as f32), BLACK);
        if let Some(font) = font {
            let w = text_width(font, label_scale, &tick.label);
            let lx = (x as i32 - w / 2).clamp(0, (width - w).max(0));
            draw_text_mut(canvas, BLACK, lx, bottom + 8, label_scale, font, &tick.label);
        }
    }
}

/// Composite every pixel onto white and make it opaque.
fn flatten_onto_white(canvas: &mut RgbaImage) {
    for px in canvas.pixels_mut() {
        let Rgba([r, g, b, a]) = *px;
        let alpha = a as f64 / 255.0;
        let blend = |c: u8| (c as f64 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        *px = Rgba([blend(r), blend(g), blend(b), 255]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::config::{PointLegend, TickLabel};
    use crate::style::RampPoint;

    fn linear_ramp() -> ColorRamp {
        ColorRamp::new(vec![
            RampPoint::new(0.0, Rgb::new(0.0, 0.0, 0.0), 1.0),
            RampPoint::new(1.0, Rgb::new(1.0, 1.0, 1.0), 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_tick_count_intervals() {
        let legend = LegendConfig {
            tick_count: Some(2),
            ..Default::default()
        };
        let ticks = ramp_ticks(&linear_ramp(), &legend);
        let labels: Vec<_> = ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["0.0", "0.5", "1.0"]);
    }

    #[test]
    fn test_tick_limits() {
        let tiny_stride = LegendConfig {
            ticks_every: Some(1e-12),
            ..Default::default()
        };
        assert!(check_ticks(&linear_ramp(), &tiny_stride).is_err());
        assert_eq!(ramp_ticks(&linear_ramp(), &tiny_stride).len(), MAX_LEGEND_TICKS);

        let huge_count = LegendConfig {
            tick_count: Some(u32::MAX),
            ..Default::default()
        };
        assert!(check_ticks(&linear_ramp(), &huge_count).is_err());
        assert_eq!(ramp_ticks(&linear_ramp(), &huge_count).len(), MAX_LEGEND_TICKS);

        let ten = LegendConfig {
            tick_count: Some(10),
            ..Default::default()
        };
        assert!(check_ticks(&linear_ramp(), &ten).is_ok());
    }

    #[test]
    fn test_default_single_interval() {
        let ticks = ramp_ticks(&linear_ramp(), &LegendConfig::default());
        assert_eq!(ticks.len(), 2);
    }

    #[test]
    fn test_ticks_every_and_scale() {
        let legend = LegendConfig {
            ticks_every: Some(0.5),
            scale: Some(100.0),
            decimal_places: Some(0),
            ..Default::default()
        };
        let labels: Vec<_> = ramp_ticks(&linear_ramp(), &legend)
            .into_iter()
            .map(|t| t.label)
            .collect();
        assert_eq!(labels, vec!["0", "50", "100"]);
    }

    #[test]
    fn test_tick_label_overrides() {
        let mut legend = LegendConfig {
            ticks: Some(vec![0.0, 1.0]),
            ..Default::default()
        };
        legend.tick_labels.insert(
            "default".into(),
            TickLabel {
                suffix: Some("%".into()),
                ..Default::default()
            },
        );
        legend.tick_labels.insert(
            "1.0".into(),
            TickLabel {
                label: Some("max".into()),
                ..Default::default()
            },
        );
        let labels: Vec<_> = ramp_ticks(&linear_ramp(), &legend)
            .into_iter()
            .map(|t| t.label)
            .collect();
        assert_eq!(labels, vec!["0.0%", "max%"]);
    }

    #[test]
    fn test_explicit_point_ticks() {
        let mut points = linear_ramp().points().to_vec();
        points[1].legend = Some(PointLegend {
            label: Some("high".into()),
        });
        let ramp = ColorRamp::new(points).unwrap();
        let ticks = ramp_ticks(&ramp, &LegendConfig::default());
        assert_eq!(
            ticks,
            vec![Tick {
                value: 1.0,
                label: "high".into()
            }]
        );
    }

    #[test]
    fn test_title_with_units() {
        let legend = LegendConfig {
            units: Some("mm".into()),
            ..Default::default()
        };
        assert_eq!(legend_title("Rain", &legend), "Rain (mm)");
    }

    #[test]
    fn test_flatten_onto_white() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        flatten_onto_white(&mut img);
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }
}
