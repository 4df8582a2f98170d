//! Continuous colour ramp style.
//!
//! An index function reduces the bands to one scalar per pixel, which is
//! then interpolated piecewise-linearly along the ramp's control points.

use std::cmp::Ordering;

use ndarray::{Array3, Zip};
use raster_common::{Band, Dataset, RasterShape, RgbaRaster, StyleError, StyleResult};
use tracing::debug;

use super::{plane_mut, to_plane, BuildContext, StyleDefinition};
use crate::band_math::{Aggregator, BandFunction, ScaleRange};
use crate::color::{Channel, Rgb};
use crate::config::{MultiDateConfig, PointLegend, RampPointConfig, StyleDocument};
use crate::legend;
use crate::palettes;

/// Built-in ramp over `[0, 1]` as `(value, colour, alpha)`; remapped into a
/// style's `range` when no explicit ramp is given.
pub const DEFAULT_RAMP: [(f64, &str, f64); 8] = [
    (-1e-24, "#000080", 0.0),
    (0.0, "#000080", 1.0),
    (0.1, "#0000FF", 1.0),
    (0.3, "#00FFFF", 1.0),
    (0.5, "#00FF00", 1.0),
    (0.7, "#FFFF00", 1.0),
    (0.9, "#FF0000", 1.0),
    (1.0, "#800000", 1.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct RampPoint {
    pub value: f64,
    pub color: Rgb,
    pub alpha: f64,
    pub legend: Option<PointLegend>,
}

impl RampPoint {
    pub fn new(value: f64, color: Rgb, alpha: f64) -> Self {
        Self {
            value,
            color,
            alpha,
            legend: None,
        }
    }

    /// Channel intensity in `[0, 1]`.
    pub fn intensity(&self, channel: Channel) -> f64 {
        self.color.channel(channel).unwrap_or(self.alpha)
    }
}

/// Ordered control points.
///
/// Values are compared in IEEE total order, so `-0.0` sorts before `0.0`.
/// Adjacent points may share a value to form a hard step; an index equal to
/// that value takes the later point.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    points: Vec<RampPoint>,
}

impl ColorRamp {
    pub fn new(points: Vec<RampPoint>) -> Result<Self, String> {
        if points.is_empty() {
            return Err("colour ramp has no points".into());
        }
        if let Some(p) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(format!("ramp value {} is not finite", p.value));
        }
        if let Some(w) = points
            .windows(2)
            .find(|w| w[0].value.total_cmp(&w[1].value) == Ordering::Greater)
        {
            return Err(format!(
                "ramp values must ascend; {} is followed by {}",
                w[0].value, w[1].value
            ));
        }
        Ok(Self { points })
    }

    pub fn from_config(points: &[RampPointConfig]) -> Result<Self, String> {
        let points = points
            .iter()
            .map(|p| {
                let color =
                    Rgb::parse(&p.color).ok_or_else(|| format!("invalid colour '{}'", p.color))?;
                Ok(RampPoint {
                    value: p.value,
                    color,
                    alpha: p.alpha,
                    legend: p.legend.clone(),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Self::new(points)
    }

    /// Evenly spaced samples of a named palette spread over `range`.
    pub fn from_palette(name: &str, range: ScaleRange) -> Result<Self, String> {
        let samples = palettes::sample(name).ok_or_else(|| format!("unknown palette '{}'", name))?;
        Self::new(
            samples
                .into_iter()
                .map(|s| RampPoint::new(range.min + s.position * range.span(), s.color, s.alpha))
                .collect(),
        )
    }

    /// [`DEFAULT_RAMP`] remapped linearly into `range`.
    pub fn scaled_default(range: ScaleRange) -> Self {
        let points = DEFAULT_RAMP
            .iter()
            .map(|&(v, hex, alpha)| {
                let color = Rgb::parse(hex).unwrap_or(Rgb::new(0.0, 0.0, 0.0));
                RampPoint::new(range.span() * v + range.min, color, alpha)
            })
            .collect();
        Self { points }
    }

    /// Ramp from whichever source a document gives: explicit points, then a
    /// named palette, then the default ramp. `None` when no source is given.
    pub fn from_sources(
        color_ramp: Option<&[RampPointConfig]>,
        palette: Option<&str>,
        range: Option<ScaleRange>,
    ) -> Result<Option<Self>, String> {
        if let Some(range) = range {
            range.validate()?;
        }
        match (color_ramp, palette, range) {
            (Some(points), _, _) => Self::from_config(points).map(Some),
            (None, Some(name), Some(range)) => Self::from_palette(name, range).map(Some),
            (None, Some(name), None) => Err(format!("palette '{}' needs a range", name)),
            (None, None, Some(range)) => Ok(Some(Self::scaled_default(range))),
            (None, None, None) => Ok(None),
        }
    }

    pub fn points(&self) -> &[RampPoint] {
        &self.points
    }

    pub fn first_value(&self) -> f64 {
        self.points[0].value
    }

    pub fn last_value(&self) -> f64 {
        self.points[self.points.len() - 1].value
    }

    /// Whether any point carries legend metadata.
    pub fn has_legend_points(&self) -> bool {
        self.points.iter().any(|p| p.legend.is_some())
    }

    /// Interpolated channel intensity at `x`, clamped to the end points
    /// outside the ramp's domain. NaN for a NaN index.
    pub fn intensity(&self, channel: Channel, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let pts = &self.points;
        let above = pts.partition_point(|p| p.value.total_cmp(&x) != Ordering::Greater);
        if above == 0 {
            return pts[0].intensity(channel);
        }
        let lower = &pts[above - 1];
        if above == pts.len() || lower.value.total_cmp(&x) == Ordering::Equal {
            return lower.intensity(channel);
        }
        let upper = &pts[above];
        let t = (x - lower.value) / (upper.value - lower.value);
        let (a, b) = (lower.intensity(channel), upper.intensity(channel));
        a + (b - a) * t
    }

    /// Fractional `[0, 1]` intensities of every channel, in [`Channel::ALL`]
    /// order.
    pub fn fractions(&self, index: &Array3<f64>) -> [Array3<f64>; 4] {
        Channel::ALL.map(|channel| {
            Zip::from(index).par_map_collect(|&x| self.intensity(channel, x))
        })
    }

    /// Colour an index raster. NaN pixels are fully transparent.
    pub fn colorize(&self, index: &Array3<f64>) -> RgbaRaster {
        let mut image = RgbaRaster::transparent(RasterShape::of(index));
        for (channel, values) in Channel::ALL.into_iter().zip(self.fractions(index)) {
            *plane_mut(&mut image, channel) = to_plane(&(values * 255.0));
        }
        image
    }
}

/// Aggregates a multi-slice request into one slice before colouring.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiDateHandler {
    pub min_count: usize,
    pub max_count: usize,
    pub aggregator: Aggregator,
    /// Overrides the style's ramp when set
    pub ramp: Option<ColorRamp>,
}

impl MultiDateHandler {
    fn from_config(style: &str, config: &MultiDateConfig, ctx: &BuildContext<'_>) -> StyleResult<Self> {
        let [min_count, max_count] = config.allowed_count_range;
        if min_count < 2 || min_count > max_count {
            return Err(StyleError::config(
                style,
                format!("invalid multi-date count range [{}, {}]", min_count, max_count),
            ));
        }
        let aggregator = ctx.registry.build_aggregator(style, &config.aggregator_function)?;
        let ramp = ColorRamp::from_sources(
            config.color_ramp.as_deref(),
            config.palette.as_deref(),
            config.range,
        )
        .map_err(|e| StyleError::config(style, e))?;
        Ok(Self {
            min_count,
            max_count,
            aggregator,
            ramp,
        })
    }

    pub fn applies(&self, count: usize) -> bool {
        (self.min_count..=self.max_count).contains(&count)
    }
}

#[derive(Debug, Clone)]
pub struct RampStyle {
    base: StyleDefinition,
    index_function: BandFunction,
    ramp: ColorRamp,
    multi_date: Vec<MultiDateHandler>,
}

impl RampStyle {
    pub fn from_document(name: &str, doc: &StyleDocument, ctx: &BuildContext<'_>) -> StyleResult<Self> {
        let mut base = StyleDefinition::from_document(name, doc, ctx, true)?;
        let index_config = doc
            .index_function
            .as_ref()
            .ok_or_else(|| base.config_error("index_function is required"))?;
        let index_function = ctx.build_function(name, index_config)?;
        base.add_bands(index_function.bands());

        let ramp = ColorRamp::from_sources(doc.color_ramp.as_deref(), doc.palette.as_deref(), doc.range)
            .map_err(|e| base.config_error(e))?
            .unwrap_or_else(|| ColorRamp::scaled_default(ScaleRange::new(0.0, 1.0)));
        legend::check_ticks(&ramp, &doc.legend).map_err(|e| base.config_error(e))?;

        let multi_date = doc
            .multi_date
            .iter()
            .map(|m| MultiDateHandler::from_config(name, m, ctx))
            .collect::<StyleResult<Vec<_>>>()?;

        Ok(Self {
            base,
            index_function,
            ramp,
            multi_date,
        })
    }

    pub fn definition(&self) -> &StyleDefinition {
        &self.base
    }

    pub fn ramp(&self) -> &ColorRamp {
        &self.ramp
    }

    pub fn index_function(&self) -> &BandFunction {
        &self.index_function
    }

    pub fn multi_date(&self) -> &[MultiDateHandler] {
        &self.multi_date
    }

    /// Per-slice index raster.
    pub fn index(&self, data: &Dataset) -> StyleResult<Band> {
        self.index_function.evaluate(data)
    }

    pub fn render(&self, data: &Dataset) -> StyleResult<RgbaRaster> {
        let index = self.index(data)?;
        let times = index.shape().times;
        if times > 1 {
            if let Some(handler) = self.multi_date.iter().find(|h| h.applies(times)) {
                debug!(style = %self.base.name, times, "Aggregating multi-date request");
                let aggregated = handler.aggregator.apply(&index)?;
                let ramp = handler.ramp.as_ref().unwrap_or(&self.ramp);
                return Ok(ramp.colorize(&aggregated.data));
            }
        }
        Ok(self.ramp.colorize(&index.data))
    }
}
