//! Rendering strategies.
//!
//! A style is built once from its [`StyleDocument`] and is read-only
//! afterwards, so one instance can serve any number of concurrent render
//! requests. Four strategies exist:
//!
//! - [`LinearStyle`]: weighted band sums compressed into `[0, 255]`
//! - [`ValueMapStyle`]: ordered flag/value rules painting discrete colours
//! - [`RampStyle`]: an index function interpolated along a colour ramp
//! - [`HybridStyle`]: a blend of a ramp style and a linear style

mod hybrid;
mod linear;
mod ramp;
mod value_map;

pub use hybrid::HybridStyle;
pub use linear::{ComponentSource, LinearComponent, LinearStyle};
pub use ramp::{ColorRamp, MultiDateHandler, RampPoint, RampStyle, DEFAULT_RAMP};
pub use value_map::{RulePredicate, ValueMapRule, ValueMapStyle};

use std::collections::BTreeSet;
use std::fmt;

use ndarray::Array3;
use raster_common::{
    BandResolver, Dataset, ExtentMask, RasterShape, RgbaRaster, StyleError, StyleResult,
};
use tracing::debug;

use crate::band_math::{BandFunction, FunctionConfig, FunctionRegistry, ScaleRange};
use crate::color::{to_byte, Channel};
use crate::config::{LegendConfig, StyleDocument};
use crate::masks::{self, Mask};

/// Collaborators needed while building a style.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub resolver: &'a dyn BandResolver,
    pub registry: &'a FunctionRegistry,
    /// Bands the layer always fetches regardless of style
    pub always_fetch: &'a [String],
}

impl<'a> BuildContext<'a> {
    pub fn resolve_band(&self, style: &str, alias: &str) -> StyleResult<String> {
        self.resolver
            .resolve(alias)
            .ok_or_else(|| StyleError::config(style, format!("unknown band alias '{}'", alias)))
    }

    pub fn build_function(&self, style: &str, config: &FunctionConfig) -> StyleResult<BandFunction> {
        self.registry.build(style, config, self.resolver)
    }
}

/// Fields shared by every strategy.
#[derive(Debug, Clone)]
pub struct StyleDefinition {
    pub name: String,
    pub title: String,
    pub abstract_: String,
    pub legend: LegendConfig,
    pub auto_legend: bool,
    pub include_in_feature_info: bool,
    needed_bands: BTreeSet<String>,
    masks: Vec<Mask>,
}

impl StyleDefinition {
    /// Base definition from a document. Mask band names are taken verbatim;
    /// extra `needed_bands` go through the resolver.
    pub fn from_document(
        name: &str,
        doc: &StyleDocument,
        ctx: &BuildContext<'_>,
        show_legend_default: bool,
    ) -> StyleResult<Self> {
        let mut needed_bands: BTreeSet<String> = ctx.always_fetch.iter().cloned().collect();
        for band in &doc.needed_bands {
            needed_bands.insert(ctx.resolve_band(name, band)?);
        }
        needed_bands.extend(doc.pq_masks.iter().map(|m| m.band.clone()));

        Ok(Self {
            name: name.to_string(),
            title: doc.title.clone(),
            abstract_: doc.abstract_.clone(),
            legend: doc.legend.clone(),
            auto_legend: doc.legend.show_legend.unwrap_or(show_legend_default),
            include_in_feature_info: doc.include_in_feature_info,
            needed_bands,
            masks: doc.pq_masks.clone(),
        })
    }

    pub(crate) fn add_bands<'b>(&mut self, bands: impl IntoIterator<Item = &'b str>) {
        self.needed_bands.extend(bands.into_iter().map(str::to_string));
    }

    /// Every band the style must fetch to render.
    pub fn needed_bands(&self) -> &BTreeSet<String> {
        &self.needed_bands
    }

    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    pub fn apply_masks(
        &self,
        data: Dataset,
        pq: Option<&Dataset>,
        extent: Option<&ExtentMask>,
    ) -> StyleResult<Dataset> {
        masks::apply_masks(data, &self.masks, pq, extent)
    }

    pub(crate) fn config_error(&self, message: impl Into<String>) -> StyleError {
        StyleError::config(&self.name, message)
    }
}

/// Dynamic range compression of one value into `[0, 255]`.
///
/// The result is fractional; rounding happens when the image is produced.
#[inline]
pub fn compress(value: f64, range: ScaleRange) -> f64 {
    range.normalize(value) * 255.0
}

/// [`compress`] applied to every pixel.
pub fn compress_band(values: &Array3<f64>, range: ScaleRange) -> Array3<f64> {
    values.mapv(|v| compress(v, range))
}

pub(crate) fn to_plane(values: &Array3<f64>) -> Array3<u8> {
    values.mapv(to_byte)
}

pub(crate) fn plane_mut(image: &mut RgbaRaster, channel: Channel) -> &mut Array3<u8> {
    match channel {
        Channel::Red => &mut image.red,
        Channel::Green => &mut image.green,
        Channel::Blue => &mut image.blue,
        Channel::Alpha => &mut image.alpha,
    }
}

/// Which strategy a style uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    Linear,
    ValueMap,
    Ramp,
    Hybrid,
}

impl StyleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleKind::Linear => "linear",
            StyleKind::ValueMap => "value_map",
            StyleKind::Ramp => "ramp",
            StyleKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StyleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A built style of any strategy.
#[derive(Debug, Clone)]
pub enum Style {
    Linear(LinearStyle),
    ValueMap(ValueMapStyle),
    Ramp(RampStyle),
    Hybrid(HybridStyle),
}

impl Style {
    pub fn definition(&self) -> &StyleDefinition {
        match self {
            Style::Linear(s) => s.definition(),
            Style::ValueMap(s) => s.definition(),
            Style::Ramp(s) => s.definition(),
            Style::Hybrid(s) => s.definition(),
        }
    }

    pub fn kind(&self) -> StyleKind {
        match self {
            Style::Linear(_) => StyleKind::Linear,
            Style::ValueMap(_) => StyleKind::ValueMap,
            Style::Ramp(_) => StyleKind::Ramp,
            Style::Hybrid(_) => StyleKind::Hybrid,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition().name
    }

    pub fn needed_bands(&self) -> &BTreeSet<String> {
        self.definition().needed_bands()
    }

    /// Apply the extent mask and the style's pixel-quality masks.
    pub fn apply_masks(
        &self,
        data: Dataset,
        pq: Option<&Dataset>,
        extent: Option<&ExtentMask>,
    ) -> StyleResult<Dataset> {
        self.definition().apply_masks(data, pq, extent)
    }

    /// Colour already-masked data.
    pub fn render(&self, data: &Dataset) -> StyleResult<RgbaRaster> {
        debug!(
            style = %self.name(),
            kind = %self.kind(),
            shape = %data.shape(),
            "Rendering style"
        );
        match self {
            Style::Linear(s) => s.render(data),
            Style::ValueMap(s) => s.render(data),
            Style::Ramp(s) => s.render(data),
            Style::Hybrid(s) => s.render(data),
        }
    }

    /// Mask then render.
    pub fn transform(
        &self,
        data: Dataset,
        pq: Option<&Dataset>,
        extent: Option<&ExtentMask>,
    ) -> StyleResult<RgbaRaster> {
        let masked = self.apply_masks(data, pq, extent)?;
        self.render(&masked)
    }

    /// Index value at one pixel, for styles that compute an index and opt
    /// into feature info.
    pub fn feature_info(
        &self,
        data: &Dataset,
        time: usize,
        y: usize,
        x: usize,
    ) -> StyleResult<Option<f64>> {
        if !self.definition().include_in_feature_info {
            return Ok(None);
        }
        let ramp = match self {
            Style::Ramp(s) => s,
            Style::Hybrid(s) => s.ramp_style(),
            Style::Linear(_) | Style::ValueMap(_) => return Ok(None),
        };
        let index = ramp.index(data)?;
        let shape: RasterShape = index.shape();
        if time >= shape.times || y >= shape.height || x >= shape.width {
            return Err(StyleError::ShapeMismatch {
                expected: format!("pixel within {}", shape),
                actual: format!("({}, {}, {})", time, y, x),
            });
        }
        Ok(Some(index.data[(time, y, x)]))
    }

    /// Colour ramp used for legends, for ramp and hybrid styles.
    pub fn color_ramp(&self) -> Option<&ColorRamp> {
        match self {
            Style::Ramp(s) => Some(s.ramp()),
            Style::Hybrid(s) => Some(s.ramp_style().ramp()),
            Style::Linear(_) | Style::ValueMap(_) => None,
        }
    }
}
