//! Linear combination style with dynamic range compression.

use std::collections::BTreeMap;

use ndarray::{Array3, Zip};
use raster_common::{Dataset, RgbaRaster, StyleResult};

use super::{compress_band, plane_mut, to_plane, BuildContext, StyleDefinition};
use crate::band_math::{BandFunction, ScaleRange};
use crate::color::Channel;
use crate::config::{ComponentConfig, StyleDocument};

/// Where a channel's values come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentSource {
    /// Weighted sum of bands
    Weighted(Vec<(String, f64)>),
    Function(BandFunction),
}

impl ComponentSource {
    pub fn bands(&self) -> Vec<&str> {
        match self {
            ComponentSource::Weighted(weights) => weights.iter().map(|(b, _)| b.as_str()).collect(),
            ComponentSource::Function(f) => f.bands(),
        }
    }

    pub fn evaluate(&self, data: &Dataset) -> StyleResult<Array3<f64>> {
        match self {
            ComponentSource::Weighted(weights) => {
                let mut acc = Array3::<f64>::zeros(data.shape().dim());
                for (band, weight) in weights {
                    let band = data.require(band)?;
                    Zip::from(&mut acc)
                        .and(&band.data)
                        .for_each(|a, &v| *a += v * weight);
                }
                Ok(acc)
            }
            ComponentSource::Function(f) => Ok(f.evaluate(data)?.data),
        }
    }
}

/// One output channel of a linear style.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearComponent {
    pub source: ComponentSource,
    /// Compression range; `None` only for alpha, which is not compressed
    pub range: Option<ScaleRange>,
}

#[derive(Debug, Clone)]
pub struct LinearStyle {
    base: StyleDefinition,
    components: BTreeMap<Channel, LinearComponent>,
}

impl LinearStyle {
    pub fn from_document(name: &str, doc: &StyleDocument, ctx: &BuildContext<'_>) -> StyleResult<Self> {
        let mut base = StyleDefinition::from_document(name, doc, ctx, false)?;
        let configs = doc
            .components
            .as_ref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| base.config_error("linear components are required"))?;

        let style_range = match (doc.scale_range, doc.scale_factor) {
            (Some(range), _) => Some(range),
            (None, Some(factor)) => Some(ScaleRange::new(0.0, 255.0 * factor)),
            (None, None) => None,
        };

        let mut components = BTreeMap::new();
        for (&channel, config) in configs {
            let source = match config {
                ComponentConfig::Bands { weights, .. } => {
                    if weights.is_empty() {
                        return Err(base.config_error(format!("{} component has no bands", channel)));
                    }
                    let resolved = weights
                        .iter()
                        .map(|(band, w)| Ok((ctx.resolve_band(name, band)?, *w)))
                        .collect::<StyleResult<Vec<_>>>()?;
                    ComponentSource::Weighted(resolved)
                }
                ComponentConfig::Function { function, .. } => {
                    ComponentSource::Function(ctx.build_function(name, function)?)
                }
            };

            let range = if channel.is_alpha() {
                None
            } else {
                let range = config.scale_range().or(style_range).ok_or_else(|| {
                    base.config_error(format!(
                        "{} component needs a scale_range or scale_factor",
                        channel
                    ))
                })?;
                range
                    .validate()
                    .map_err(|e| base.config_error(format!("{} scale range: {}", channel, e)))?;
                Some(range)
            };

            base.add_bands(source.bands());
            components.insert(channel, LinearComponent { source, range });
        }

        Ok(Self { base, components })
    }

    pub fn definition(&self) -> &StyleDefinition {
        &self.base
    }

    pub fn components(&self) -> &BTreeMap<Channel, LinearComponent> {
        &self.components
    }

    pub fn has_component(&self, channel: Channel) -> bool {
        self.components.contains_key(&channel)
    }

    /// A channel's values: compressed into `[0, 255]` for colour channels,
    /// raw for alpha. `None` when the channel has no component.
    pub fn channel_values(&self, channel: Channel, data: &Dataset) -> StyleResult<Option<Array3<f64>>> {
        let component = match self.components.get(&channel) {
            Some(c) => c,
            None => return Ok(None),
        };
        let raw = component.source.evaluate(data)?;
        Ok(Some(match component.range {
            Some(range) => compress_band(&raw, range),
            None => raw,
        }))
    }

    /// Without an alpha component, pixels are opaque where every computed
    /// colour channel is finite and transparent elsewhere.
    pub fn render(&self, data: &Dataset) -> StyleResult<RgbaRaster> {
        let shape = data.shape();
        let mut image = RgbaRaster::transparent(shape);
        let mut finite = Array3::from_elem(shape.dim(), true);

        for channel in [Channel::Red, Channel::Green, Channel::Blue] {
            if let Some(values) = self.channel_values(channel, data)? {
                Zip::from(&mut finite)
                    .and(&values)
                    .for_each(|f, v| *f = *f && v.is_finite());
                *plane_mut(&mut image, channel) = to_plane(&values);
            }
        }

        image.alpha = match self.channel_values(Channel::Alpha, data)? {
            Some(alpha) => to_plane(&alpha),
            None => finite.mapv(|f| if f { 255 } else { 0 }),
        };
        Ok(image)
    }
}
