//! Blend of a ramp style and a linear style.

use ndarray::Zip;
use raster_common::{Dataset, RgbaRaster, StyleError, StyleResult};

use super::{plane_mut, to_plane, BuildContext, LinearStyle, RampStyle, StyleDefinition};
use crate::color::Channel;
use crate::config::StyleDocument;

/// Channels with a linear component get
/// `ramp * 255 * (1 - ratio) + ratio * linear`; other channels take the
/// ramp alone. A ratio of 1 reproduces the linear style on finite data.
#[derive(Debug, Clone)]
pub struct HybridStyle {
    base: StyleDefinition,
    ramp: RampStyle,
    linear: LinearStyle,
    component_ratio: f64,
}

impl HybridStyle {
    pub fn from_document(name: &str, doc: &StyleDocument, ctx: &BuildContext<'_>) -> StyleResult<Self> {
        let mut base = StyleDefinition::from_document(name, doc, ctx, true)?;
        let component_ratio = doc
            .component_ratio
            .ok_or_else(|| base.config_error("component_ratio is required"))?;
        if !(0.0..=1.0).contains(&component_ratio) {
            return Err(base.config_error(format!(
                "component_ratio {} is outside [0, 1]",
                component_ratio
            )));
        }
        if doc.components.is_none() {
            return Err(base.config_error("hybrid styles need linear components"));
        }
        if !doc.multi_date.is_empty() {
            return Err(base.config_error("multi-date handlers are not supported on hybrid styles"));
        }

        let ramp = RampStyle::from_document(name, doc, ctx)?;
        let linear = LinearStyle::from_document(name, doc, ctx)?;
        base.add_bands(ramp.definition().needed_bands().iter().map(String::as_str));
        base.add_bands(linear.definition().needed_bands().iter().map(String::as_str));

        Ok(Self {
            base,
            ramp,
            linear,
            component_ratio,
        })
    }

    pub fn definition(&self) -> &StyleDefinition {
        &self.base
    }

    pub fn ramp_style(&self) -> &RampStyle {
        &self.ramp
    }

    pub fn linear_style(&self) -> &LinearStyle {
        &self.linear
    }

    pub fn component_ratio(&self) -> f64 {
        self.component_ratio
    }

    pub fn render(&self, data: &Dataset) -> StyleResult<RgbaRaster> {
        let index = self.ramp.index(data)?;
        // The linear half is computed per input slice, so the index has to
        // keep the input's shape.
        if index.shape() != data.shape() {
            return Err(StyleError::ShapeMismatch {
                expected: format!("index of shape {}", data.shape()),
                actual: index.shape().to_string(),
            });
        }
        let fractions = self.ramp.ramp().fractions(&index.data);
        let ratio = self.component_ratio;
        let mut image = RgbaRaster::transparent(data.shape());

        for (channel, ramp) in Channel::ALL.into_iter().zip(fractions) {
            let blended = match self.linear.channel_values(channel, data)? {
                Some(linear) => Zip::from(&ramp)
                    .and(&linear)
                    .map_collect(|&r, &l| r * 255.0 * (1.0 - ratio) + ratio * l),
                None => ramp * 255.0,
            };
            *plane_mut(&mut image, channel) = to_plane(&blended);
        }
        Ok(image)
    }
}
