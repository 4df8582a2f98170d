//! Discrete classification by ordered flag and value rules.

use std::collections::BTreeSet;

use ndarray::{Array3, Zip};
use raster_common::{Band, Dataset, RgbaRaster, StyleError, StyleResult};

use super::{BuildContext, StyleDefinition};
use crate::color::{unit_to_byte, Rgb};
use crate::config::{StyleDocument, ValueMapRuleConfig};
use crate::flags::FlagPredicate;

/// What a rule matches.
#[derive(Debug, Clone, PartialEq)]
pub enum RulePredicate {
    Flags(FlagPredicate),
    Values(BTreeSet<i64>),
}

impl RulePredicate {
    fn evaluate(&self, band_name: &str, band: &Band, data: &Array3<f64>) -> StyleResult<Array3<bool>> {
        match self {
            RulePredicate::Flags(pred) => {
                let flags = band
                    .flags
                    .as_ref()
                    .ok_or_else(|| StyleError::MissingFlagDefinitions(band_name.to_string()))?;
                pred.evaluate_data(band_name, data, flags)
            }
            RulePredicate::Values(values) => {
                Ok(data.mapv(|v| v.is_finite() && values.contains(&(v as i64))))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueMapRule {
    pub title: String,
    pub abstract_: String,
    pub predicate: RulePredicate,
    pub color: Rgb,
    pub alpha: f64,
    /// Matching pixels are withheld from later rules and left unpainted
    pub consumes_only: bool,
}

impl ValueMapRule {
    fn from_config(style: &str, band: &str, config: &ValueMapRuleConfig) -> StyleResult<Self> {
        let predicate = match (&config.flags, &config.values) {
            (Some(flags), None) => RulePredicate::Flags(flags.clone()),
            (None, Some(values)) => RulePredicate::Values(values.iter().copied().collect()),
            (Some(_), Some(_)) => {
                return Err(StyleError::config(
                    style,
                    format!("value map rule on '{}' has both flags and values", band),
                ))
            }
            (None, None) => {
                return Err(StyleError::config(
                    style,
                    format!("value map rule on '{}' has neither flags nor values", band),
                ))
            }
        };

        let color = match (&config.color, config.mask) {
            (Some(c), _) => Rgb::parse(c)
                .ok_or_else(|| StyleError::config(style, format!("invalid colour '{}'", c)))?,
            (None, true) => Rgb::new(0.0, 0.0, 0.0),
            (None, false) => {
                return Err(StyleError::config(
                    style,
                    format!("value map rule on '{}' needs a colour", band),
                ))
            }
        };

        Ok(Self {
            title: config.title.clone(),
            abstract_: config.abstract_.clone(),
            predicate,
            color,
            alpha: config.alpha,
            consumes_only: config.mask,
        })
    }

    /// Rules with both a title and an abstract get a legend patch.
    pub fn has_legend_entry(&self) -> bool {
        !self.title.is_empty() && !self.abstract_.is_empty()
    }

    pub fn legend_label(&self) -> String {
        format!("{} - {}", self.title, self.abstract_)
    }
}

#[derive(Debug, Clone)]
pub struct ValueMapStyle {
    base: StyleDefinition,
    /// Rules per band, in the order bands are painted
    value_map: Vec<(String, Vec<ValueMapRule>)>,
}

impl ValueMapStyle {
    pub fn from_document(name: &str, doc: &StyleDocument, ctx: &BuildContext<'_>) -> StyleResult<Self> {
        let mut base = StyleDefinition::from_document(name, doc, ctx, true)?;
        let configs = doc
            .value_map
            .as_ref()
            .ok_or_else(|| base.config_error("value_map is required"))?;

        let mut value_map = Vec::with_capacity(configs.len());
        for (alias, rules) in configs {
            let band = ctx.resolve_band(name, alias)?;
            let rules = rules
                .iter()
                .map(|r| ValueMapRule::from_config(name, alias, r))
                .collect::<StyleResult<Vec<_>>>()?;
            value_map.push((band, rules));
        }
        base.add_bands(value_map.iter().map(|(b, _)| b.as_str()));

        Ok(Self { base, value_map })
    }

    pub fn definition(&self) -> &StyleDefinition {
        &self.base
    }

    pub fn value_map(&self) -> &[(String, Vec<ValueMapRule>)] {
        &self.value_map
    }

    /// Paint each band's rules in declared order. A pixel keeps the colour
    /// of the first rule that matches it; unpainted pixels are transparent.
    pub fn render(&self, data: &Dataset) -> StyleResult<RgbaRaster> {
        let shape = data.shape();
        let mut image = RgbaRaster::transparent(shape);
        let mut painted = Array3::from_elem(shape.dim(), false);

        for (band_name, rules) in &self.value_map {
            let band = data.require(band_name)?;
            // Flag tests need integer semantics.
            let mut working = band.data.mapv(|v| if v.is_finite() { v.trunc() } else { f64::NAN });

            for rule in rules {
                let matches = rule.predicate.evaluate(band_name, band, &working)?;
                if rule.consumes_only {
                    Zip::from(&mut working).and(&matches).for_each(|w, &m| {
                        if m {
                            *w = f64::NAN;
                        }
                    });
                    continue;
                }

                let [r, g, b] = rule.color.to_u8();
                let a = unit_to_byte(rule.alpha);
                Zip::indexed(&matches)
                    .and(&working)
                    .for_each(|idx, &m, &w| {
                        if m && w.is_finite() && !painted[idx] {
                            painted[idx] = true;
                            image.red[idx] = r;
                            image.green[idx] = g;
                            image.blue[idx] = b;
                            image.alpha[idx] = a;
                        }
                    });
            }
        }
        Ok(image)
    }
}
