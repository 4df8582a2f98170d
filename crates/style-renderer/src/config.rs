//! Declarative style configuration documents.
//!
//! A [`StyleConfig`] holds every style of a layer keyed by name. Each
//! [`StyleDocument`] mirrors the keys an operator writes; which strategy a
//! document describes is decided by the [`StyleFactory`](crate::StyleFactory).

use std::collections::BTreeMap;
use std::path::Path;

use raster_common::{StyleError, StyleResult};
use serde::{Deserialize, Serialize};

use crate::band_math::{FunctionConfig, ScaleRange};
use crate::color::Channel;
use crate::flags::FlagPredicate;
use crate::masks::Mask;

/// Style configuration loaded from JSON or YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StyleConfig {
    pub version: String,
    pub styles: BTreeMap<String, StyleDocument>,
}

impl StyleConfig {
    /// Load style configuration from JSON string
    pub fn from_json(json_str: &str) -> StyleResult<Self> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Load style configuration from YAML string
    pub fn from_yaml(yaml_str: &str) -> StyleResult<Self> {
        serde_yaml::from_str(yaml_str).map_err(|e| StyleError::Parse(e.to_string()))
    }

    /// Load style configuration from file; `.yaml`/`.yml` files are read as
    /// YAML, anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> StyleResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    /// Get a specific style document
    pub fn get_style(&self, name: &str) -> Option<&StyleDocument> {
        self.styles.get(name)
    }
}

fn default_alpha() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// One style as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StyleDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_: String,

    /// Extra bands to fetch beyond those the style references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needed_bands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pq_masks: Vec<Mask>,
    #[serde(default)]
    pub legend: LegendConfig,
    #[serde(default = "default_true")]
    pub include_in_feature_info: bool,

    // Linear
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<BTreeMap<Channel, ComponentConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_range: Option<ScaleRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,

    // Value map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_map: Option<BTreeMap<String, Vec<ValueMapRuleConfig>>>,

    // Ramp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_function: Option<FunctionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_ramp: Option<Vec<RampPointConfig>>,
    #[serde(default, alias = "mpl_ramp", skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ScaleRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_date: Vec<MultiDateConfig>,

    // Hybrid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_ratio: Option<f64>,
}

impl StyleDocument {
    pub fn from_json(json_str: &str) -> StyleResult<Self> {
        Ok(serde_json::from_str(json_str)?)
    }

    pub fn has_ramp_block(&self) -> bool {
        self.color_ramp.is_some() || self.palette.is_some() || self.range.is_some()
    }
}

/// Source of one linear output channel.
///
/// Either weighted bands (`{"red": 1.0}`) or a band function
/// (`{"function": "norm_diff", "kwargs": {...}}`), each with an optional
/// channel-specific `scale_range`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ComponentConfig {
    Function {
        #[serde(flatten)]
        function: FunctionConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale_range: Option<ScaleRange>,
    },
    Bands {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale_range: Option<ScaleRange>,
        #[serde(flatten)]
        weights: BTreeMap<String, f64>,
    },
}

impl ComponentConfig {
    pub fn scale_range(&self) -> Option<ScaleRange> {
        match self {
            ComponentConfig::Function { scale_range, .. }
            | ComponentConfig::Bands { scale_range, .. } => *scale_range,
        }
    }
}

/// One value-map rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ValueMapRuleConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<FlagPredicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Matching pixels are withheld from later rules and left unpainted
    #[serde(default)]
    pub mask: bool,
}

/// Legend metadata on a ramp point.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PointLegend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Color stop for a ramp
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RampPointConfig {
    pub value: f64,
    pub color: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<PointLegend>,
}

/// Label overrides for legend ticks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TickLabel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Legend configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LegendConfig {
    /// Whether a legend is generated; the default depends on the style type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_legend: Option<bool>,

    /// Externally hosted legend image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticks: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticks_every: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_count: Option<u32>,

    /// Multiplier applied to values before labelling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_places: Option<u32>,

    /// Per-tick overrides keyed by value, plus a `default` entry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tick_labels: BTreeMap<String, TickLabel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Special handling for requests spanning several time slices.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MultiDateConfig {
    pub allowed_count_range: [usize; 2],
    pub aggregator_function: FunctionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_ramp: Option<Vec<RampPointConfig>>,
    #[serde(default, alias = "mpl_ramp", skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ScaleRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_untagged() {
        let doc = StyleDocument::from_json(
            r#"{
                "components": {
                    "red": {"b4": 0.5, "b5": 0.5, "scale_range": [0, 100]},
                    "green": {"function": "single_band", "kwargs": {"band": "b3"}},
                    "blue": {"b2": 1}
                },
                "scale_range": [0, 3000]
            }"#,
        )
        .unwrap();
        let components = doc.components.unwrap();
        match &components[&Channel::Red] {
            ComponentConfig::Bands { scale_range, weights } => {
                assert_eq!(*scale_range, Some(ScaleRange::new(0.0, 100.0)));
                assert_eq!(weights.len(), 2);
            }
            other => panic!("expected weighted bands, got {:?}", other),
        }
        assert!(matches!(
            components[&Channel::Green],
            ComponentConfig::Function { .. }
        ));
        assert!(matches!(components[&Channel::Blue], ComponentConfig::Bands { .. }));
    }

    #[test]
    fn test_defaults() {
        let doc = StyleDocument::from_json(r#"{"range": [0, 1]}"#).unwrap();
        assert!(doc.include_in_feature_info);
        assert!(doc.has_ramp_block());
        assert!(doc.legend.show_legend.is_none());
    }

    #[test]
    fn test_mpl_ramp_alias() {
        let doc = StyleDocument::from_json(r#"{"mpl_ramp": "viridis", "range": [0, 1]}"#).unwrap();
        assert_eq!(doc.palette.as_deref(), Some("viridis"));
    }

    #[test]
    fn test_negative_zero_survives_parsing() {
        let doc = StyleDocument::from_json(
            r##"{"color_ramp": [{"value": -0.0, "color": "#000080", "alpha": 0.0}]}"##,
        )
        .unwrap();
        let value = doc.color_ramp.unwrap()[0].value;
        assert_eq!(value, 0.0);
        assert!(value.is_sign_negative());
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r##"
version: "1"
styles:
  ndvi:
    title: NDVI
    index_function:
      function: norm_diff
      kwargs: {band1: nir, band2: red}
    range: [-1, 1]
"##;
        let config = StyleConfig::from_yaml(yaml).unwrap();
        let doc = config.get_style("ndvi").unwrap();
        assert_eq!(doc.title, "NDVI");
        assert_eq!(doc.index_function.as_ref().unwrap().function, "norm_diff");
    }
}
