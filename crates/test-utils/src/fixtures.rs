//! Common test fixtures for style rendering tests.
//!
//! This module provides pre-defined flag tables, pixel-quality datasets and
//! style configuration documents that represent common rendering scenarios.

use raster_common::{
    Band, DataType, Dataset, FlagBits, FlagDefinition, FlagValue, FlagsDefinition, RasterShape,
};

use crate::generators::typed_band;

/// Name of the pixel-quality band in [`pq_dataset`].
pub const PQ_BAND: &str = "fmask";

/// A Landsat-like quality flag table.
///
/// | flag | bits | values |
/// |------|------|--------|
/// | `nodata` | 0 | false/true |
/// | `cloud` | 1 | false/true |
/// | `cloud_shadow` | 2 | false/true |
/// | `water` | 3 | false/true |
/// | `snow` | 4 | false/true |
/// | `confidence` | 5-6 | "none", "low", "medium", "high" |
pub fn standard_pq_flags() -> FlagsDefinition {
    let mut flags = FlagsDefinition::new();
    flags.insert("nodata".into(), FlagDefinition::boolean(0));
    flags.insert("cloud".into(), FlagDefinition::boolean(1));
    flags.insert("cloud_shadow".into(), FlagDefinition::boolean(2));
    flags.insert("water".into(), FlagDefinition::boolean(3));
    flags.insert("snow".into(), FlagDefinition::boolean(4));
    flags.insert(
        "confidence".into(),
        FlagDefinition::new(FlagBits::Many(vec![5, 6]))
            .with_value(0, FlagValue::Text("none".into()))
            .with_value(1, FlagValue::Text("low".into()))
            .with_value(2, FlagValue::Text("medium".into()))
            .with_value(3, FlagValue::Text("high".into())),
    );
    flags
}

/// `uint8` band carrying [`standard_pq_flags`].
pub fn pq_band(shape: RasterShape, values: Vec<f64>) -> Band {
    typed_band(shape, values, DataType::UInt8).with_flags(standard_pq_flags())
}

/// Pixel-quality dataset with a single [`PQ_BAND`].
pub fn pq_dataset(shape: RasterShape, values: Vec<f64>) -> Dataset {
    Dataset::new(shape)
        .with_band(PQ_BAND, pq_band(shape, values))
        .expect("pq band matches shape")
}

/// Bit value of a flag in the standard table.
pub mod bits {
    pub const NODATA: f64 = 1.0;
    pub const CLOUD: f64 = 2.0;
    pub const CLOUD_SHADOW: f64 = 4.0;
    pub const WATER: f64 = 8.0;
    pub const SNOW: f64 = 16.0;
}

/// A linear true-colour style over the reflectance bands.
pub const TRUE_COLOUR_STYLE: &str = r##"{
    "title": "True colour",
    "abstract": "Red, green and blue bands",
    "components": {
        "red": {"red": 1.0},
        "green": {"green": 1.0},
        "blue": {"blue": 1.0}
    },
    "scale_range": [0, 3000],
    "pq_masks": [
        {"band": "fmask", "flags": {"cloud": false}}
    ]
}"##;

/// An NDVI ramp style.
pub const NDVI_STYLE: &str = r##"{
    "title": "NDVI",
    "abstract": "Normalised difference vegetation index",
    "index_function": {
        "function": "norm_diff",
        "mapped_bands": true,
        "kwargs": {"band1": "nir", "band2": "red"}
    },
    "color_ramp": [
        {"value": -0.0, "color": "#8F3F20", "alpha": 0.0},
        {"value": 0.0, "color": "#8F3F20", "alpha": 1.0},
        {"value": 0.1, "color": "#A35F18"},
        {"value": 0.3, "color": "#B88512"},
        {"value": 0.5, "color": "#9FB60F"},
        {"value": 0.7, "color": "#548D0C"},
        {"value": 1.0, "color": "#114D04"}
    ],
    "legend": {"units": "index", "tick_count": 2, "decimal_places": 1}
}"##;

/// A water classification value-map style on the quality band.
pub const WATER_CLASSES_STYLE: &str = r##"{
    "title": "Water classes",
    "abstract": "Water observation classification",
    "value_map": {
        "fmask": [
            {"title": "", "abstract": "", "flags": {"nodata": true}, "color": "#707070", "alpha": 0.0, "mask": true},
            {"title": "Cloud", "abstract": "Cloud or shadow", "flags": {"or": {"cloud": true, "cloud_shadow": true}}, "color": "#707070"},
            {"title": "Water", "abstract": "Open water", "flags": {"water": true}, "color": "#4F81BD"},
            {"title": "Dry", "abstract": "", "values": [0], "color": "#96966E"}
        ]
    }
}"##;
