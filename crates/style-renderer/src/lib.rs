//! Raster style rendering.
//!
//! Turns multi-band, multi-time raster data into RGBA images according to
//! declarative style documents, and draws matching legend images.
//!
//! ```text
//! StyleConfig --StyleFactory--> Style --transform(data, pq, extent)--> RgbaRaster --png--> bytes
//!                                  \--LegendRenderer--> Legend
//! ```

pub mod band_math;
pub mod color;
pub mod config;
pub mod factory;
pub mod flags;
pub mod legend;
pub mod masks;
pub mod palettes;
pub mod png;
pub mod style;

pub use band_math::{BandFunction, FunctionConfig, FunctionRegistry, ScaleRange};
pub use color::{Channel, Rgb};
pub use config::{LegendConfig, StyleConfig, StyleDocument};
pub use factory::{BuildReport, StyleFactory};
pub use flags::{FlagOp, FlagPredicate};
pub use legend::{Legend, LegendRenderer, LegendSettings};
pub use masks::Mask;
pub use style::{ColorRamp, Style, StyleDefinition, StyleKind};

pub use raster_common::{
    Band, BandIndex, BandResolver, DataType, Dataset, ExtentMask, IdentityResolver, RasterShape,
    RgbaRaster, StyleError, StyleResult,
};
