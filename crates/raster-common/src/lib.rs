//! Common types shared by the raster styling crates.

pub mod bands;
pub mod error;
pub mod flags;
pub mod raster;

pub use bands::{BandIndex, BandResolver, IdentityResolver};
pub use error::{StyleError, StyleResult};
pub use flags::{FlagBits, FlagDefinition, FlagValue, FlagsDefinition};
pub use raster::{Band, DataType, Dataset, ExtentMask, RasterShape, RgbaRaster};
