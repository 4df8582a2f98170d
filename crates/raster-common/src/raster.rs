//! In-memory raster tensors.
//!
//! Every band is stored as an `Array3<f64>` with axes `(time, y, x)`. A
//! dataset without a time dimension simply has one time slice. The band's
//! [`DataType`] records the storage type it was read as, which decides
//! integer vs floating semantics (bit flags, no-data sentinels, promotion
//! before subtraction).

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array3, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{StyleError, StyleResult};
use crate::flags::FlagsDefinition;

/// Boolean validity raster aligned with a dataset's `(time, y, x)` shape.
pub type ExtentMask = Array3<bool>;

/// Dimensions of a raster tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterShape {
    pub times: usize,
    pub height: usize,
    pub width: usize,
}

impl RasterShape {
    pub fn new(times: usize, height: usize, width: usize) -> Self {
        Self {
            times,
            height,
            width,
        }
    }

    /// A single time slice.
    pub fn spatial(height: usize, width: usize) -> Self {
        Self::new(1, height, width)
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.times, self.height, self.width)
    }

    pub fn of<T>(array: &Array3<T>) -> Self {
        let (times, height, width) = array.dim();
        Self::new(times, height, width)
    }

    pub fn pixel_count(&self) -> usize {
        self.times * self.height * self.width
    }
}

impl fmt::Display for RasterShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.times, self.height, self.width)
    }
}

/// Storage type of a band as delivered by the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, DataType::UInt8 | DataType::UInt16 | DataType::UInt32)
    }

    /// Signed type wide enough to hold the difference of two values of this type.
    pub fn promote_signed(&self) -> DataType {
        match self {
            DataType::UInt8 => DataType::Int16,
            DataType::UInt16 => DataType::Int32,
            DataType::UInt32 => DataType::Int64,
            other => *other,
        }
    }

    fn width(&self) -> u8 {
        match self {
            DataType::UInt8 | DataType::Int8 => 8,
            DataType::UInt16 | DataType::Int16 => 16,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 32,
            DataType::Int64 | DataType::Float64 => 64,
        }
    }

    /// Result type of arithmetic combining two bands.
    pub fn combine(&self, other: &DataType) -> DataType {
        if self.is_float() || other.is_float() {
            return DataType::Float64;
        }
        let (a, b) = (self.promote_signed(), other.promote_signed());
        if a.width() >= b.width() {
            a
        } else {
            b
        }
    }
}

/// A single named raster layer.
#[derive(Debug, Clone)]
pub struct Band {
    pub data: Array3<f64>,
    pub dtype: DataType,
    pub nodata: Option<f64>,
    pub flags: Option<FlagsDefinition>,
}

impl Band {
    pub fn new(data: Array3<f64>, dtype: DataType) -> Self {
        Self {
            data,
            dtype,
            nodata: None,
            flags: None,
        }
    }

    /// Floating band from raw values in `(time, y, x)` order.
    pub fn from_vec(shape: RasterShape, values: Vec<f64>) -> StyleResult<Self> {
        Self::from_vec_typed(shape, values, DataType::Float64)
    }

    pub fn from_vec_typed(
        shape: RasterShape,
        values: Vec<f64>,
        dtype: DataType,
    ) -> StyleResult<Self> {
        let actual = values.len();
        let data = Array3::from_shape_vec(shape.dim(), values).map_err(|_| {
            StyleError::ShapeMismatch {
                expected: format!("{} values for {}", shape.pixel_count(), shape),
                actual: format!("{} values", actual),
            }
        })?;
        Ok(Self::new(data, dtype))
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_flags(mut self, flags: FlagsDefinition) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn shape(&self) -> RasterShape {
        RasterShape::of(&self.data)
    }

    /// Value written to pixels that fail an extent check.
    pub fn invalid_value(&self) -> f64 {
        self.nodata.unwrap_or(f64::NAN)
    }

    /// Derived band sharing this band's shape but carrying new values.
    pub fn derived(&self, data: Array3<f64>, dtype: DataType) -> Self {
        Self {
            data,
            dtype,
            nodata: self.nodata,
            flags: None,
        }
    }

    /// One time slice as a 2-D view.
    pub fn slice(&self, time: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), time)
    }

    /// Replace every pixel where `keep` is false with `value`.
    pub fn mask_where(&mut self, keep: &Array3<bool>, value: f64) {
        Zip::from(&mut self.data).and(keep).for_each(|v, &k| {
            if !k {
                *v = value;
            }
        });
    }
}

/// A set of co-registered bands sharing one shape.
#[derive(Debug, Clone)]
pub struct Dataset {
    shape: RasterShape,
    bands: BTreeMap<String, Band>,
}

impl Dataset {
    pub fn new(shape: RasterShape) -> Self {
        Self {
            shape,
            bands: BTreeMap::new(),
        }
    }

    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    /// Add or replace a band; its shape must match the dataset.
    pub fn insert(&mut self, name: impl Into<String>, band: Band) -> StyleResult<()> {
        let actual = band.shape();
        if actual != self.shape {
            return Err(StyleError::ShapeMismatch {
                expected: self.shape.to_string(),
                actual: actual.to_string(),
            });
        }
        self.bands.insert(name.into(), band);
        Ok(())
    }

    pub fn with_band(mut self, name: impl Into<String>, band: Band) -> StyleResult<Self> {
        self.insert(name, band)?;
        Ok(self)
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.get(name)
    }

    /// Like [`Dataset::band`] but reports a missing band as an error.
    pub fn require(&self, name: &str) -> StyleResult<&Band> {
        self.bands
            .get(name)
            .ok_or_else(|| StyleError::MissingBand(name.to_string()))
    }

    pub fn band_mut(&mut self, name: &str) -> Option<&mut Band> {
        self.bands.get_mut(name)
    }

    pub fn bands(&self) -> impl Iterator<Item = (&String, &Band)> {
        self.bands.iter()
    }

    pub fn bands_mut(&mut self) -> impl Iterator<Item = (&String, &mut Band)> {
        self.bands.iter_mut()
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Check that an auxiliary raster lines up with this dataset.
    pub fn check_aligned(&self, other: RasterShape) -> StyleResult<()> {
        if other != self.shape {
            return Err(StyleError::ShapeMismatch {
                expected: self.shape.to_string(),
                actual: other.to_string(),
            });
        }
        Ok(())
    }
}

/// Rendered 8-bit image, one plane per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaRaster {
    pub red: Array3<u8>,
    pub green: Array3<u8>,
    pub blue: Array3<u8>,
    pub alpha: Array3<u8>,
}

impl RgbaRaster {
    /// Fully transparent raster.
    pub fn transparent(shape: RasterShape) -> Self {
        Self {
            red: Array3::zeros(shape.dim()),
            green: Array3::zeros(shape.dim()),
            blue: Array3::zeros(shape.dim()),
            alpha: Array3::zeros(shape.dim()),
        }
    }

    pub fn shape(&self) -> RasterShape {
        RasterShape::of(&self.red)
    }

    /// RGBA tuple at one pixel.
    pub fn pixel(&self, time: usize, y: usize, x: usize) -> [u8; 4] {
        let idx = (time, y, x);
        [
            self.red[idx],
            self.green[idx],
            self.blue[idx],
            self.alpha[idx],
        ]
    }

    /// Interleaved RGBA bytes for one time slice, row-major.
    pub fn to_rgba_bytes(&self, time: usize) -> Vec<u8> {
        let shape = self.shape();
        let mut pixels = Vec::with_capacity(shape.height * shape.width * 4);
        for y in 0..shape.height {
            for x in 0..shape.width {
                pixels.extend_from_slice(&self.pixel(time, y, x));
            }
        }
        pixels
    }
}
