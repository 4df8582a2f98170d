//! Test data generators for creating synthetic multi-band rasters.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use raster_common::{Band, DataType, Dataset, RasterShape};

/// Creates a floating band from explicit values in `(time, y, x)` order.
///
/// # Panics
///
/// Panics if `values` does not fill `shape`.
pub fn float_band(shape: RasterShape, values: Vec<f64>) -> Band {
    Band::from_vec(shape, values).expect("values must fill the shape")
}

/// Creates an integer band of the given storage type.
pub fn typed_band(shape: RasterShape, values: Vec<f64>, dtype: DataType) -> Band {
    Band::from_vec_typed(shape, values, dtype).expect("values must fill the shape")
}

/// Creates a band filled with a constant value.
pub fn constant_band(shape: RasterShape, value: f64) -> Band {
    float_band(shape, vec![value; shape.pixel_count()])
}

/// Single-band, single-slice dataset laid out as one row.
///
/// # Example
///
/// ```
/// use test_utils::row_dataset;
///
/// let ds = row_dataset("ndvi", &[0.0, 0.5, 1.0]);
/// assert_eq!(ds.shape().width, 3);
/// ```
pub fn row_dataset(name: &str, values: &[f64]) -> Dataset {
    let shape = RasterShape::spatial(1, values.len());
    Dataset::new(shape)
        .with_band(name, float_band(shape, values.to_vec()))
        .expect("band matches dataset shape")
}

/// Dataset with several bands laid out as one row each.
///
/// # Panics
///
/// Panics if the bands differ in length.
pub fn row_bands(bands: &[(&str, &[f64])]) -> Dataset {
    let width = bands.first().map(|(_, v)| v.len()).unwrap_or(0);
    let shape = RasterShape::spatial(1, width);
    let mut ds = Dataset::new(shape);
    for (name, values) in bands {
        ds.insert(*name, float_band(shape, values.to_vec()))
            .expect("bands must share a length");
    }
    ds
}

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `time * 1_000_000 + col * 1000 + row`
///
/// This makes it easy to verify that a transform kept pixels in place.
pub fn create_test_grid(shape: RasterShape) -> Vec<f64> {
    let mut data = Vec::with_capacity(shape.pixel_count());
    for t in 0..shape.times {
        for row in 0..shape.height {
            for col in 0..shape.width {
                data.push((t * 1_000_000 + col * 1000 + row) as f64);
            }
        }
    }
    data
}

/// Creates a surface-reflectance-like dataset.
///
/// Bands `red`, `green`, `blue`, `nir` and `swir1` hold `uint16` values in
/// the 1..=3000 range with distinct gradients, so every band algebra result
/// is finite and non-trivial. Every band declares no-data 0, which no
/// generated pixel carries.
pub fn create_reflectance_dataset(width: usize, height: usize) -> Dataset {
    let shape = RasterShape::spatial(height, width);
    let mut ds = Dataset::new(shape);

    let gradient = |scale_x: f64, scale_y: f64, base: f64| -> Vec<f64> {
        let mut data = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                let x = col as f64 / width.max(1) as f64;
                let y = row as f64 / height.max(1) as f64;
                data.push((base + x * scale_x + y * scale_y).round().clamp(1.0, 3000.0));
            }
        }
        data
    };

    let bands = [
        ("red", gradient(1500.0, 500.0, 200.0)),
        ("green", gradient(800.0, 800.0, 300.0)),
        ("blue", gradient(400.0, 1200.0, 250.0)),
        ("nir", gradient(500.0, 2000.0, 900.0)),
        ("swir1", gradient(1000.0, 1000.0, 600.0)),
    ];
    for (name, values) in bands {
        let band = typed_band(shape, values, DataType::UInt16).with_nodata(0.0);
        ds.insert(name, band).expect("generated band matches shape");
    }
    ds
}

/// Creates a grid with deterministic pseudo-random bit-packed quality values.
///
/// Roughly one pixel in four has the cloud bit set and one in eight the
/// cloud-shadow bit; see [`crate::fixtures::standard_pq_flags`].
pub fn create_pq_values(shape: RasterShape, seed: u32) -> Vec<f64> {
    let mut data = Vec::with_capacity(shape.pixel_count());
    for t in 0..shape.times {
        for row in 0..shape.height {
            for col in 0..shape.width {
                let hash = simple_hash(col as u32, row as u32, seed.wrapping_add(t as u32));
                let mut bits = 0u32;
                if hash % 4 == 0 {
                    bits |= 1 << 1;
                }
                if hash % 8 == 3 {
                    bits |= 1 << 2;
                }
                data.push(bits as f64);
            }
        }
    }
    data
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}
