//! Masking applied to input data before any colour computation.
//!
//! Two kinds of mask exist: an externally supplied extent mask marking
//! pixels outside the valid footprint, and pixel-quality masks evaluated
//! from bit flags. The extent mask is applied first, while every band still
//! carries its original no-data value.

use ndarray::{Array3, Zip};
use raster_common::{DataType, Dataset, ExtentMask, RasterShape, StyleResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::flags::FlagPredicate;

/// A flag test against one pixel-quality band.
///
/// Pixels pass when the predicate holds, or when it does not hold and
/// `invert` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub band: String,
    pub flags: FlagPredicate,
    #[serde(default)]
    pub invert: bool,
}

impl Mask {
    pub fn new(band: impl Into<String>, flags: FlagPredicate) -> Self {
        Self {
            band: band.into(),
            flags,
            invert: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }

    /// Boolean raster that is true where pixels pass this mask.
    pub fn evaluate(&self, pq: &Dataset) -> StyleResult<Array3<bool>> {
        let band = pq.require(&self.band)?;
        let mut passes = self.flags.evaluate(&self.band, band)?;
        if self.invert {
            passes.mapv_inplace(|p| !p);
        }
        Ok(passes)
    }
}

/// Set every band's pixels outside `extent` to the band's no-data value, or
/// NaN when it declares none.
pub fn apply_extent(data: &mut Dataset, extent: &ExtentMask) -> StyleResult<()> {
    data.check_aligned(RasterShape::of(extent))?;
    for (_, band) in data.bands_mut() {
        let invalid = band.invalid_value();
        band.mask_where(extent, invalid);
    }
    Ok(())
}

/// AND of every mask evaluated against the pixel-quality dataset.
pub fn combine_masks(masks: &[Mask], pq: &Dataset) -> StyleResult<Option<Array3<bool>>> {
    let mut combined: Option<Array3<bool>> = None;
    for mask in masks {
        let passes = mask.evaluate(pq)?;
        combined = Some(match combined {
            None => passes,
            Some(mut acc) => {
                Zip::from(&mut acc).and(&passes).for_each(|a, &p| *a = *a && p);
                acc
            }
        });
    }
    Ok(combined)
}

/// Apply the extent mask, then the pixel-quality masks, to a working copy
/// of the data.
///
/// Pixels failing the combined quality mask become NaN in every band, and
/// integer bands are retyped as `Float64` since they can no longer hold
/// their values exactly. Applying the same masks twice gives the same
/// result as applying them once.
pub fn apply_masks(
    mut data: Dataset,
    masks: &[Mask],
    pq: Option<&Dataset>,
    extent: Option<&ExtentMask>,
) -> StyleResult<Dataset> {
    if let Some(extent) = extent {
        apply_extent(&mut data, extent)?;
    }

    let pq = match pq {
        Some(pq) if !masks.is_empty() => pq,
        _ => return Ok(data),
    };
    data.check_aligned(pq.shape())?;

    if let Some(keep) = combine_masks(masks, pq)? {
        let dropped = keep.iter().filter(|k| !**k).count();
        debug!(masks = masks.len(), dropped, "Applying pixel quality masks");
        for (_, band) in data.bands_mut() {
            band.mask_where(&keep, f64::NAN);
            if !band.dtype.is_float() {
                band.dtype = DataType::Float64;
            }
        }
    }
    Ok(data)
}
