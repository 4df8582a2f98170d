//! Band algebra functions used to derive single-band indices.
//!
//! Every function is pure: it reads bands from a [`Dataset`] and returns a
//! new [`Band`]. Band names may be given as aliases when a [`BandResolver`]
//! is supplied.
//!
//! Styles refer to these functions declaratively:
//!
//! ```json
//! {"function": "norm_diff", "mapped_bands": true, "kwargs": {"band1": "nir", "band2": "red"}}
//! ```
//!
//! The [`FunctionRegistry`] turns such a document into a [`BandFunction`]
//! once, when the style is built.

use std::collections::HashMap;

use ndarray::{Array3, Axis, Zip};
use raster_common::{Band, BandResolver, DataType, Dataset, StyleError, StyleResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed numeric interval used for clipping and rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
}

impl ScaleRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Ranges must be finite with `min < max`.
    pub fn validate(&self) -> Result<(), String> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(format!("range [{}, {}] is not finite", self.min, self.max));
        }
        if self.min >= self.max {
            return Err(format!(
                "range minimum {} must be below maximum {}",
                self.min, self.max
            ));
        }
        Ok(())
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Clamp into the range; NaN passes through.
    #[inline]
    pub fn clip(&self, x: f64) -> f64 {
        if x < self.min {
            self.min
        } else if x > self.max {
            self.max
        } else {
            x
        }
    }

    /// Position of `x` within the range as a `[0, 1]` fraction, clipped.
    #[inline]
    pub fn normalize(&self, x: f64) -> f64 {
        (self.clip(x) - self.min) / self.span()
    }
}

impl From<[f64; 2]> for ScaleRange {
    fn from([min, max]: [f64; 2]) -> Self {
        Self::new(min, max)
    }
}

impl From<ScaleRange> for [f64; 2] {
    fn from(r: ScaleRange) -> Self {
        [r.min, r.max]
    }
}

/// Linear remapping from one range into another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    pub from: ScaleRange,
    pub to: ScaleRange,
}

impl Rescale {
    pub fn apply(&self, values: &Array3<f64>) -> Array3<f64> {
        scale_data(values, self.from, self.to)
    }
}

/// Clip to `from`, normalise, and map linearly into `to`.
pub fn scale_data(values: &Array3<f64>, from: ScaleRange, to: ScaleRange) -> Array3<f64> {
    values.mapv(|x| from.normalize(x) * to.span() + to.min)
}

/// Which slice is subtracted from which in [`multi_date_delta`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaDirection {
    /// Later slice minus earlier slice.
    #[default]
    Forward,
    /// Earlier slice minus later slice.
    Reverse,
}

fn lookup<'a>(
    data: &'a Dataset,
    band: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<&'a Band> {
    match mapper {
        Some(m) => {
            let canonical = m
                .resolve(band)
                .ok_or_else(|| StyleError::MissingBand(band.to_string()))?;
            data.require(&canonical)
        }
        None => data.require(band),
    }
}

fn combine<F>(a: &Array3<f64>, b: &Array3<f64>, f: F) -> Array3<f64>
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    Zip::from(a).and(b).par_map_collect(|&x, &y| f(x, y))
}

fn float_band(data: Array3<f64>) -> Band {
    Band::new(data, DataType::Float64)
}

/// `band1 + band2`
pub fn sum_bands(
    data: &Dataset,
    band1: &str,
    band2: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let b1 = lookup(data, band1, mapper)?;
    let b2 = lookup(data, band2, mapper)?;
    Ok(b1.derived(combine(&b1.data, &b2.data, |x, y| x + y), b1.dtype.combine(&b2.dtype)))
}

/// `band1 - band2`.
///
/// Unsigned operands are promoted to a signed type first so the declared
/// result type can hold negative differences. Values are held as `f64`, so
/// the promotion only changes the declared type; no-data is carried from
/// `band1`.
pub fn delta_bands(
    data: &Dataset,
    band1: &str,
    band2: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let b1 = lookup(data, band1, mapper)?;
    let b2 = lookup(data, band2, mapper)?;
    let dtype = b1.dtype.promote_signed().combine(&b2.dtype.promote_signed());
    Ok(b1.derived(combine(&b1.data, &b2.data, |x, y| x - y), dtype))
}

/// `band1 / band2`
pub fn band_quotient(
    data: &Dataset,
    band1: &str,
    band2: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let b1 = lookup(data, band1, mapper)?;
    let b2 = lookup(data, band2, mapper)?;
    Ok(float_band(combine(&b1.data, &b2.data, |x, y| x / y)))
}

/// `band1a / band1b + band2a / band2b`
pub fn band_quotient_sum(
    data: &Dataset,
    band1a: &str,
    band1b: &str,
    band2a: &str,
    band2b: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let q1 = band_quotient(data, band1a, band1b, mapper)?;
    let q2 = band_quotient(data, band2a, band2b, mapper)?;
    Ok(float_band(combine(&q1.data, &q2.data, |x, y| x + y)))
}

/// Normalised difference `(band1 - band2) / (band1 + band2)`, optionally
/// rescaled.
pub fn norm_diff(
    data: &Dataset,
    band1: &str,
    band2: &str,
    mapper: Option<&dyn BandResolver>,
    rescale: Option<Rescale>,
) -> StyleResult<Band> {
    let b1 = lookup(data, band1, mapper)?;
    let b2 = lookup(data, band2, mapper)?;
    let unscaled = combine(&b1.data, &b2.data, |x, y| (x - y) / (x + y));
    Ok(float_band(match rescale {
        Some(r) => r.apply(&unscaled),
        None => unscaled,
    }))
}

/// A raster of `value` shaped like `band`. Non-finite pixels stay non-finite.
pub fn constant(
    data: &Dataset,
    band: &str,
    value: f64,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let b = lookup(data, band, mapper)?;
    Ok(float_band(b.data.mapv(|x| x * 0.0 + value)))
}

/// The band unchanged.
pub fn single_band(
    data: &Dataset,
    band: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    lookup(data, band, mapper).cloned()
}

/// `scale_factor * (x^exponent - 1)`
pub fn single_band_log(
    data: &Dataset,
    band: &str,
    scale_factor: f64,
    exponent: f64,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let b = lookup(data, band, mapper)?;
    Ok(float_band(
        b.data.mapv(|x| scale_factor * (x.powf(exponent) - 1.0)),
    ))
}

/// `ln(x * scale + offset)`, or `ln(1 + x * scale)` without an offset.
pub fn single_band_offset_log(
    data: &Dataset,
    band: &str,
    scale: f64,
    offset: Option<f64>,
    rescale: Option<Rescale>,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let b = lookup(data, band, mapper)?;
    let unscaled = match offset {
        Some(offset) => b.data.mapv(|x| (x * scale + offset).ln()),
        None => b.data.mapv(|x| (x * scale).ln_1p()),
    };
    Ok(float_band(match rescale {
        Some(r) => r.apply(&unscaled),
        None => unscaled,
    }))
}

/// `acos(1 / (x + 1))`, optionally rescaled.
pub fn single_band_arcsec(
    data: &Dataset,
    band: &str,
    rescale: Option<Rescale>,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let b = lookup(data, band, mapper)?;
    let unscaled = b.data.mapv(|x| (1.0 / (x + 1.0)).acos());
    Ok(float_band(match rescale {
        Some(r) => r.apply(&unscaled),
        None => unscaled,
    }))
}

/// Radar vegetation index `4·hv² / (hh² + hv²)`.
pub fn radar_vegetation_index(
    data: &Dataset,
    band_hv: &str,
    band_hh: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let hv = lookup(data, band_hv, mapper)?;
    let hh = lookup(data, band_hh, mapper)?;
    Ok(float_band(combine(&hv.data, &hh.data, |v, h| {
        let (v2, h2) = (v * v, h * h);
        4.0 * v2 / (h2 + v2)
    })))
}

/// Normalised difference chlorophyll index, NaN wherever MNDWI(green, swir)
/// is not above 0.1.
pub fn sentinel2_ndci(
    data: &Dataset,
    red_edge: &str,
    red: &str,
    green: &str,
    swir: &str,
    mapper: Option<&dyn BandResolver>,
) -> StyleResult<Band> {
    let ndci = norm_diff(data, red_edge, red, mapper, None)?;
    let mndwi = norm_diff(data, green, swir, mapper, None)?;
    Ok(float_band(combine(&ndci.data, &mndwi.data, |n, w| {
        if w > 0.1 {
            n
        } else {
            f64::NAN
        }
    })))
}

/// Difference between the two time slices of `band`.
///
/// The result has a single time slice. Any slice count other than two is an
/// error.
pub fn multi_date_delta(band: &Band, direction: DeltaDirection) -> StyleResult<Band> {
    let shape = band.shape();
    if shape.times != 2 {
        return Err(StyleError::TimeSlices {
            expected: "exactly 2".to_string(),
            actual: shape.times,
        });
    }
    let first = band.slice(0);
    let second = band.slice(1);
    let delta = match direction {
        DeltaDirection::Forward => &second - &first,
        DeltaDirection::Reverse => &first - &second,
    };
    Ok(band.derived(delta.insert_axis(Axis(0)), band.dtype.promote_signed()))
}

// ============================================================================
// Declarative functions
// ============================================================================

/// A band function as written in a style document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfig {
    /// Registered function name
    pub function: String,

    /// Keyword arguments
    #[serde(default)]
    pub kwargs: Map<String, Value>,

    /// Whether band arguments are aliases to resolve
    #[serde(default)]
    pub mapped_bands: bool,
}

impl FunctionConfig {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            kwargs: Map::new(),
            mapped_bands: false,
        }
    }

    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.to_string(), value.into());
        self
    }

    pub fn mapped(mut self) -> Self {
        self.mapped_bands = true;
        self
    }
}

/// A band function with its arguments resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum BandFunction {
    Sum { band1: String, band2: String },
    Delta { band1: String, band2: String },
    Quotient { band1: String, band2: String },
    QuotientSum { band1a: String, band1b: String, band2a: String, band2b: String },
    NormDiff { band1: String, band2: String, rescale: Option<Rescale> },
    Constant { band: String, value: f64 },
    SingleBand { band: String },
    SingleBandLog { band: String, scale_factor: f64, exponent: f64 },
    SingleBandOffsetLog { band: String, scale: f64, offset: Option<f64>, rescale: Option<Rescale> },
    SingleBandArcsec { band: String, rescale: Option<Rescale> },
    RadarVegetationIndex { band_hv: String, band_hh: String },
    Sentinel2Ndci { red_edge: String, red: String, green: String, swir: String },
    MultiDateDelta { band: String, direction: DeltaDirection },
}

impl BandFunction {
    /// Every band this function reads.
    pub fn bands(&self) -> Vec<&str> {
        match self {
            BandFunction::Sum { band1, band2 }
            | BandFunction::Delta { band1, band2 }
            | BandFunction::Quotient { band1, band2 }
            | BandFunction::NormDiff { band1, band2, .. } => vec![band1, band2],
            BandFunction::QuotientSum { band1a, band1b, band2a, band2b } => {
                vec![band1a, band1b, band2a, band2b]
            }
            BandFunction::Constant { band, .. }
            | BandFunction::SingleBand { band }
            | BandFunction::SingleBandLog { band, .. }
            | BandFunction::SingleBandOffsetLog { band, .. }
            | BandFunction::SingleBandArcsec { band, .. }
            | BandFunction::MultiDateDelta { band, .. } => vec![band],
            BandFunction::RadarVegetationIndex { band_hv, band_hh } => vec![band_hv, band_hh],
            BandFunction::Sentinel2Ndci { red_edge, red, green, swir } => {
                vec![red_edge, red, green, swir]
            }
        }
    }

    /// Compute the derived band. Band names are already canonical.
    pub fn evaluate(&self, data: &Dataset) -> StyleResult<Band> {
        match self {
            BandFunction::Sum { band1, band2 } => sum_bands(data, band1, band2, None),
            BandFunction::Delta { band1, band2 } => delta_bands(data, band1, band2, None),
            BandFunction::Quotient { band1, band2 } => band_quotient(data, band1, band2, None),
            BandFunction::QuotientSum { band1a, band1b, band2a, band2b } => {
                band_quotient_sum(data, band1a, band1b, band2a, band2b, None)
            }
            BandFunction::NormDiff { band1, band2, rescale } => {
                norm_diff(data, band1, band2, None, *rescale)
            }
            BandFunction::Constant { band, value } => constant(data, band, *value, None),
            BandFunction::SingleBand { band } => single_band(data, band, None),
            BandFunction::SingleBandLog { band, scale_factor, exponent } => {
                single_band_log(data, band, *scale_factor, *exponent, None)
            }
            BandFunction::SingleBandOffsetLog { band, scale, offset, rescale } => {
                single_band_offset_log(data, band, *scale, *offset, *rescale, None)
            }
            BandFunction::SingleBandArcsec { band, rescale } => {
                single_band_arcsec(data, band, *rescale, None)
            }
            BandFunction::RadarVegetationIndex { band_hv, band_hh } => {
                radar_vegetation_index(data, band_hv, band_hh, None)
            }
            BandFunction::Sentinel2Ndci { red_edge, red, green, swir } => {
                sentinel2_ndci(data, red_edge, red, green, swir, None)
            }
            BandFunction::MultiDateDelta { band, direction } => {
                multi_date_delta(data.require(band)?, *direction)
            }
        }
    }
}

/// Reduces a multi-slice index raster to a single slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    MultiDateDelta(DeltaDirection),
}

impl Aggregator {
    pub fn apply(&self, index: &Band) -> StyleResult<Band> {
        match self {
            Aggregator::MultiDateDelta(direction) => multi_date_delta(index, *direction),
        }
    }
}

/// Typed access to a function's keyword arguments.
pub struct FunctionArgs<'a> {
    style: &'a str,
    function: &'a str,
    kwargs: &'a Map<String, Value>,
    resolver: Option<&'a dyn BandResolver>,
}

impl<'a> FunctionArgs<'a> {
    pub fn new(
        style: &'a str,
        config: &'a FunctionConfig,
        resolver: Option<&'a dyn BandResolver>,
    ) -> Self {
        Self {
            style,
            function: &config.function,
            kwargs: &config.kwargs,
            resolver,
        }
    }

    fn error(&self, message: String) -> StyleError {
        StyleError::config(self.style, format!("{}: {}", self.function, message))
    }

    /// Required band argument, resolved to its canonical name when the
    /// function maps bands.
    pub fn band(&self, key: &str) -> StyleResult<String> {
        let alias = self
            .kwargs
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| self.error(format!("missing band argument '{}'", key)))?;
        match self.resolver {
            Some(r) => r
                .resolve(alias)
                .ok_or_else(|| self.error(format!("unknown band alias '{}'", alias))),
            None => Ok(alias.to_string()),
        }
    }

    pub fn opt_f64(&self, key: &str) -> StyleResult<Option<f64>> {
        match self.kwargs.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.error(format!("'{}' must be a number", key))),
        }
    }

    pub fn f64(&self, key: &str) -> StyleResult<f64> {
        self.opt_f64(key)?
            .ok_or_else(|| self.error(format!("missing numeric argument '{}'", key)))
    }

    pub fn opt_str(&self, key: &str) -> StyleResult<Option<&'a str>> {
        match self.kwargs.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| self.error(format!("'{}' must be a string", key))),
        }
    }

    fn range(&self, key: &str) -> StyleResult<Option<ScaleRange>> {
        match self.kwargs.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => {
                let range: ScaleRange = serde_json::from_value(v.clone())
                    .map_err(|_| self.error(format!("'{}' must be a [min, max] pair", key)))?;
                range.validate().map_err(|e| self.error(format!("'{}': {}", key, e)))?;
                Ok(Some(range))
            }
        }
    }

    /// Optional `scale_from`/`scale_to` pair. `scale_to` defaults to `[0, 255]`.
    pub fn rescale(&self) -> StyleResult<Option<Rescale>> {
        let from = self.range("scale_from")?;
        let to = self.range("scale_to")?;
        match (from, to) {
            (Some(from), to) => Ok(Some(Rescale {
                from,
                to: to.unwrap_or(ScaleRange::new(0.0, 255.0)),
            })),
            (None, Some(_)) => Err(self.error("'scale_to' given without 'scale_from'".into())),
            (None, None) => Ok(None),
        }
    }

    pub fn direction(&self) -> StyleResult<DeltaDirection> {
        match self.opt_str("direction")? {
            None | Some("forward") => Ok(DeltaDirection::Forward),
            Some("reverse") => Ok(DeltaDirection::Reverse),
            Some(other) => Err(self.error(format!("unknown direction '{}'", other))),
        }
    }
}

/// Builds a [`BandFunction`] from keyword arguments.
pub type FunctionBuilder = fn(&FunctionArgs<'_>) -> StyleResult<BandFunction>;

/// Lookup table from function names to builders.
#[derive(Clone)]
pub struct FunctionRegistry {
    builders: HashMap<String, FunctionBuilder>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.builders.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry holding every built-in band function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("sum_bands", |a| {
            Ok(BandFunction::Sum { band1: a.band("band1")?, band2: a.band("band2")? })
        });
        registry.register("delta_bands", |a| {
            Ok(BandFunction::Delta { band1: a.band("band1")?, band2: a.band("band2")? })
        });
        registry.register("band_quotient", |a| {
            Ok(BandFunction::Quotient { band1: a.band("band1")?, band2: a.band("band2")? })
        });
        registry.register("band_quotient_sum", |a| {
            Ok(BandFunction::QuotientSum {
                band1a: a.band("band1a")?,
                band1b: a.band("band1b")?,
                band2a: a.band("band2a")?,
                band2b: a.band("band2b")?,
            })
        });
        registry.register("norm_diff", |a| {
            Ok(BandFunction::NormDiff {
                band1: a.band("band1")?,
                band2: a.band("band2")?,
                rescale: a.rescale()?,
            })
        });
        registry.register("constant", |a| {
            Ok(BandFunction::Constant { band: a.band("band")?, value: a.f64("const")? })
        });
        registry.register("single_band", |a| {
            Ok(BandFunction::SingleBand { band: a.band("band")? })
        });
        registry.register("single_band_log", |a| {
            Ok(BandFunction::SingleBandLog {
                band: a.band("band")?,
                scale_factor: a.f64("scale_factor")?,
                exponent: a.f64("exponent")?,
            })
        });
        registry.register("single_band_offset_log", |a| {
            Ok(BandFunction::SingleBandOffsetLog {
                band: a.band("band")?,
                scale: a.opt_f64("scale")?.unwrap_or(1.0),
                offset: a.opt_f64("offset")?,
                rescale: a.rescale()?,
            })
        });
        registry.register("single_band_arcsec", |a| {
            Ok(BandFunction::SingleBandArcsec { band: a.band("band")?, rescale: a.rescale()? })
        });
        registry.register("radar_vegetation_index", |a| {
            Ok(BandFunction::RadarVegetationIndex {
                band_hv: a.band("band_hv")?,
                band_hh: a.band("band_hh")?,
            })
        });
        registry.register("sentinel2_ndci", |a| {
            Ok(BandFunction::Sentinel2Ndci {
                red_edge: a.band("b_red_edge")?,
                red: a.band("b_red")?,
                green: a.band("b_green")?,
                swir: a.band("b_swir")?,
            })
        });
        registry.register("multi_date_delta", |a| {
            Ok(BandFunction::MultiDateDelta { band: a.band("band")?, direction: a.direction()? })
        });
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, builder: FunctionBuilder) {
        self.builders.insert(name.into(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Resolve a function document into a [`BandFunction`].
    ///
    /// Band arguments pass through `resolver` when the document sets
    /// `mapped_bands`.
    pub fn build(
        &self,
        style: &str,
        config: &FunctionConfig,
        resolver: &dyn BandResolver,
    ) -> StyleResult<BandFunction> {
        let builder = self
            .builders
            .get(&config.function)
            .ok_or_else(|| StyleError::UnknownFunction(config.function.clone()))?;
        let resolver = config.mapped_bands.then_some(resolver);
        builder(&FunctionArgs::new(style, config, resolver))
    }

    /// Resolve a multi-date aggregator document.
    pub fn build_aggregator(&self, style: &str, config: &FunctionConfig) -> StyleResult<Aggregator> {
        let args = FunctionArgs::new(style, config, None);
        match config.function.as_str() {
            "multi_date_delta" => Ok(Aggregator::MultiDateDelta(args.direction()?)),
            other => Err(StyleError::UnknownFunction(other.to_string())),
        }
    }
}
