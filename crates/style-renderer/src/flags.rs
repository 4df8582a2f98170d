//! Flag predicates over bit-packed pixel-quality bands.
//!
//! A predicate is written as a map of flag name → expected value. A flat map
//! requires every flag to match; a map holding only an `or` (or `and`) key
//! groups its entries explicitly:
//!
//! ```json
//! {"cloud": false, "nodata": false}
//! {"or": {"cloud": true, "cloud_shadow": true}}
//! ```

use std::collections::BTreeMap;

use ndarray::Array3;
use raster_common::{Band, FlagValue, FlagsDefinition, StyleError, StyleResult};
use serde::{Deserialize, Serialize};

/// How the terms of a predicate combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    And,
    Or,
}

/// A combination of flag equality tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, RawTerm>",
    into = "BTreeMap<String, RawTerm>"
)]
pub struct FlagPredicate {
    pub op: FlagOp,
    pub terms: Vec<(String, FlagValue)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTerm {
    Value(FlagValue),
    Group(BTreeMap<String, FlagValue>),
}

impl TryFrom<BTreeMap<String, RawTerm>> for FlagPredicate {
    type Error = String;

    fn try_from(raw: BTreeMap<String, RawTerm>) -> Result<Self, Self::Error> {
        if raw.len() == 1 {
            if let Some((key, RawTerm::Group(group))) = raw.iter().next() {
                let op = match key.as_str() {
                    "or" => FlagOp::Or,
                    "and" => FlagOp::And,
                    other => return Err(format!("unexpected flag group '{}'", other)),
                };
                let terms = group.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                return Ok(FlagPredicate { op, terms });
            }
        }

        let mut terms = Vec::with_capacity(raw.len());
        for (flag, term) in raw {
            match term {
                RawTerm::Value(v) => terms.push((flag, v)),
                RawTerm::Group(_) => {
                    return Err(format!(
                        "'{}' groups flags but is not the only key of the predicate",
                        flag
                    ))
                }
            }
        }
        Ok(FlagPredicate {
            op: FlagOp::And,
            terms,
        })
    }
}

impl From<FlagPredicate> for BTreeMap<String, RawTerm> {
    fn from(pred: FlagPredicate) -> Self {
        match pred.op {
            FlagOp::And => pred
                .terms
                .into_iter()
                .map(|(k, v)| (k, RawTerm::Value(v)))
                .collect(),
            FlagOp::Or => {
                let group = pred.terms.into_iter().collect();
                BTreeMap::from([("or".to_string(), RawTerm::Group(group))])
            }
        }
    }
}

impl FlagPredicate {
    pub fn all<I, S, V>(terms: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<FlagValue>,
    {
        Self {
            op: FlagOp::And,
            terms: terms.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn any<I, S, V>(terms: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<FlagValue>,
    {
        Self {
            op: FlagOp::Or,
            ..Self::all(terms)
        }
    }

    /// Evaluate against a band using the band's own flag definitions.
    pub fn evaluate(&self, band_name: &str, band: &Band) -> StyleResult<Array3<bool>> {
        let flags = band
            .flags
            .as_ref()
            .ok_or_else(|| StyleError::MissingFlagDefinitions(band_name.to_string()))?;
        self.evaluate_data(band_name, &band.data, flags)
    }

    /// Evaluate against raw pixel values with explicit flag definitions.
    ///
    /// Non-finite and negative pixels never match any term.
    pub fn evaluate_data(
        &self,
        band_name: &str,
        data: &Array3<f64>,
        flags: &FlagsDefinition,
    ) -> StyleResult<Array3<bool>> {
        let tests = self.resolve(band_name, flags)?;
        let op = self.op;
        Ok(data.mapv(|v| {
            if !v.is_finite() || v < 0.0 {
                return false;
            }
            let pixel = v as u64;
            let mut hits = tests
                .iter()
                .map(|&(mask, expected)| pixel & mask == expected);
            match op {
                FlagOp::And => hits.all(|h| h),
                FlagOp::Or => hits.any(|h| h),
            }
        }))
    }

    /// `(mask, expected)` pair for every term.
    fn resolve(&self, band_name: &str, flags: &FlagsDefinition) -> StyleResult<Vec<(u64, u64)>> {
        self.terms
            .iter()
            .map(|(flag, value)| {
                let def = flags.get(flag).ok_or_else(|| StyleError::UnknownFlag {
                    band: band_name.to_string(),
                    flag: flag.clone(),
                })?;
                let encoded = def.encode(value).ok_or_else(|| StyleError::InvalidFlagValue {
                    flag: flag.clone(),
                    value: value.to_string(),
                })?;
                def.field(encoded).ok_or_else(|| StyleError::InvalidFlagBits {
                    band: band_name.to_string(),
                    flag: flag.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_common::{DataType, FlagBits, FlagDefinition, RasterShape};

    fn quality_band(values: Vec<f64>) -> Band {
        let mut flags = FlagsDefinition::new();
        flags.insert("cloud".into(), FlagDefinition::boolean(0));
        flags.insert("shadow".into(), FlagDefinition::boolean(1));
        flags.insert(
            "level".into(),
            FlagDefinition::new(FlagBits::Many(vec![2, 3]))
                .with_value(0, "low".into())
                .with_value(3, "high".into()),
        );
        let shape = RasterShape::spatial(1, values.len());
        Band::from_vec_typed(shape, values, DataType::UInt8)
            .unwrap()
            .with_flags(flags)
    }

    fn as_vec(mask: &Array3<bool>) -> Vec<bool> {
        mask.iter().copied().collect()
    }

    #[test]
    fn test_parse_flat_and_groups() {
        let flat: FlagPredicate = serde_json::from_str(r#"{"cloud": true, "shadow": false}"#).unwrap();
        assert_eq!(flat.op, FlagOp::And);
        assert_eq!(flat.terms.len(), 2);

        let or: FlagPredicate =
            serde_json::from_str(r#"{"or": {"cloud": true, "shadow": true}}"#).unwrap();
        assert_eq!(or.op, FlagOp::Or);

        let and: FlagPredicate = serde_json::from_str(r#"{"and": {"cloud": true}}"#).unwrap();
        assert_eq!(and.op, FlagOp::And);

        let bad = serde_json::from_str::<FlagPredicate>(r#"{"or": {"cloud": true}, "shadow": true}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_and_or_evaluation() {
        // bit0 = cloud, bit1 = shadow
        let band = quality_band(vec![0.0, 1.0, 2.0, 3.0]);

        let both = FlagPredicate::all([("cloud", true), ("shadow", true)]);
        assert_eq!(
            as_vec(&both.evaluate("pq", &band).unwrap()),
            vec![false, false, false, true]
        );

        let either = FlagPredicate::any([("cloud", true), ("shadow", true)]);
        assert_eq!(
            as_vec(&either.evaluate("pq", &band).unwrap()),
            vec![false, true, true, true]
        );
    }

    #[test]
    fn test_multi_bit_label() {
        // level in bits 2-3: 0b1100 = high
        let band = quality_band(vec![0.0, 12.0, 13.0, 4.0]);
        let high = FlagPredicate::all([("level", "high")]);
        assert_eq!(
            as_vec(&high.evaluate("pq", &band).unwrap()),
            vec![false, true, true, false]
        );
    }

    #[test]
    fn test_nan_never_matches() {
        let band = quality_band(vec![f64::NAN, 1.0]);
        let clear = FlagPredicate::all([("cloud", false)]);
        assert_eq!(as_vec(&clear.evaluate("pq", &band).unwrap()), vec![false, false]);
    }

    #[test]
    fn test_unknown_flag_is_error() {
        let band = quality_band(vec![0.0]);
        let pred = FlagPredicate::all([("snow", true)]);
        let err = pred.evaluate("pq", &band).unwrap_err();
        assert!(matches!(err, StyleError::UnknownFlag { ref flag, .. } if flag == "snow"));
    }

    #[test]
    fn test_invalid_value_is_error() {
        let band = quality_band(vec![0.0]);
        let pred = FlagPredicate::all([("level", "medium")]);
        assert!(matches!(
            pred.evaluate("pq", &band).unwrap_err(),
            StyleError::InvalidFlagValue { .. }
        ));
    }

    #[test]
    fn test_bit_beyond_word_is_error() {
        let mut flags = FlagsDefinition::new();
        flags.insert("overflow".into(), FlagDefinition::new(FlagBits::Single(64)));
        let data = Array3::from_elem((1, 1, 1), 1.0);
        let pred = FlagPredicate::all([("overflow", FlagValue::Int(1))]);
        assert!(matches!(
            pred.evaluate_data("pq", &data, &flags).unwrap_err(),
            StyleError::InvalidFlagBits { ref flag, .. } if flag == "overflow"
        ));
    }

    #[test]
    fn test_missing_definitions_is_error() {
        let band = Band::from_vec(RasterShape::spatial(1, 1), vec![0.0]).unwrap();
        let pred = FlagPredicate::all([("cloud", true)]);
        assert!(matches!(
            pred.evaluate("red", &band).unwrap_err(),
            StyleError::MissingFlagDefinitions(_)
        ));
    }
}
