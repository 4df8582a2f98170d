//! Bit-field flag definitions attached to pixel-quality bands.
//!
//! A definition names a group of bits and the meaning of each encoded value:
//!
//! ```json
//! {
//!   "cloud": {"bits": [0, 1], "values": {"0": "clear", "1": "cloud", "2": "shadow"}},
//!   "nodata": {"bits": 7, "values": {"0": false, "1": true}}
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Flag name → bit-field definition for one band.
pub type FlagsDefinition = BTreeMap<String, FlagDefinition>;

/// Bits occupied by a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagBits {
    Single(u32),
    Many(Vec<u32>),
}

impl FlagBits {
    fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let bits: &[u32] = match self {
            FlagBits::Single(b) => std::slice::from_ref(b),
            FlagBits::Many(bs) => bs,
        };
        bits.iter().copied()
    }

    /// OR of `1 << bit` for every bit, or `None` when a bit does not fit in
    /// a 64-bit word.
    pub fn mask(&self) -> Option<u64> {
        self.iter()
            .try_fold(0u64, |acc, b| Some(acc | 1u64.checked_shl(b)?))
    }

    /// Lowest bit; encoded values are shifted by this amount.
    pub fn lowest(&self) -> u32 {
        self.iter().min().unwrap_or(0)
    }

    pub fn count(&self) -> u32 {
        self.iter().count() as u32
    }
}

/// A flag value as written in configuration: a boolean, an integer or a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(i) => write!(f, "{}", i),
            FlagValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::Text(s.to_string())
    }
}

/// Definition of a single flag within a bit-packed band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub bits: FlagBits,

    /// Encoded value → meaning
    #[serde(default)]
    pub values: BTreeMap<u64, FlagValue>,

    #[serde(default)]
    pub description: Option<String>,
}

impl FlagDefinition {
    pub fn new(bits: FlagBits) -> Self {
        Self {
            bits,
            values: BTreeMap::new(),
            description: None,
        }
    }

    /// Single-bit boolean flag.
    pub fn boolean(bit: u32) -> Self {
        Self::new(FlagBits::Single(bit))
            .with_value(0, FlagValue::Bool(false))
            .with_value(1, FlagValue::Bool(true))
    }

    pub fn with_value(mut self, encoded: u64, meaning: FlagValue) -> Self {
        self.values.insert(encoded, meaning);
        self
    }

    /// Largest value the bit field can hold.
    pub fn max_encoded(&self) -> u64 {
        let count = self.bits.count();
        if count >= 64 {
            u64::MAX
        } else {
            (1u64 << count) - 1
        }
    }

    /// Encoded integer for a requested value, if the definition allows it.
    ///
    /// Labels are matched first. Integers are accepted when they fit the bit
    /// width; booleans fall back to 0/1 on single-bit flags without labels.
    pub fn encode(&self, requested: &FlagValue) -> Option<u64> {
        if let Some((&encoded, _)) = self.values.iter().find(|(_, v)| *v == requested) {
            return Some(encoded);
        }
        match requested {
            FlagValue::Int(n) if *n >= 0 && (*n as u64) <= self.max_encoded() => Some(*n as u64),
            FlagValue::Bool(b) if self.values.is_empty() && self.bits.count() == 1 => {
                Some(u64::from(*b))
            }
            _ => None,
        }
    }

    /// Bit mask and expected masked pixel value for `encoded`.
    ///
    /// `None` when the bits or the shifted value fall outside a 64-bit word.
    pub fn field(&self, encoded: u64) -> Option<(u64, u64)> {
        let mask = self.bits.mask()?;
        let lowest = self.bits.lowest();
        let shifted = encoded.checked_shl(lowest)?;
        if shifted >> lowest != encoded {
            return None;
        }
        Some((mask, shifted))
    }

    /// Whether a raw pixel carries `encoded` in this flag's bits. Never true
    /// for a definition whose bits do not fit in 64 bits.
    pub fn matches(&self, pixel: u64, encoded: u64) -> bool {
        self.field(encoded)
            .map_or(false, |(mask, expected)| pixel & mask == expected)
    }
}
