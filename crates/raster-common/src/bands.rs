//! Band alias resolution.
//!
//! Styles may refer to bands by human-friendly aliases ("nir", "swir1").
//! The resolver maps them to the canonical names the data provider uses.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Maps an alias to a canonical band name.
pub trait BandResolver: Send + Sync {
    fn resolve(&self, alias: &str) -> Option<String>;
}

/// Resolves every name to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl BandResolver for IdentityResolver {
    fn resolve(&self, alias: &str) -> Option<String> {
        Some(alias.to_string())
    }
}

/// Table of canonical band names and their aliases.
///
/// Canonical names always resolve to themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "HashMap<String, Vec<String>>", into = "HashMap<String, Vec<String>>")]
pub struct BandIndex {
    canonical: BTreeSet<String>,
    aliases: HashMap<String, String>,
}

impl BandIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canonical band with its aliases.
    pub fn add_band<I, S>(&mut self, canonical: &str, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.canonical.insert(canonical.to_string());
        for alias in aliases {
            self.aliases.insert(alias.into(), canonical.to_string());
        }
    }

    pub fn with_band<I, S>(mut self, canonical: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_band(canonical, aliases);
        self
    }

    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.canonical.iter().map(String::as_str)
    }
}

impl BandResolver for BandIndex {
    fn resolve(&self, alias: &str) -> Option<String> {
        if self.canonical.contains(alias) {
            return Some(alias.to_string());
        }
        self.aliases.get(alias).cloned()
    }
}

impl From<HashMap<String, Vec<String>>> for BandIndex {
    fn from(table: HashMap<String, Vec<String>>) -> Self {
        let mut index = BandIndex::new();
        for (canonical, aliases) in table {
            index.add_band(&canonical, aliases);
        }
        index
    }
}

impl From<BandIndex> for HashMap<String, Vec<String>> {
    fn from(index: BandIndex) -> Self {
        let mut table: HashMap<String, Vec<String>> = index
            .canonical
            .iter()
            .map(|c| (c.clone(), Vec::new()))
            .collect();
        for (alias, canonical) in index.aliases {
            table.entry(canonical).or_default().push(alias);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        let index = BandIndex::new()
            .with_band("nbart_nir", ["nir", "near_infrared"])
            .with_band("nbart_red", ["red"]);
        assert_eq!(index.resolve("nir").as_deref(), Some("nbart_nir"));
        assert_eq!(index.resolve("near_infrared").as_deref(), Some("nbart_nir"));
        assert_eq!(index.resolve("nbart_red").as_deref(), Some("nbart_red"));
        assert_eq!(index.resolve("blue"), None);
    }

    #[test]
    fn test_parse_from_json_table() {
        let index: BandIndex =
            serde_json::from_str(r#"{"nbart_green": ["green"], "fmask": []}"#).unwrap();
        assert_eq!(index.resolve("green").as_deref(), Some("nbart_green"));
        assert_eq!(index.resolve("fmask").as_deref(), Some("fmask"));
    }

    #[test]
    fn test_identity() {
        assert_eq!(IdentityResolver.resolve("anything").as_deref(), Some("anything"));
    }
}
