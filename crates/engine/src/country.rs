use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use tracing::warn;

use crate::error::MatchError;

// ---------------------------------------------------------------------------
// Region alias table
// ---------------------------------------------------------------------------

/// One region entry: canonical name, optional short code, known aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub name: String,
    /// Canonical short code; falls back to `name` when absent.
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// The `[[regions]]` alias table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionTable {
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl RegionTable {
    pub fn from_toml(input: &str) -> Result<Self, MatchError> {
        toml::from_str(input).map_err(|e| MatchError::ConfigParse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Canonical country mapping
// ---------------------------------------------------------------------------

/// Lower-cased/trimmed alias → canonical short code.
#[derive(Debug, Clone, Default)]
pub struct CountryMap {
    mapping: HashMap<String, String>,
}

impl CountryMap {
    /// Empty map: normalization becomes a pass-through.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Register each entry's name, short code, and aliases under the
    /// entry's short code, every key trimmed and lower-cased. The same key
    /// registered under two different codes is rejected rather than letting
    /// load order decide.
    pub fn build(table: &RegionTable) -> Result<Self, MatchError> {
        let mut mapping: HashMap<String, String> = HashMap::new();

        for region in &table.regions {
            let code = canonical_key(region.short_name.as_deref().unwrap_or(&region.name));

            let keys = std::iter::once(region.name.as_str())
                .chain(region.short_name.as_deref())
                .chain(region.aliases.iter().map(String::as_str));

            for key in keys {
                let key = canonical_key(key);
                if key.is_empty() {
                    continue;
                }
                match mapping.get(&key) {
                    Some(existing) if *existing != code => {
                        return Err(MatchError::RegionConflict {
                            alias: key,
                            existing: existing.clone(),
                            conflicting: code,
                        });
                    }
                    _ => {
                        mapping.insert(key, code.clone());
                    }
                }
            }
        }

        Ok(Self { mapping })
    }

    /// Canonical code for a raw value, if one is registered.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        self.mapping.get(&canonical_key(raw)).map(String::as_str)
    }

    /// Normalize values in place; unmapped values pass through unchanged.
    /// Returns the distinct unmapped values and logs the first 10.
    pub fn normalize<'a, I>(&self, table: &str, values: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a mut String>,
    {
        let mut missing = BTreeSet::new();
        for value in values {
            match self.resolve(value) {
                Some(code) => *value = code.to_string(),
                None => {
                    missing.insert(value.clone());
                }
            }
        }

        if !missing.is_empty() {
            let preview: Vec<&str> = missing.iter().take(10).map(String::as_str).collect();
            let ellipsis = if missing.len() > 10 { ", ..." } else { "" };
            warn!(
                "{table}: {} unmatched country names: [{}{ellipsis}]",
                missing.len(),
                preview.join(", ")
            );
        }

        missing
    }
}

fn canonical_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table(toml: &str) -> RegionTable {
        RegionTable::from_toml(toml).unwrap()
    }

    const POLAND: &str = r#"
[[regions]]
name = "Poland"
short_name = "pl"
aliases = ["Polska", "Republic of Poland"]
"#;

    #[test]
    fn resolves_name_code_and_aliases() {
        let map = CountryMap::build(&table(POLAND)).unwrap();
        assert_eq!(map.resolve("Poland"), Some("pl"));
        assert_eq!(map.resolve("pl"), Some("pl"));
        assert_eq!(map.resolve("Polska"), Some("pl"));
        assert_eq!(map.resolve("Republic of Poland"), Some("pl"));
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        let map = CountryMap::build(&table(POLAND)).unwrap();
        assert_eq!(map.resolve("  POLAND "), Some("pl"));
        assert_eq!(map.resolve("poland"), Some("pl"));
        assert_eq!(map.resolve("\tpolska\n"), Some("pl"));
    }

    #[test]
    fn short_name_defaults_to_name() {
        let map = CountryMap::build(&table(
            r#"
[[regions]]
name = "Atlantis"
"#,
        ))
        .unwrap();
        assert_eq!(map.resolve("Atlantis"), Some("atlantis"));
    }

    #[test]
    fn conflicting_alias_rejected() {
        let err = CountryMap::build(&table(
            r#"
[[regions]]
name = "Poland"
short_name = "pl"

[[regions]]
name = "Polandia"
short_name = "pd"
aliases = ["Poland"]
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("'poland'"));
    }

    #[test]
    fn same_code_duplicate_allowed() {
        let map = CountryMap::build(&table(
            r#"
[[regions]]
name = "United Kingdom"
short_name = "uk"
aliases = ["UK", "Great Britain"]
"#,
        ))
        .unwrap();
        assert_eq!(map.resolve("great britain"), Some("uk"));
    }

    #[test]
    fn normalize_passes_unmapped_through() {
        let map = CountryMap::build(&table(POLAND)).unwrap();
        let mut values = vec!["Poland".to_string(), "Wakanda".to_string()];
        let missing = map.normalize("conversions", values.iter_mut());
        assert_eq!(values, vec!["pl", "Wakanda"]);
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["Wakanda"]);
    }

    #[test]
    fn empty_map_is_noop() {
        let map = CountryMap::empty();
        assert!(map.is_empty());
        let mut values = vec!["Poland".to_string()];
        let missing = map.normalize("conversions", values.iter_mut());
        assert_eq!(values, vec!["Poland"]);
        assert_eq!(missing.len(), 1);
    }
}
