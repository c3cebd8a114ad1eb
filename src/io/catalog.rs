use crate::types::{SpectralError, SpectralResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A spectral index definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Band keys in the order letters are assigned
    pub bands: Vec<String>,
    /// Formula over band keys
    pub formula: String,
}

/// Catalog of spectral indices, in file order
#[derive(Debug, Clone, Default)]
pub struct IndexCatalog {
    entries: Vec<(String, IndexEntry)>,
}

const DEFAULT_CATALOG: &str = include_str!("../../data/indices.json");

impl IndexCatalog {
    pub fn from_path<P: AsRef<Path>>(path: P) -> SpectralResult<Self> {
        log::info!("Loading index catalog: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// WorldView-3 index catalog shipped with the crate
    pub fn worldview3() -> SpectralResult<Self> {
        Self::from_json(DEFAULT_CATALOG)
    }

    pub fn from_json(content: &str) -> SpectralResult<Self> {
        // serde_json is built with preserve_order, so the map keeps file order
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let entry: IndexEntry = serde_json::from_value(value)?;
            if entry.bands.is_empty() {
                return Err(SpectralError::InvalidInput(format!("Index '{}' declares no bands", key)));
            }
            entries.push((key, entry));
        }
        log::debug!("Index catalog has {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<(String, IndexEntry)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    /// Restrict the catalog to `keys`, keeping catalog order
    pub fn select(&self, keys: &[String]) -> SpectralResult<Self> {
        if let Some(unknown) = keys.iter().find(|k| self.get(k).is_none()) {
            return Err(SpectralError::InvalidInput(format!("Unknown index '{}'", unknown)));
        }
        Ok(Self {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .cloned()
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
