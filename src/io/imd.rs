use crate::types::{SpectralError, SpectralResult};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Key/value pairs of one `BEGIN_GROUP` section
pub type MetadataGroup = HashMap<String, String>;

/// Image metadata parsed from a DigitalGlobe/Maxar `.IMD` file
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    /// Top-level `key = value;` entries
    pub global: HashMap<String, String>,
    /// Groups in file order (`IMAGE_1`, `BAND_C`, ...)
    pub groups: Vec<(String, MetadataGroup)>,
}

const BAND_GROUP_PREFIX: &str = "BAND_";
const ACQ_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

impl ImageMetadata {
    /// Read and parse an IMD file
    pub fn read<P: AsRef<Path>>(path: P) -> SpectralResult<Self> {
        log::info!("Reading IMD metadata: {}", path.as_ref().display());
        let content = fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    /// Parse IMD content.
    ///
    /// Only lines containing `=` carry metadata. A trailing `;` is dropped and
    /// surrounding double quotes are removed from values. Multi-line
    /// parenthesised lists keep only their first line, which is enough for
    /// the scalar keys this crate consumes.
    pub fn parse(content: &str) -> SpectralResult<Self> {
        let mut metadata = ImageMetadata::default();
        let mut current: Option<(String, MetadataGroup)> = None;

        for (line_no, raw) in content.lines().enumerate() {
            let Some((key, value)) = raw.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = clean_value(value);

            match key {
                "BEGIN_GROUP" => {
                    if let Some((name, _)) = &current {
                        return Err(SpectralError::Metadata(format!(
                            "Line {}: group '{}' opened inside unterminated group '{}'",
                            line_no + 1,
                            value,
                            name
                        )));
                    }
                    current = Some((value, MetadataGroup::new()));
                }
                "END_GROUP" => match current.take() {
                    Some(group) => metadata.groups.push(group),
                    None => {
                        return Err(SpectralError::Metadata(format!(
                            "Line {}: END_GROUP without BEGIN_GROUP",
                            line_no + 1
                        )))
                    }
                },
                _ => match current.as_mut() {
                    Some((_, group)) => {
                        group.insert(key.to_string(), value);
                    }
                    None => {
                        metadata.global.insert(key.to_string(), value);
                    }
                },
            }
        }

        if let Some((name, _)) = current {
            return Err(SpectralError::Metadata(format!("Group '{}' is never closed", name)));
        }

        log::debug!(
            "Parsed IMD: {} global keys, {} groups",
            metadata.global.len(),
            metadata.groups.len()
        );
        Ok(metadata)
    }

    pub fn group(&self, name: &str) -> Option<&MetadataGroup> {
        self.groups
            .iter()
            .find(|(group_name, _)| group_name == name)
            .map(|(_, group)| group)
    }

    /// Band keys in file order (`BAND_RE` -> `RE`)
    pub fn band_keys(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter_map(|(name, _)| name.strip_prefix(BAND_GROUP_PREFIX))
            .map(str::to_string)
            .collect()
    }

    pub fn band_group(&self, band_key: &str) -> SpectralResult<&MetadataGroup> {
        self.group(&format!("{}{}", BAND_GROUP_PREFIX, band_key))
            .ok_or_else(|| SpectralError::Metadata(format!("No metadata group for band '{}'", band_key)))
    }

    /// Numeric value of `key` inside `group`
    pub fn group_f64(&self, group: &str, key: &str) -> SpectralResult<f64> {
        let raw = self
            .group(group)
            .and_then(|g| g.get(key))
            .ok_or_else(|| SpectralError::Metadata(format!("Missing {}.{}", group, key)))?;
        parse_f64(raw, key)
    }

    /// Numeric value of `key` inside the band group of `band_key`
    pub fn band_f64(&self, band_key: &str, key: &str) -> SpectralResult<f64> {
        let raw = self
            .band_group(band_key)?
            .get(key)
            .ok_or_else(|| SpectralError::Metadata(format!("Missing {} for band '{}'", key, band_key)))?;
        parse_f64(raw, key)
    }

    /// Earliest acquisition time of the product
    pub fn acquisition_time(&self) -> SpectralResult<NaiveDateTime> {
        let raw = self
            .group("MAP_PROJECTED_PRODUCT")
            .and_then(|g| g.get("earliestAcqTime"))
            .ok_or_else(|| SpectralError::Metadata("Missing MAP_PROJECTED_PRODUCT.earliestAcqTime".to_string()))?;
        NaiveDateTime::parse_from_str(raw, ACQ_TIME_FORMAT)
            .map_err(|e| SpectralError::Metadata(format!("Invalid earliestAcqTime '{}': {}", raw, e)))
    }

    /// Output pixel spacing as the raw strings stored in the IMD (colSpacing, rowSpacing)
    pub fn pixel_spacing(&self) -> SpectralResult<(String, String)> {
        let product = self
            .group("MAP_PROJECTED_PRODUCT")
            .ok_or_else(|| SpectralError::Metadata("Missing MAP_PROJECTED_PRODUCT group".to_string()))?;
        let col = product
            .get("colSpacing")
            .ok_or_else(|| SpectralError::Metadata("Missing colSpacing".to_string()))?;
        let row = product
            .get("rowSpacing")
            .ok_or_else(|| SpectralError::Metadata("Missing rowSpacing".to_string()))?;
        Ok((col.clone(), row.clone()))
    }
}

fn clean_value(value: &str) -> String {
    let value = value.trim();
    let value = value.strip_suffix(';').unwrap_or(value).trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

fn parse_f64(raw: &str, key: &str) -> SpectralResult<f64> {
    raw.parse::<f64>()
        .map_err(|e| SpectralError::Metadata(format!("Invalid numeric value for {}: '{}' ({})", key, raw, e)))
}
