use crate::types::{BandCalibration, SpectralError, SpectralResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// One row of the sensor radiometric-use table
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationRow {
    #[serde(rename = "bandas")]
    pub band: String,
    #[serde(rename = "GAIN_2015v2")]
    pub gain: f64,
    #[serde(rename = "OFFSET_2015v2")]
    pub offset: f64,
    #[serde(rename = "lowerBandEdge")]
    pub lower_band_edge: f64,
    #[serde(rename = "upperBandEdge")]
    pub upper_band_edge: f64,
}

/// Static per-sensor calibration table keyed by band key.
///
/// Loaded once and shared read-only across corrections.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    rows: HashMap<String, CalibrationRow>,
}

/// WorldView-3 radiometric-use table shipped with the crate
const DEFAULT_WV3_TABLE: &str = include_str!("../../data/wv3-radiometric-use.csv");

impl CalibrationTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> SpectralResult<Self> {
        log::info!("Loading calibration table: {}", path.as_ref().display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn worldview3() -> SpectralResult<Self> {
        Self::from_reader(DEFAULT_WV3_TABLE.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> SpectralResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = HashMap::new();

        for record in csv_reader.deserialize::<CalibrationRow>() {
            let row = record?;
            if rows.contains_key(&row.band) {
                return Err(SpectralError::InvalidInput(format!(
                    "Calibration table has more than one row for band '{}'",
                    row.band
                )));
            }
            rows.insert(row.band.clone(), row);
        }

        log::debug!("Calibration table has {} bands", rows.len());
        Ok(Self { rows })
    }

    pub fn row(&self, band_key: &str) -> SpectralResult<&CalibrationRow> {
        self.rows
            .get(band_key)
            .ok_or_else(|| SpectralError::CalibrationLookup(band_key.to_string()))
    }

    pub fn calibration(&self, band_key: &str) -> SpectralResult<BandCalibration> {
        let row = self.row(band_key)?;
        Ok(BandCalibration {
            gain: row.gain,
            offset: row.offset,
            spectral_low: row.lower_band_edge,
            spectral_high: row.upper_band_edge,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
