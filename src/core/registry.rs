use crate::io::{CalibrationTable, ImageMetadata};
use crate::types::{Band, BandCalibration, SpectralError, SpectralResult};

/// Band set of one image: key -> position (and calibration when loaded)
#[derive(Debug, Clone, Default)]
pub struct BandRegistry {
    bands: Vec<Band>,
}

impl BandRegistry {
    /// Bands numbered 1..=n in the order given
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> SpectralResult<Self> {
        let positions: Vec<usize> = (1..=keys.len()).collect();
        Self::from_keys_and_positions(keys, &positions)
    }

    /// Bands with explicit positions
    pub fn from_keys_and_positions<S: AsRef<str>>(keys: &[S], positions: &[usize]) -> SpectralResult<Self> {
        if keys.len() != positions.len() {
            return Err(SpectralError::InvalidInput(format!(
                "{} band keys but {} band positions",
                keys.len(),
                positions.len()
            )));
        }

        let mut bands: Vec<Band> = Vec::with_capacity(keys.len());
        for (key, &position) in keys.iter().zip(positions) {
            let key = key.as_ref();
            if key.is_empty() {
                return Err(SpectralError::InvalidInput("Empty band key".to_string()));
            }
            if position == 0 {
                return Err(SpectralError::InvalidInput(format!("Band '{}' has position 0; positions are 1-based", key)));
            }
            if bands.iter().any(|b| b.key == key) {
                return Err(SpectralError::InvalidInput(format!("Duplicate band key '{}'", key)));
            }
            bands.push(Band {
                key: key.to_string(),
                position,
                calibration: None,
            });
        }
        Ok(Self { bands })
    }

    /// Bands in IMD group order, numbered from 1
    pub fn from_metadata(imd: &ImageMetadata) -> SpectralResult<Self> {
        let keys = imd.band_keys();
        if keys.is_empty() {
            return Err(SpectralError::Metadata("IMD declares no BAND_ groups".to_string()));
        }
        log::debug!("Image bands: {:?}", keys);
        Self::from_keys(&keys)
    }

    /// Attach calibration rows; every band must have one
    pub fn with_calibration(mut self, table: &CalibrationTable) -> SpectralResult<Self> {
        for band in &mut self.bands {
            band.calibration = Some(table.calibration(&band.key)?);
        }
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.key == key)
    }

    /// Calibration attached by [`BandRegistry::with_calibration`]
    pub fn calibration(&self, key: &str) -> SpectralResult<&BandCalibration> {
        self.get(key)
            .and_then(|b| b.calibration.as_ref())
            .ok_or_else(|| SpectralError::CalibrationLookup(key.to_string()))
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.get(key).map(|b| b.position)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|b| b.key.as_str())
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_follow_key_order() {
        let registry = BandRegistry::from_keys(&["C", "B", "G", "Y", "R", "RE1", "N", "N2"]).unwrap();
        assert_eq!(registry.position("C"), Some(1));
        assert_eq!(registry.position("N"), Some(7));
        assert_eq!(registry.position("N2"), Some(8));
        assert_eq!(registry.position("P"), None);
    }

    #[test]
    fn test_duplicate_and_zero_positions_rejected() {
        assert!(BandRegistry::from_keys(&["C", "C"]).is_err());
        assert!(BandRegistry::from_keys_and_positions(&["C"], &[0]).is_err());
        assert!(BandRegistry::from_keys_and_positions(&["C", "B"], &[1]).is_err());
    }

    #[test]
    fn test_calibration_attached_or_lookup_error() {
        let table = CalibrationTable::worldview3().unwrap();

        let registry = BandRegistry::from_keys(&["C", "N2"]).unwrap().with_calibration(&table).unwrap();
        let cal = registry.calibration("N2").unwrap();
        assert_eq!(cal.spectral_low, 0.860);
        assert!(matches!(registry.calibration("P"), Err(SpectralError::CalibrationLookup(_))));

        let bare = BandRegistry::from_keys(&["C"]).unwrap();
        assert!(matches!(bare.calibration("C"), Err(SpectralError::CalibrationLookup(ref k)) if k == "C"));

        let result = BandRegistry::from_keys(&["C", "RE1"]).unwrap().with_calibration(&table);
        assert!(matches!(result, Err(SpectralError::CalibrationLookup(ref k)) if k == "RE1"));
    }
}
