//! Absolute radiometric correction: digital numbers to top-of-atmosphere radiance.

use crate::core::dispatch::{CalcOptions, ExpressionDispatcher};
use crate::core::formula::{literal, CompiledExpression, FormulaCompiler};
use crate::core::registry::BandRegistry;
use crate::io::{CalibrationTable, ImageMetadata};
use crate::types::SpectralResult;
use std::path::Path;

/// Coefficients of one band's radiance conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiometricCoefficients {
    pub gain: f64,
    pub offset: f64,
    pub abs_cal_factor: f64,
    pub effective_bandwidth: f64,
}

impl RadiometricCoefficients {
    /// `abs( gain * L * ( absCalFactor / effectiveBandwidth ) + (offset) )` over `band_key`
    pub fn formula(&self, band_key: &str) -> SpectralResult<String> {
        Ok(format!(
            "abs( {} * {} * ( {} / {} ) + ({}) )",
            literal(self.gain)?,
            band_key,
            literal(self.abs_cal_factor)?,
            literal(self.effective_bandwidth)?,
            literal(self.offset)?
        ))
    }
}

/// Resolves radiometric coefficients from calibrated bands and image metadata
pub struct RadiometricResolver<'a> {
    registry: &'a BandRegistry,
    metadata: &'a ImageMetadata,
}

impl<'a> RadiometricResolver<'a> {
    /// `registry` must carry calibration (see [`BandRegistry::with_calibration`])
    pub fn new(registry: &'a BandRegistry, metadata: &'a ImageMetadata) -> Self {
        Self { registry, metadata }
    }

    pub fn coefficients(&self, band_key: &str) -> SpectralResult<RadiometricCoefficients> {
        let calibration = self.registry.calibration(band_key)?;
        let coefficients = RadiometricCoefficients {
            gain: calibration.gain,
            offset: calibration.offset,
            abs_cal_factor: self.metadata.band_f64(band_key, "absCalFactor")?,
            effective_bandwidth: self.metadata.band_f64(band_key, "effectiveBandwidth")?,
        };
        log::debug!("Band {} radiometric coefficients: {:?}", band_key, coefficients);
        Ok(coefficients)
    }

    /// One expression per band, letters shared across the set
    pub fn compile(&self, source: &Path) -> SpectralResult<Vec<CompiledExpression>> {
        FormulaCompiler::new(self.registry).compile_each_band(source, |key| self.coefficients(key)?.formula(key))
    }
}

/// Convert every band of `input` to radiance in `output`
pub fn radiometric_correction<D: ExpressionDispatcher + ?Sized>(
    input: &Path,
    output: &Path,
    metadata: &ImageMetadata,
    table: &CalibrationTable,
    dispatcher: &mut D,
) -> SpectralResult<()> {
    log::info!("Radiometric correction: {}", input.display());

    let registry = BandRegistry::from_metadata(metadata)?.with_calibration(table)?;
    let expressions = RadiometricResolver::new(&registry, metadata).compile(input)?;
    dispatcher.dispatch(&expressions, output, &CalcOptions::default())?;

    log::info!("Radiometric correction completed: {}", output.display());
    Ok(())
}
