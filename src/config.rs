//! Runtime configuration: execution context and pipeline settings

use crate::core::atmospheric::{AerosolProfile, AtmosphereSourceConfig};
use crate::core::dual_resolution::DualResolutionPolicy;
use crate::types::{SpectralError, SpectralResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Execution context for chunked raster work.
///
/// Each invocation that needs worker threads builds its own pool from this
/// value; the pool lives only for that call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionContext {
    /// Worker threads for the convolution pool
    pub threads: usize,
    /// Rows per raster read window
    pub chunk_rows: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            threads: 1,
            chunk_rows: 512,
        }
    }
}

impl ExecutionContext {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    /// Run `op` inside a pool scoped to this call
    pub fn install<R, F>(&self, op: F) -> SpectralResult<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        if self.threads == 0 || self.chunk_rows == 0 {
            return Err(SpectralError::InvalidInput(format!(
                "Execution context needs at least one thread and one row per chunk, got {:?}",
                self
            )));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| SpectralError::Processing(format!("Failed to build thread pool: {}", e)))?;
        log::debug!("Running with a {}-thread pool", self.threads);
        Ok(pool.install(op))
    }
}

/// Program names of the external command line tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub gdal_translate: String,
    pub gdalwarp: String,
    /// Calculator script; an existing `.py` file is started through `python`
    pub gdal_calc: String,
    pub gdal_pansharpen: String,
    pub python: String,
    pub sixs: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            gdal_translate: "gdal_translate".to_string(),
            gdalwarp: "gdalwarp".to_string(),
            gdal_calc: "gdal_calc.py".to_string(),
            gdal_pansharpen: "gdal_pansharpen.py".to_string(),
            python: "python".to_string(),
            sixs: "sixsV1.1".to_string(),
        }
    }
}

/// Resolution tags used in index output names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionTags {
    pub primary: String,
    pub alternate: String,
}

impl Default for ResolutionTags {
    fn default() -> Self {
        Self {
            primary: "30cm".to_string(),
            alternate: "120cm".to_string(),
        }
    }
}

/// Settings for spectral index computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Catalog file; the shipped WorldView-3 catalog when absent
    pub catalog: Option<PathBuf>,
    /// Band keys of the pansharpened image, first band first
    pub band_keys: Vec<String>,
    /// Near-infrared key re-pointed by dual-resolution expansion
    pub nir_key: String,
    /// Band number of the near-infrared substitute in the alternate image
    pub alternate_nir_band: usize,
    pub dual_resolution: DualResolutionPolicy,
    pub tags: ResolutionTags,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            catalog: None,
            band_keys: ["C", "B", "G", "Y", "R", "RE1", "N", "N2"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            nir_key: "N".to_string(),
            alternate_nir_band: 8,
            dual_resolution: DualResolutionPolicy::default(),
            tags: ResolutionTags::default(),
        }
    }
}

/// Settings for the 6S correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphericParams {
    pub source: AtmosphereSourceConfig,
    pub aerosol_profile: AerosolProfile,
    /// Sensor altitude in km; satellite level when absent
    pub sensor_altitude_km: Option<f64>,
}

impl Default for AtmosphericParams {
    fn default() -> Self {
        Self {
            source: AtmosphereSourceConfig::default(),
            aerosol_profile: AerosolProfile::Desert,
            sensor_altitude_km: None,
        }
    }
}

/// Complete pipeline configuration, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Radiometric-use table; the shipped WorldView-3 table when absent
    pub calibration_table: Option<PathBuf>,
    pub tools: ToolPaths,
    pub atmospheric: AtmosphericParams,
    pub indices: IndexParams,
    pub execution: ExecutionContext,
}

impl PipelineConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> SpectralResult<Self> {
        log::info!("Loading configuration: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
