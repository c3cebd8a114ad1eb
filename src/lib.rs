//! multispec: correction, band algebra and spatial filtering for WorldView-3 imagery
//!
//! Raw MUL/PAN products are converted to radiance and surface reflectance,
//! pansharpened, and turned into spectral index rasters. Band formulas are
//! compiled into `gdal_calc.py` expressions; the high-pass filter runs
//! in-process on GDAL rasters.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::{ExecutionContext, PipelineConfig};
pub use types::{Band, BandCalibration, RasterArray, SpectralError, SpectralResult};

pub use core::{
    compile, BandRegistry, BatchReport, CompiledExpression, FormulaCompiler, IndexBatch, IndexOutcome,
};
pub use io::{CalibrationTable, ImageMetadata, IndexCatalog};
