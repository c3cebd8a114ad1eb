use ndarray::{s, Array2, Array3};
use serde::{Deserialize, Serialize};

/// Real-valued pixel data
pub type Pixel = f32;

/// 2D single-band raster (row x col)
pub type BandImage = Array2<Pixel>;

/// 3D multi-band raster (band x row x col)
pub type BandCube = Array3<Pixel>;

/// Per-sensor calibration attributes of a band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandCalibration {
    pub gain: f64,
    pub offset: f64,
    pub spectral_low: f64,   // micrometers
    pub spectral_high: f64,  // micrometers
}

/// A spectral band of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Semantic short name (e.g. "C", "B", "N2")
    pub key: String,
    /// 1-based index into the source raster's band stack
    pub position: usize,
    pub calibration: Option<BandCalibration>,
}

/// Geographic point (WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn centroid(&self) -> GeoPoint {
        GeoPoint {
            lon: (self.min_lon + self.max_lon) / 2.0,
            lat: (self.min_lat + self.max_lat) / 2.0,
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// In-memory raster with georeferencing.
///
/// Nodata pixels have already been replaced by NaN; `nodata` keeps the
/// sentinel the source file declared.
#[derive(Debug, Clone)]
pub struct RasterArray {
    pub data: BandCube,
    pub geo_transform: Option<GeoTransform>,
    pub projection: String,
    pub nodata: Option<f64>,
}

impl RasterArray {
    pub fn band_count(&self) -> usize {
        self.data.dim().0
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    /// Copy of a single band (0-based)
    pub fn band(&self, index: usize) -> SpectralResult<BandImage> {
        if index >= self.band_count() {
            return Err(SpectralError::InvalidInput(format!(
                "Band index {} out of range for {}-band raster",
                index,
                self.band_count()
            )));
        }
        Ok(self.data.slice(s![index, .., ..]).to_owned())
    }
}

/// Error types for multispectral processing
#[derive(Debug, thiserror::Error)]
pub enum SpectralError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Band '{band}' required by '{formula}' is not present in the image")]
    MissingBand { band: String, formula: String },

    #[error("No calibration row for band '{0}'")]
    CalibrationLookup(String),

    #[error("Band {band} nodata value {found:?} differs from {expected:?}")]
    InconsistentNodata {
        band: usize,
        expected: Option<f64>,
        found: Option<f64>,
    },

    #[error("External tool failed ({status}): {command}\n{output}")]
    ExternalToolFailure {
        command: String,
        status: String,
        output: String,
    },

    #[error("Ambiguous band substitution: {0}")]
    SubstitutionAmbiguity(String),

    #[error("Formula syntax error: {0}")]
    FormulaSyntax(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for multispectral operations
pub type SpectralResult<T> = Result<T, SpectralError>;

/// Command line and captured output of an external tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub command: String,
    pub output: String,
}
