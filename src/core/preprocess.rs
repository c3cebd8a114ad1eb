use crate::config::ToolPaths;
use crate::core::tool::ExternalTool;
use crate::types::{SpectralError, SpectralResult, ToolOutput};
use std::path::Path;

/// Target pixel size as written in the IMD (x spacing, y spacing)
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub x: String,
    pub y: String,
}

impl From<(String, String)> for Resolution {
    fn from((x, y): (String, String)) -> Self {
        Self { x, y }
    }
}

const UINT16_DEFLATE: [&str; 8] = ["-of", "GTiff", "-ot", "UInt16", "-co", "COMPRESS=DEFLATE", "-co", "PREDICTOR=2"];

/// `gdal_translate` command converting a tiled product to GeoTIFF
pub fn translate_command(tools: &ToolPaths, resolution: &Resolution, input: &Path, output: &Path) -> ExternalTool {
    ExternalTool::new(tools.gdal_translate.as_str())
        .args(UINT16_DEFLATE)
        .args(["-tr".to_string(), resolution.x.clone(), format!("-{}", resolution.y)])
        .args(["-a_nodata", "0"])
        .arg(input.display().to_string())
        .arg(output.display().to_string())
}

/// `gdalwarp` command clipping to an AOI polygon
pub fn clip_command(
    tools: &ToolPaths,
    resolution: &Resolution,
    aoi: &Path,
    input: &Path,
    output: &Path,
) -> SpectralResult<ExternalTool> {
    if !aoi.exists() {
        return Err(SpectralError::InvalidInput(format!(
            "AOI file {} does not exist",
            aoi.display()
        )));
    }

    Ok(ExternalTool::new(tools.gdalwarp.as_str())
        .args(UINT16_DEFLATE)
        .args(["-tr".to_string(), resolution.x.clone(), format!("-{}", resolution.y)])
        .args(["-r", "cubicspline", "-overwrite", "-dstnodata", "0", "-cutline"])
        .arg(aoi.display().to_string())
        .arg("-crop_to_cutline")
        .arg(input.display().to_string())
        .arg(output.display().to_string()))
}

/// Convert `input` to a UInt16 GeoTIFF at `resolution`
pub fn translate(tools: &ToolPaths, resolution: &Resolution, input: &Path, output: &Path) -> SpectralResult<ToolOutput> {
    log::info!("Translating {} to GeoTIFF", input.display());
    translate_command(tools, resolution, input, output).run()
}

/// Clip `input` to `aoi`, resampling to `resolution`
pub fn clip(
    tools: &ToolPaths,
    resolution: &Resolution,
    aoi: &Path,
    input: &Path,
    output: &Path,
) -> SpectralResult<ToolOutput> {
    log::info!("Clipping {} to {}", input.display(), aoi.display());
    clip_command(tools, resolution, aoi, input, output)?.run()
}
