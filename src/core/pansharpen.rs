use crate::config::ToolPaths;
use crate::core::formula::literal;
use crate::core::tool::ExternalTool;
use crate::types::{SpectralError, SpectralResult, ToolOutput};
use std::path::Path;

/// Weighted Brovey weights for WorldView-3 MUL bands 1..=7
pub const WORLDVIEW3_WEIGHTS: [f64; 7] = [0.005, 0.142, 0.209, 0.144, 0.234, 0.157, 0.116];

/// `gdal_pansharpen.py` command fusing `pan` with the first `weights.len()` bands of `mul`
pub fn brovey_command(
    tools: &ToolPaths,
    pan: &Path,
    mul: &Path,
    weights: &[f64],
    output: &Path,
) -> SpectralResult<ExternalTool> {
    if weights.is_empty() {
        return Err(SpectralError::InvalidInput("Pansharpening needs at least one band weight".to_string()));
    }

    let mut tool = ExternalTool::script(&tools.python, &tools.gdal_pansharpen).arg(pan.display().to_string());
    for band in 1..=weights.len() {
        tool = tool.arg(format!("{},band={}", mul.display(), band));
    }
    tool = tool.arg(output.display().to_string()).args(["-of", "GTiff"]);
    for weight in weights {
        tool = tool.arg("-w").arg(literal(*weight)?);
    }
    Ok(tool)
}

/// Weighted Brovey pansharpening of `mul` with `pan`
pub fn weighted_brovey(
    tools: &ToolPaths,
    pan: &Path,
    mul: &Path,
    weights: &[f64],
    output: &Path,
) -> SpectralResult<ToolOutput> {
    log::info!("Pansharpening {} with {}", mul.display(), pan.display());
    brovey_command(tools, pan, mul, weights, output)?.run()
}
