//! Hands compiled expressions to the external raster calculator.

use crate::config::ToolPaths;
use crate::core::formula::CompiledExpression;
use crate::core::tool::ExternalTool;
use crate::types::{SpectralError, SpectralResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-call output settings; compression is always DEFLATE
#[derive(Debug, Clone, PartialEq)]
pub struct CalcOptions {
    pub output_type: String,
    pub nodata: f64,
    /// TIFF predictor (2 horizontal, 3 floating point)
    pub predictor: u8,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            output_type: "Float32".to_string(),
            nodata: 0.0,
            predictor: 2,
        }
    }
}

impl CalcOptions {
    /// Settings for spectral index rasters
    pub fn index() -> Self {
        Self {
            predictor: 3,
            ..Self::default()
        }
    }
}

/// Something that evaluates compiled expressions into an output raster
pub trait ExpressionDispatcher {
    fn dispatch(
        &mut self,
        expressions: &[CompiledExpression],
        output: &Path,
        options: &CalcOptions,
    ) -> SpectralResult<()>;
}

/// Letter -> (source, band number) across all expressions of one call.
///
/// Every expression is validated first; a letter bound differently by two
/// expressions is an error.
pub fn merge_bindings(expressions: &[CompiledExpression]) -> SpectralResult<BTreeMap<char, (PathBuf, usize)>> {
    if expressions.is_empty() {
        return Err(SpectralError::InvalidInput("No expressions to evaluate".to_string()));
    }

    let mut bindings: BTreeMap<char, (PathBuf, usize)> = BTreeMap::new();
    for expression in expressions {
        expression.validate()?;
        for (letter, source) in &expression.band_sources {
            let band = expression.band_number_of(*letter).ok_or_else(|| {
                SpectralError::InvalidInput(format!("Letter {} has no band number", letter))
            })?;
            match bindings.get(letter) {
                Some((s, b)) if s != source || *b != band => {
                    return Err(SpectralError::SubstitutionAmbiguity(format!(
                        "letter {} bound to {} band {} and to {} band {}",
                        letter,
                        s.display(),
                        b,
                        source.display(),
                        band
                    )));
                }
                Some(_) => {}
                None => {
                    bindings.insert(*letter, (source.clone(), band));
                }
            }
        }
    }
    Ok(bindings)
}

/// Runs `gdal_calc.py`
#[derive(Debug, Clone, Default)]
pub struct GdalCalcDispatcher {
    tools: ToolPaths,
}

impl GdalCalcDispatcher {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    /// The full invocation for `expressions`
    pub fn command(
        &self,
        expressions: &[CompiledExpression],
        output: &Path,
        options: &CalcOptions,
    ) -> SpectralResult<ExternalTool> {
        let bindings = merge_bindings(expressions)?;

        let mut tool = ExternalTool::script(&self.tools.python, &self.tools.gdal_calc).args([
            "--format=GTiff".to_string(),
            format!("--type={}", options.output_type),
            "--quiet".to_string(),
            "--co".to_string(),
            "COMPRESS=DEFLATE".to_string(),
            "--co".to_string(),
            format!("PREDICTOR={}", options.predictor),
            "--overwrite".to_string(),
            format!("--NoDataValue={}", options.nodata),
            format!("--outfile={}", output.display()),
        ]);

        for expression in expressions {
            tool = tool.arg(format!("--calc={}", expression.formula_text));
        }
        for (letter, (source, band)) in &bindings {
            tool = tool
                .arg(format!("-{}", letter))
                .arg(source.display().to_string())
                .arg(format!("--{}_band={}", letter, band));
        }
        Ok(tool)
    }
}

impl ExpressionDispatcher for GdalCalcDispatcher {
    fn dispatch(
        &mut self,
        expressions: &[CompiledExpression],
        output: &Path,
        options: &CalcOptions,
    ) -> SpectralResult<()> {
        log::info!("Evaluating {} expression(s) into {}", expressions.len(), output.display());
        self.command(expressions, output, options)?.run()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::compile;
    use crate::core::registry::BandRegistry;

    fn ndvi() -> CompiledExpression {
        let registry = BandRegistry::from_keys(&["C", "B", "G", "Y", "R", "RE1", "N", "N2"]).unwrap();
        compile("(N-R)/(N+R)", &["N", "R"], &registry, Path::new("/data/ps.tif")).unwrap()
    }

    #[test]
    fn test_command_arguments() {
        let dispatcher = GdalCalcDispatcher::default();
        let tool = dispatcher
            .command(&[ndvi()], Path::new("/out/x_30cm_NDVI.tif"), &CalcOptions::index())
            .unwrap();

        assert_eq!(tool.program(), "gdal_calc.py");
        let args = tool.arguments();
        assert!(args.contains(&"PREDICTOR=3".to_string()));
        assert!(args.contains(&"--NoDataValue=0".to_string()));
        assert!(args.contains(&"--outfile=/out/x_30cm_NDVI.tif".to_string()));
        assert!(args.contains(&"--calc=(A-B)/(A+B)".to_string()));

        let tail: Vec<&str> = args[args.len() - 6..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec!["-A", "/data/ps.tif", "--A_band=7", "-B", "/data/ps.tif", "--B_band=5"]
        );
    }

    #[test]
    fn test_conflicting_letters_rejected() {
        let base = ndvi();
        let mut other = base.clone();
        other.band_numbers[0].1 = 8;
        assert!(matches!(
            merge_bindings(&[base, other]),
            Err(SpectralError::SubstitutionAmbiguity(_))
        ));
    }

    #[test]
    fn test_orphan_binding_rejected() {
        let mut expression = ndvi();
        expression.formula_text = "A*2".to_string();
        assert!(merge_bindings(&[expression]).is_err());
    }

    #[test]
    fn test_empty_call_rejected() {
        assert!(merge_bindings(&[]).is_err());
    }
}
