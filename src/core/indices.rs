//! Spectral index batch over one pansharpened image.

use crate::config::IndexParams;
use crate::core::dispatch::{CalcOptions, ExpressionDispatcher};
use crate::core::dual_resolution::DualResolutionExpander;
use crate::core::formula::FormulaCompiler;
use crate::core::registry::BandRegistry;
use crate::io::files::file_stem;
use crate::io::IndexCatalog;
use crate::types::{SpectralError, SpectralResult};
use std::path::{Path, PathBuf};

/// Result of one catalog entry
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    /// Rasters written, primary resolution first
    Computed { outputs: Vec<PathBuf> },
    /// Entry not computable on this image
    Skipped { reason: String },
}

/// Per-index outcomes in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub entries: Vec<(String, IndexOutcome)>,
}

impl BatchReport {
    pub fn computed(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.entries.iter().filter_map(|(key, outcome)| match outcome {
            IndexOutcome::Computed { outputs } => Some((key.as_str(), outputs.as_slice())),
            IndexOutcome::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(key, outcome)| match outcome {
            IndexOutcome::Skipped { reason } => Some((key.as_str(), reason.as_str())),
            IndexOutcome::Computed { .. } => None,
        })
    }

    pub fn outcome(&self, key: &str) -> Option<&IndexOutcome> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, o)| o)
    }
}

/// Computes catalog indices on a pansharpened image
pub struct IndexBatch<'a> {
    catalog: &'a IndexCatalog,
    params: &'a IndexParams,
}

impl<'a> IndexBatch<'a> {
    pub fn new(catalog: &'a IndexCatalog, params: &'a IndexParams) -> Self {
        Self { catalog, params }
    }

    /// Compute every catalog entry on `image`, writing `<stem>_<tag>_<key>.tif`
    /// into `output_dir`.
    ///
    /// With `alternate` set, entries the dual-resolution policy accepts and
    /// that bind the NIR band are computed a second time against it. A
    /// missing band skips the entry; any other error aborts the batch.
    pub fn run<D: ExpressionDispatcher + ?Sized>(
        &self,
        image: &Path,
        alternate: Option<&Path>,
        output_dir: &Path,
        dispatcher: &mut D,
    ) -> SpectralResult<BatchReport> {
        log::info!("Computing {} indices on {}", self.catalog.len(), image.display());

        let registry = BandRegistry::from_keys(&self.params.band_keys)?;
        let compiler = FormulaCompiler::new(&registry);
        let stem = file_stem(image)?;
        let expander = alternate.map(|path| DualResolutionExpander {
            nir_key: self.params.nir_key.clone(),
            alt_source: path.to_path_buf(),
            alt_band_number: self.params.alternate_nir_band,
            tags: self.params.tags.clone(),
        });
        let options = CalcOptions::index();
        let mut report = BatchReport::default();

        for (key, entry) in self.catalog.iter() {
            let expression = match compiler.compile(&entry.formula, &entry.bands, image) {
                Ok(expression) => expression,
                Err(SpectralError::MissingBand { band, .. }) => {
                    log::warn!("Index {} skipped: band '{}' is not in the image", key, band);
                    report.entries.push((
                        key.to_string(),
                        IndexOutcome::Skipped {
                            reason: format!("missing band '{}'", band),
                        },
                    ));
                    continue;
                }
                Err(e) => return Err(e),
            };

            log::info!("Index {}: {} -> {}", key, entry.formula, expression.formula_text);
            let primary = output_dir.join(format!("{}_{}_{}.tif", stem, self.params.tags.primary, key));
            dispatcher.dispatch(std::slice::from_ref(&expression), &primary, &options)?;
            let mut outputs = vec![primary];

            if let Some(expander) = &expander {
                if self.params.dual_resolution.applies_to(key) {
                    if let Some(variant) = expander.expand(&expression) {
                        let secondary = expander.output_path(&outputs[0])?;
                        log::info!("Index {} again with the NIR band of {}", key, expander.alt_source.display());
                        dispatcher.dispatch(std::slice::from_ref(&variant), &secondary, &options)?;
                        outputs.push(secondary);
                    }
                }
            }

            report.entries.push((key.to_string(), IndexOutcome::Computed { outputs }));
        }

        log::info!(
            "Indices done: {} computed, {} skipped",
            report.computed().count(),
            report.skipped().count()
        );
        Ok(report)
    }
}
