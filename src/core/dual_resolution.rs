//! Second-resolution variants of near-infrared indices.
//!
//! The pansharpened product drops the second near-infrared band, so NIR
//! indices are also computed against the original multispectral image with
//! the NIR letter re-pointed there.

use crate::config::ResolutionTags;
use crate::core::formula::CompiledExpression;
use crate::types::{SpectralError, SpectralResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which indices get a second-resolution variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DualResolutionPolicy {
    /// Every index that binds the near-infrared band
    #[default]
    AllNir,
    /// Only the listed index keys (and only if they bind the NIR band)
    AllowList { indices: Vec<String> },
    Disabled,
}

impl DualResolutionPolicy {
    pub fn applies_to(&self, index_key: &str) -> bool {
        match self {
            DualResolutionPolicy::AllNir => true,
            DualResolutionPolicy::AllowList { indices } => indices.iter().any(|k| k == index_key),
            DualResolutionPolicy::Disabled => false,
        }
    }
}

/// Re-point the letter bound to `nir_key` at `alt_source` band `alt_band_number`.
///
/// `None` when the expression does not bind `nir_key`. Every other binding
/// is copied unchanged.
pub fn expand(
    base: &CompiledExpression,
    nir_key: &str,
    alt_source: &Path,
    alt_band_number: usize,
) -> Option<CompiledExpression> {
    let letter = base.letter_for(nir_key)?;
    let mut variant = base.clone();

    for (l, source) in variant.band_sources.iter_mut() {
        if *l == letter {
            *source = alt_source.to_path_buf();
        }
    }
    for (l, band) in variant.band_numbers.iter_mut() {
        if *l == letter {
            *band = alt_band_number;
        }
    }

    log::debug!(
        "NIR letter {} re-pointed to {} band {}",
        letter,
        alt_source.display(),
        alt_band_number
    );
    Some(variant)
}

/// Expands compiled index expressions against the alternate-resolution image
#[derive(Debug, Clone)]
pub struct DualResolutionExpander {
    pub nir_key: String,
    pub alt_source: PathBuf,
    pub alt_band_number: usize,
    pub tags: ResolutionTags,
}

impl DualResolutionExpander {
    pub fn expand(&self, base: &CompiledExpression) -> Option<CompiledExpression> {
        expand(base, &self.nir_key, &self.alt_source, self.alt_band_number)
    }

    /// Swap the resolution tag in an output file name (`_30cm_` -> `_120cm_`).
    ///
    /// The tag sits between the image stem and the index key, so the last
    /// occurrence is replaced; a stem carrying the same text is left alone.
    pub fn output_path(&self, primary: &Path) -> SpectralResult<PathBuf> {
        let name = primary
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SpectralError::InvalidInput(format!("No file name in {}", primary.display())))?;

        let from = format!("_{}_", self.tags.primary);
        let at = name.rfind(&from).ok_or_else(|| {
            SpectralError::InvalidInput(format!("Output name {} carries no '{}' tag", name, from))
        })?;
        let renamed = format!(
            "{}_{}_{}",
            &name[..at],
            self.tags.alternate,
            &name[at + from.len()..]
        );
        Ok(primary.with_file_name(renamed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::compile;
    use crate::core::registry::BandRegistry;

    fn registry() -> BandRegistry {
        BandRegistry::from_keys(&["C", "B", "G", "Y", "R", "RE1", "N", "N2"]).unwrap()
    }

    fn expander() -> DualResolutionExpander {
        DualResolutionExpander {
            nir_key: "N".to_string(),
            alt_source: PathBuf::from("/data/mul_6S.tif"),
            alt_band_number: 8,
            tags: ResolutionTags::default(),
        }
    }

    #[test]
    fn test_only_nir_binding_changes() {
        let base = compile("2.5 * (N - R) / (N + 6 * R - 7.5 * B + 1)", &["N", "R", "B"], &registry(), Path::new("/data/ps.tif"))
            .unwrap();
        let variant = expander().expand(&base).unwrap();

        assert_eq!(variant.formula_text, base.formula_text);
        assert_eq!(variant.source_of('A'), Some(Path::new("/data/mul_6S.tif")));
        assert_eq!(variant.band_number_of('A'), Some(8));
        assert_eq!(variant.band_sources[1..], base.band_sources[1..]);
        assert_eq!(variant.band_numbers[1..], base.band_numbers[1..]);
        variant.validate().unwrap();
    }

    #[test]
    fn test_no_variant_without_nir() {
        let base = compile("(G - Y) / (G + Y)", &["G", "Y"], &registry(), Path::new("/data/ps.tif")).unwrap();
        assert!(expander().expand(&base).is_none());
    }

    #[test]
    fn test_n2_is_not_nir() {
        let base = compile("(N2 - R) / (N2 + R)", &["N2", "R"], &registry(), Path::new("/data/ps.tif")).unwrap();
        assert!(expander().expand(&base).is_none());
    }

    #[test]
    fn test_output_tag_swapped() {
        let out = expander()
            .output_path(Path::new("/out/img_30cm_NDVI.tif"))
            .unwrap();
        assert_eq!(out, PathBuf::from("/out/img_120cm_NDVI.tif"));
        assert!(expander().output_path(Path::new("/out/img_NDVI.tif")).is_err());
    }

    #[test]
    fn test_tag_in_stem_left_alone() {
        let out = expander()
            .output_path(Path::new("/out/site_30cm_x_30cm_NDVI.tif"))
            .unwrap();
        assert_eq!(out, PathBuf::from("/out/site_30cm_x_120cm_NDVI.tif"));
    }

    #[test]
    fn test_policy() {
        assert!(DualResolutionPolicy::AllNir.applies_to("NDVI"));
        let allow = DualResolutionPolicy::AllowList {
            indices: vec!["NDVI".to_string()],
        };
        assert!(allow.applies_to("NDVI"));
        assert!(!allow.applies_to("SAVI"));
        assert!(!DualResolutionPolicy::Disabled.applies_to("NDVI"));

        let parsed: DualResolutionPolicy =
            serde_json::from_str(r#"{"mode": "allow_list", "indices": ["NDVI", "EVI"]}"#).unwrap();
        assert!(parsed.applies_to("EVI"));
    }
}
