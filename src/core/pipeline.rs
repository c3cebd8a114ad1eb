//! Product-level correction chain: preprocess, radiance, reflectance, pansharpen.

use crate::config::PipelineConfig;
use crate::core::atmospheric::{atmospheric_correction, RadiativeTransferModel, SixsExecutable};
use crate::core::dispatch::{ExpressionDispatcher, GdalCalcDispatcher};
use crate::core::pansharpen::{weighted_brovey, WORLDVIEW3_WEIGHTS};
use crate::core::preprocess::{clip, translate, Resolution};
use crate::core::radiometric::radiometric_correction;
use crate::io::files::{create_dir, file_stem, find_file};
use crate::io::footprint::read_footprint;
use crate::io::{CalibrationTable, ImageMetadata};
use crate::types::{SpectralError, SpectralResult};
use std::path::{Path, PathBuf};

/// Files written for one product folder
#[derive(Debug, Clone, PartialEq)]
pub struct ProductOutputs {
    pub name: String,
    pub preprocessed: PathBuf,
    pub radiance: PathBuf,
    pub reflectance: PathBuf,
}

/// Outputs of a MUL + PAN scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneOutputs {
    pub multispectral: ProductOutputs,
    pub panchromatic: ProductOutputs,
    pub pansharpened: PathBuf,
}

/// Runs the correction chain with a model and a calculator
pub struct CorrectionPipeline<M: RadiativeTransferModel, D: ExpressionDispatcher> {
    config: PipelineConfig,
    table: CalibrationTable,
    model: M,
    dispatcher: D,
}

impl CorrectionPipeline<SixsExecutable, GdalCalcDispatcher> {
    /// Pipeline driving the configured 6S and `gdal_calc.py` executables
    pub fn from_config(config: PipelineConfig) -> SpectralResult<Self> {
        let table = match &config.calibration_table {
            Some(path) => CalibrationTable::from_path(path)?,
            None => CalibrationTable::worldview3()?,
        };
        let model = SixsExecutable::new(config.tools.sixs.as_str());
        let dispatcher = GdalCalcDispatcher::new(config.tools.clone());
        Ok(Self::new(config, table, model, dispatcher))
    }
}

impl<M: RadiativeTransferModel, D: ExpressionDispatcher> CorrectionPipeline<M, D> {
    pub fn new(config: PipelineConfig, table: CalibrationTable, model: M, dispatcher: D) -> Self {
        Self {
            config,
            table,
            model,
            dispatcher,
        }
    }

    /// Correct the product in `folder` (one `.TIL` and one `.IMD`).
    ///
    /// `readme` is the delivery's `README.XML`; with `aoi` the image is
    /// clipped instead of only translated.
    pub fn correct_product(
        &mut self,
        folder: &Path,
        readme: &Path,
        aoi: Option<&Path>,
        output_dir: &Path,
    ) -> SpectralResult<ProductOutputs> {
        let image = find_file(folder, "TIL")?;
        let metadata = ImageMetadata::read(find_file(folder, "IMD")?)?;
        let footprint = read_footprint(readme)?;
        let resolution = Resolution::from(metadata.pixel_spacing()?);
        let name = file_stem(&image)?;
        log::info!("Processing product {}", name);

        let preprocessed = output_dir.join(format!("{}.tif", name));
        match aoi {
            Some(aoi) => clip(&self.config.tools, &resolution, aoi, &image, &preprocessed)?,
            None => translate(&self.config.tools, &resolution, &image, &preprocessed)?,
        };

        let radiance = output_dir.join(format!("{}_ARC.tif", name));
        radiometric_correction(&preprocessed, &radiance, &metadata, &self.table, &mut self.dispatcher)?;

        let reflectance = output_dir.join(format!("{}_6S.tif", name));
        atmospheric_correction(
            &radiance,
            &reflectance,
            &metadata,
            &footprint,
            &self.table,
            &self.config.atmospheric,
            &mut self.model,
            &mut self.dispatcher,
        )?;

        Ok(ProductOutputs {
            name,
            preprocessed,
            radiance,
            reflectance,
        })
    }

    /// Correct the MUL and PAN products of a delivery and pansharpen them.
    ///
    /// Outputs go to `processed_data` next to the product folders, where the
    /// delivery's `README.XML` is also looked up.
    pub fn correct_scene(&mut self, mul_dir: &Path, pan_dir: &Path, aoi: Option<&Path>) -> SpectralResult<SceneOutputs> {
        let root = mul_dir.parent().ok_or_else(|| {
            SpectralError::InvalidInput(format!("{} has no parent directory", mul_dir.display()))
        })?;
        let output_dir = create_dir(root, "processed_data")?;
        let readme = find_file(root, "README.XML")?;

        let multispectral = self.correct_product(mul_dir, &readme, aoi, &output_dir)?;
        let panchromatic = self.correct_product(pan_dir, &readme, aoi, &output_dir)?;

        let pansharpened = output_dir.join(format!("{}_wBrovey.tif", panchromatic.name));
        weighted_brovey(
            &self.config.tools,
            &panchromatic.reflectance,
            &multispectral.reflectance,
            &WORLDVIEW3_WEIGHTS,
            &pansharpened,
        )?;

        log::info!("Scene processed: {}", pansharpened.display());
        Ok(SceneOutputs {
            multispectral,
            panchromatic,
            pansharpened,
        })
    }
}
