//! High-pass spatial filter used to extract panchromatic detail.
//!
//! 5x5 kernel, -1/25 everywhere and +24/25 at the centre, so a flat
//! surface filters to zero. Pixels outside the raster count as missing:
//! any NaN under the window makes the output NaN, which blanks a two pixel
//! border.

use crate::config::ExecutionContext;
use crate::io::files::file_stem;
use crate::io::{read_raster, write_raster};
use crate::types::{BandImage, RasterArray, SpectralError, SpectralResult};
use ndarray::{Array2, Axis, Zip};
use std::path::{Path, PathBuf};

/// Kernel edge length
pub const KERNEL_SIZE: usize = 5;

/// The 5x5 high-pass kernel
pub fn kernel() -> Array2<f64> {
    let mut k = Array2::from_elem((KERNEL_SIZE, KERNEL_SIZE), -1.0 / 25.0);
    k[[KERNEL_SIZE / 2, KERNEL_SIZE / 2]] = 24.0 / 25.0;
    k
}

/// Convolve one band with `kernel` under NaN constant padding
pub fn convolve_band(band: &BandImage, kernel: &Array2<f64>) -> SpectralResult<BandImage> {
    let (k_rows, k_cols) = kernel.dim();
    if k_rows % 2 == 0 || k_cols % 2 == 0 {
        return Err(SpectralError::InvalidInput(format!(
            "Kernel must have odd dimensions, got {}x{}",
            k_rows, k_cols
        )));
    }

    let (rows, cols) = band.dim();
    let half_r = k_rows / 2;
    let half_c = k_cols / 2;
    let mut filtered = BandImage::zeros((rows, cols));

    // kernel is symmetric, so correlation and convolution agree
    Zip::indexed(&mut filtered).par_for_each(|(i, j), out| {
        if i < half_r || j < half_c || i + half_r >= rows || j + half_c >= cols {
            *out = f32::NAN;
            return;
        }

        let mut sum = 0.0f64;
        for ki in 0..k_rows {
            for kj in 0..k_cols {
                let value = band[[i + ki - half_r, j + kj - half_c]];
                if value.is_nan() {
                    *out = f32::NAN;
                    return;
                }
                sum += kernel[[ki, kj]] * value as f64;
            }
        }
        *out = sum as f32;
    });

    Ok(filtered)
}

/// High-pass filter the first band of the raster at `path`
pub fn high_pass_filter<P: AsRef<Path>>(path: P, ctx: &ExecutionContext) -> SpectralResult<RasterArray> {
    log::info!("High-pass filtering {}", path.as_ref().display());

    let raster = read_raster(path.as_ref(), ctx)?;
    if raster.band_count() > 1 {
        log::warn!(
            "{} has {} bands; only the first is filtered",
            path.as_ref().display(),
            raster.band_count()
        );
    }

    let first = raster.band(0)?;
    let k = kernel();
    let filtered = ctx.install(|| convolve_band(&first, &k))??;

    Ok(RasterArray {
        data: filtered.insert_axis(Axis(0)),
        geo_transform: raster.geo_transform,
        projection: raster.projection,
        nodata: raster.nodata,
    })
}

/// `<stem>_focal.tif` in `output_dir`
pub fn focal_output_path(input: &Path, output_dir: &Path) -> SpectralResult<PathBuf> {
    Ok(output_dir.join(format!("{}_focal.tif", file_stem(input)?)))
}

/// Filter `input` and write the single-band result to `output`
pub fn focal(input: &Path, output: &Path, ctx: &ExecutionContext) -> SpectralResult<()> {
    let filtered = high_pass_filter(input, ctx)?;
    let band = filtered.band(0)?;
    write_raster(&band, filtered.geo_transform.as_ref(), &filtered.projection, output)?;
    log::info!("Focal filter written: {}", output.display());
    Ok(())
}
