use crate::config::ExecutionContext;
use crate::types::{BandImage, GeoTransform, RasterArray, SpectralError, SpectralResult};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::{Dataset, DriverManager};
use ndarray::{s, Array2, Array3};
use std::path::Path;

/// Bounding box and resolution of a raster file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterBbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub res_x: f64,
    pub res_y: f64,
}

/// Read all bands of a raster into a (band, row, col) array.
///
/// Bands are read in row windows of `ctx.chunk_rows`, top to bottom. The
/// nodata sentinel must be identical on every band; matching pixels are
/// replaced by NaN.
pub fn read_raster<P: AsRef<Path>>(path: P, ctx: &ExecutionContext) -> SpectralResult<RasterArray> {
    log::info!("Reading raster: {}", path.as_ref().display());

    if ctx.chunk_rows == 0 {
        return Err(SpectralError::InvalidInput("chunk_rows must be positive".to_string()));
    }

    let dataset = Dataset::open(path.as_ref())?;
    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count() as usize;
    if band_count == 0 {
        return Err(SpectralError::InvalidInput(format!(
            "{} has no raster bands",
            path.as_ref().display()
        )));
    }

    let geo_transform = dataset.geo_transform().ok().map(GeoTransform::from_gdal);
    let projection = dataset.projection();
    log::debug!("Raster size: {} bands x {} rows x {} cols", band_count, height, width);

    let nodata = consistent_nodata(&dataset, band_count)?;
    let mut data = Array3::<f32>::zeros((band_count, height, width));

    for band_idx in 0..band_count {
        let band = dataset.rasterband((band_idx + 1) as isize)?;

        for row_start in (0..height).step_by(ctx.chunk_rows) {
            let rows = ctx.chunk_rows.min(height - row_start);
            let buffer = band.read_as::<f32>((0, row_start as isize), (width, rows), (width, rows), None)?;
            let chunk = Array2::from_shape_vec((rows, width), buffer.data)
                .map_err(|e| SpectralError::Processing(format!("Failed to reshape raster chunk: {}", e)))?;
            data.slice_mut(s![band_idx, row_start..row_start + rows, ..]).assign(&chunk);
        }
    }

    if let Some(sentinel) = nodata.filter(|v| !v.is_nan()) {
        let sentinel = sentinel as f32;
        let mut replaced = 0usize;
        data.mapv_inplace(|v| {
            if v == sentinel {
                replaced += 1;
                f32::NAN
            } else {
                v
            }
        });
        log::debug!("Replaced {} nodata pixels ({}) with NaN", replaced, sentinel);
    }

    Ok(RasterArray {
        data,
        geo_transform,
        projection,
        nodata,
    })
}

/// Nodata value shared by every band, or `InconsistentNodata`
fn consistent_nodata(dataset: &Dataset, band_count: usize) -> SpectralResult<Option<f64>> {
    let first = dataset.rasterband(1)?.no_data_value();
    for band_idx in 2..=band_count {
        let found = dataset.rasterband(band_idx as isize)?.no_data_value();
        if !same_nodata(first, found) {
            return Err(SpectralError::InconsistentNodata {
                band: band_idx,
                expected: first,
                found,
            });
        }
        log::debug!("Band {} nodata value: {:?}", band_idx, found);
    }
    Ok(first)
}

fn same_nodata(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => false,
    }
}

/// Write a single-band Float32 GeoTIFF (DEFLATE, floating-point predictor, NaN nodata)
pub fn write_raster<P: AsRef<Path>>(
    image: &BandImage,
    geo_transform: Option<&GeoTransform>,
    projection: &str,
    output_path: P,
) -> SpectralResult<()> {
    log::info!("Writing raster: {}", output_path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = image.dim();
    let options = [
        RasterCreationOption { key: "COMPRESS", value: "DEFLATE" },
        RasterCreationOption { key: "PREDICTOR", value: "3" },
    ];

    let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        1,
        &options,
    )?;

    if let Some(transform) = geo_transform {
        dataset.set_geo_transform(&transform.to_gdal())?;
    }
    if !projection.is_empty() {
        dataset.set_projection(projection)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<f32> = image.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(f64::NAN))?;

    Ok(())
}

/// Bounding box `[minx, miny, maxx, maxy]` and resolution of a raster file
pub fn raster_bbox<P: AsRef<Path>>(path: P) -> SpectralResult<RasterBbox> {
    if !path.as_ref().exists() {
        return Err(SpectralError::InvalidInput(format!(
            "Raster {} does not exist",
            path.as_ref().display()
        )));
    }
    let dataset = Dataset::open(path.as_ref())?;
    let gt = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();

    let res_x = gt[1];
    let res_y = gt[5];
    let ulx = gt[0];
    let uly = gt[3];
    let lrx = ulx + width as f64 * res_x;
    let lry = uly + height as f64 * res_y;

    Ok(RasterBbox {
        min_x: ulx,
        min_y: lry,
        max_x: lrx,
        max_y: uly,
        res_x,
        res_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_nodata() {
        assert!(same_nodata(None, None));
        assert!(same_nodata(Some(0.0), Some(0.0)));
        assert!(same_nodata(Some(f64::NAN), Some(f64::NAN)));
        assert!(!same_nodata(Some(0.0), None));
        assert!(!same_nodata(Some(0.0), Some(-9999.0)));
    }
}
