use gdal::raster::{Buffer, RasterCreationOption};
use gdal::{Dataset, DriverManager};
use multispec::core::high_pass::{focal, high_pass_filter};
use multispec::io::{raster_bbox, read_raster};
use multispec::{ExecutionContext, SpectralError};
use std::path::Path;
use tempfile::TempDir;

const GEO_TRANSFORM: [f64; 6] = [500000.0, 0.3, 0.0, 4200000.0, 0.0, -0.3];

fn gtiff_available() -> bool {
    DriverManager::get_driver_by_name("GTiff").is_ok()
}

/// Write a Float32 GeoTIFF with one band per entry of `bands`
fn write_test_raster(path: &Path, width: usize, height: usize, bands: &[(f32, Option<f64>)]) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let options = [RasterCreationOption { key: "COMPRESS", value: "DEFLATE" }];
    let mut dataset = driver
        .create_with_band_type_with_options::<f32, _>(path, width as isize, height as isize, bands.len() as isize, &options)
        .unwrap();
    dataset.set_geo_transform(&GEO_TRANSFORM).unwrap();

    for (idx, (value, nodata)) in bands.iter().enumerate() {
        let mut band = dataset.rasterband(idx as isize + 1).unwrap();
        let buffer = Buffer::new((width, height), vec![*value; width * height]);
        band.write((0, 0), (width, height), &buffer).unwrap();
        band.set_no_data_value(*nodata).unwrap();
    }
}

#[test]
fn test_uniform_raster_filters_to_zero_interior() {
    if !gtiff_available() {
        eprintln!("Skipping test: GTiff driver not available");
        return;
    }
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("pan.tif");
    write_test_raster(&input, 12, 10, &[(42.0, Some(0.0))]);

    let ctx = ExecutionContext { threads: 2, chunk_rows: 3 };
    let filtered = high_pass_filter(&input, &ctx).unwrap();

    assert_eq!(filtered.band_count(), 1);
    assert_eq!(filtered.shape(), (10, 12));
    assert_eq!(filtered.geo_transform.unwrap().to_gdal(), GEO_TRANSFORM);

    let band = filtered.band(0).unwrap();
    for ((i, j), v) in band.indexed_iter() {
        if i < 2 || j < 2 || i >= 8 || j >= 10 {
            assert!(v.is_nan(), "border ({}, {}) should be NaN", i, j);
        } else {
            assert!(v.abs() < 1e-4, "interior ({}, {}) = {}", i, j, v);
        }
    }
}

#[test]
fn test_inconsistent_nodata_is_rejected() {
    if !gtiff_available() {
        eprintln!("Skipping test: GTiff driver not available");
        return;
    }
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("mul.tif");
    write_test_raster(&input, 8, 8, &[(1.0, Some(0.0)), (1.0, Some(-9999.0))]);

    let result = high_pass_filter(&input, &ExecutionContext::default());
    match result {
        Err(SpectralError::InconsistentNodata { band, expected, found }) => {
            assert_eq!(band, 2);
            assert_eq!(expected, Some(0.0));
            assert_eq!(found, Some(-9999.0));
        }
        other => panic!("expected InconsistentNodata, got {:?}", other.map(|r| r.shape())),
    }
}

#[test]
fn test_nodata_pixels_become_nan_on_read() {
    if !gtiff_available() {
        eprintln!("Skipping test: GTiff driver not available");
        return;
    }
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("zeros.tif");
    write_test_raster(&input, 4, 5, &[(0.0, Some(0.0)), (0.0, Some(0.0))]);

    let raster = read_raster(&input, &ExecutionContext { threads: 1, chunk_rows: 2 }).unwrap();
    assert_eq!(raster.band_count(), 2);
    assert!(raster.data.iter().all(|v| v.is_nan()));
    assert_eq!(raster.nodata, Some(0.0));
}

#[test]
fn test_focal_writes_georeferenced_float_raster() {
    if !gtiff_available() {
        eprintln!("Skipping test: GTiff driver not available");
        return;
    }
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("pan.tif");
    let output = dir.path().join("pan_focal.tif");
    write_test_raster(&input, 9, 9, &[(7.0, None)]);

    focal(&input, &output, &ExecutionContext::default()).unwrap();

    let dataset = Dataset::open(&output).unwrap();
    assert_eq!(dataset.raster_count(), 1);
    assert_eq!(dataset.raster_size(), (9, 9));
    assert_eq!(dataset.geo_transform().unwrap(), GEO_TRANSFORM);
    assert!(dataset.rasterband(1).unwrap().no_data_value().unwrap().is_nan());

    let bbox = raster_bbox(&output).unwrap();
    assert!((bbox.max_x - (500000.0 + 9.0 * 0.3)).abs() < 1e-6);
    assert!((bbox.min_y - (4200000.0 - 9.0 * 0.3)).abs() < 1e-6);
}
