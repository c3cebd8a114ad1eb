//! I/O modules for reading image metadata, calibration tables, index catalogs and rasters

pub mod calibration_table;
pub mod catalog;
pub mod files;
pub mod footprint;
pub mod imd;
pub mod raster;

pub use calibration_table::CalibrationTable;
pub use catalog::{IndexCatalog, IndexEntry};
pub use imd::ImageMetadata;
pub use raster::{raster_bbox, read_raster, write_raster};
