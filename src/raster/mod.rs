//! Raster sources.
//!
//! - [`dataset`]: the dataset/opener traits and pixel geometry types
//! - [`geotiff`]: the GeoTIFF / COG implementation on top of the `tiff` crate
//! - [`catalog`]: logical source names and their files
//! - [`registry`]: lazily opened, memoized sources

pub mod catalog;
pub mod dataset;
pub mod geotiff;
pub mod registry;

pub use catalog::{source_name, SourceCatalog, SourceMapping};
pub use dataset::{
    DatasetOpener, GeoBounds, GeoTransform, PixelBlock, PixelWindow, RasterDataset,
    RasterGeometry,
};
pub use geotiff::{GeoTiffDataset, GeoTiffOpener};
pub use registry::{RasterSource, SourceRegistry};
