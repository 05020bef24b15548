//! Raster dataset abstraction.
//!
//! This module defines the boundary between the tile pipeline and the library
//! that actually decodes raster files. The pipeline only needs three things
//! from a raster:
//!
//! - its pixel geometry (size, band count),
//! - its geotransform (pixel ↔ projected coordinates),
//! - a rectangular pixel window read back resampled to an output size.
//!
//! [`RasterDataset`] expresses exactly that, and [`DatasetOpener`] creates
//! datasets from file paths so the registry can stay storage-agnostic.

use std::path::Path;

use async_trait::async_trait;

use crate::error::RasterError;

// =============================================================================
// Geometry
// =============================================================================

/// Affine mapping between pixel coordinates and projected coordinates.
///
/// Only north-up transforms are represented (no rotation terms). For the
/// usual north-up raster `pixel_height` is negative: rows increase downward
/// while projected Y decreases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Projected X of the top-left corner of pixel (0, 0)
    pub origin_x: f64,

    /// Projected Y of the top-left corner of pixel (0, 0)
    pub origin_y: f64,

    /// Width of one pixel in projected units
    pub pixel_width: f64,

    /// Height of one pixel in projected units (negative for north-up)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new geotransform.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Convert a projected coordinate to fractional pixel coordinates.
    #[inline]
    pub fn to_pixel(&self, geo_x: f64, geo_y: f64) -> (f64, f64) {
        (
            (geo_x - self.origin_x) / self.pixel_width,
            (geo_y - self.origin_y) / self.pixel_height,
        )
    }

    /// Convert fractional pixel coordinates to a projected coordinate.
    #[inline]
    pub fn to_geo(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.origin_x + px * self.pixel_width,
            self.origin_y + py * self.pixel_height,
        )
    }

    /// Whether both pixel sizes are finite and non-zero.
    pub fn is_valid(&self) -> bool {
        self.origin_x.is_finite()
            && self.origin_y.is_finite()
            && self.pixel_width.is_finite()
            && self.pixel_height.is_finite()
            && self.pixel_width != 0.0
            && self.pixel_height != 0.0
    }
}

/// Geographic extent of a raster in projected units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Pixel geometry of an opened raster.
///
/// Captured once when the raster is opened and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGeometry {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Number of bands (samples per pixel)
    pub bands: usize,

    /// Pixel-to-projected transform
    pub transform: GeoTransform,
}

impl RasterGeometry {
    /// Projected bounds covered by the raster.
    ///
    /// West/north come from the origin, east/south from the far corner. The
    /// min/max normalisation keeps the bounds well-ordered even for rasters
    /// stored bottom-up.
    pub fn bounds(&self) -> GeoBounds {
        let t = &self.transform;
        let (x0, y0) = (t.origin_x, t.origin_y);
        let (x1, y1) = t.to_geo(f64::from(self.width), f64::from(self.height));

        GeoBounds {
            west: x0.min(x1),
            south: y0.min(y1),
            east: x0.max(x1),
            north: y0.max(y1),
        }
    }
}

// =============================================================================
// Windows and Blocks
// =============================================================================

/// A rectangle in source pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    /// First column
    pub col: u32,

    /// First row
    pub row: u32,

    /// Number of columns
    pub width: u32,

    /// Number of rows
    pub height: u32,
}

impl PixelWindow {
    pub fn new(col: u32, row: u32, width: u32, height: u32) -> Self {
        Self {
            col,
            row,
            width,
            height,
        }
    }

    /// Whether the window covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 8-bit pixel data for a resampled window.
///
/// Data is band-sequential: all of band 0 row by row, then all of band 1,
/// and so on (shape `bands × height × width`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBlock {
    bands: usize,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBlock {
    /// Wrap band-sequential data, checking its length against the shape.
    pub fn new(bands: usize, width: u32, height: u32, data: Vec<u8>) -> Result<Self, RasterError> {
        let expected = bands * width as usize * height as usize;
        if data.len() != expected {
            return Err(RasterError::InvalidBlock {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            bands,
            width,
            height,
            data,
        })
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major samples of one band, or `None` past the last band.
    pub fn band(&self, index: usize) -> Option<&[u8]> {
        if index >= self.bands {
            return None;
        }
        let plane = self.width as usize * self.height as usize;
        Some(&self.data[index * plane..(index + 1) * plane])
    }
}

// =============================================================================
// Traits
// =============================================================================

/// An opened raster that can serve resampled windows.
///
/// Implementations must be shareable across tasks; the tile pipeline calls
/// [`read_window`](RasterDataset::read_window) concurrently for independent
/// tiles.
#[async_trait]
pub trait RasterDataset: Send + Sync {
    /// Pixel geometry of the raster.
    fn geometry(&self) -> RasterGeometry;

    /// Read `window` resampled to `out_width × out_height` pixels.
    ///
    /// Only the first `bands` bands are returned (clamped to the band count).
    async fn read_window(
        &self,
        window: PixelWindow,
        out_width: u32,
        out_height: u32,
        bands: usize,
    ) -> Result<PixelBlock, RasterError>;
}

/// Opens raster datasets from file paths.
#[async_trait]
pub trait DatasetOpener: Send + Sync {
    /// The dataset type this opener produces.
    type Dataset: RasterDataset + 'static;

    /// Open the raster at `path`.
    async fn open(&self, path: &Path) -> Result<Self::Dataset, RasterError>;
}

// =============================================================================
// Tests
// =============================================================================
