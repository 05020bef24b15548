//! Test utilities for integration tests.
//!
//! Writes small geo-referenced TIFFs into a temporary directory and builds a
//! router over them with the real GeoTIFF opener.

use std::fs::File;
use std::path::Path;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{ImageFormat, RgbaImage};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

use cog_tile_server::raster::geotiff::{model_tag, MODEL_PIXEL_SCALE_TAG, MODEL_TIEPOINT_TAG};
use cog_tile_server::tile::tile_bbox;
use cog_tile_server::{
    create_router, GeoTiffOpener, RouterConfig, SourceCatalog, SourceRegistry, TileService,
    TileServiceOptions,
};

/// Tile exactly covered by the fixture raster.
pub const FIXTURE_TILE: (u8, u32, u32) = (5, 10, 10);

/// Fixture raster side length in pixels.
pub const FIXTURE_SIZE: u32 = 64;

/// Colour of the right half of the fixture; the left half is pure black.
pub const FIXTURE_COLOR: [u8; 3] = [10, 60, 110];

// =============================================================================
// GeoTIFF Fixtures
// =============================================================================

/// Write an RGB GeoTIFF with a tiepoint/pixel-scale georeference.
pub fn write_geotiff(
    path: &Path,
    width: u32,
    height: u32,
    data: &[u8],
    origin: (f64, f64),
    pixel_size: f64,
) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder.new_image::<colortype::RGB8>(width, height).unwrap();

    let scale = [pixel_size, pixel_size, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, origin.0, origin.1, 0.0];
    image
        .encoder()
        .write_tag(model_tag(MODEL_PIXEL_SCALE_TAG), &scale[..])
        .unwrap();
    image
        .encoder()
        .write_tag(model_tag(MODEL_TIEPOINT_TAG), &tiepoint[..])
        .unwrap();

    image.write_data(data).unwrap();
}

/// Write the fixture raster covering exactly [`FIXTURE_TILE`].
///
/// Left half pure black (transparent once composited), right half [`FIXTURE_COLOR`].
pub fn write_fixture(path: &Path) {
    let (z, x, y) = FIXTURE_TILE;
    let bbox = tile_bbox(z, x, y);
    let pixel_size = (bbox.east - bbox.west) / f64::from(FIXTURE_SIZE);

    let mut data = Vec::with_capacity((FIXTURE_SIZE * FIXTURE_SIZE * 3) as usize);
    for _row in 0..FIXTURE_SIZE {
        for col in 0..FIXTURE_SIZE {
            if col < FIXTURE_SIZE / 2 {
                data.extend_from_slice(&[0, 0, 0]);
            } else {
                data.extend_from_slice(&FIXTURE_COLOR);
            }
        }
    }

    write_geotiff(
        path,
        FIXTURE_SIZE,
        FIXTURE_SIZE,
        &data,
        (bbox.west, bbox.north),
        pixel_size,
    );
}

// =============================================================================
// Router Construction
// =============================================================================

/// A raster directory holding `ortho_cog.tif` (served as `ortho`).
pub fn fixture_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_fixture(&dir.path().join("ortho_cog.tif"));
    dir
}

/// Catalog for a fixture directory plus a `ghost` source whose file is missing.
pub fn fixture_catalog(dir: &TempDir) -> SourceCatalog {
    let mut catalog = SourceCatalog::discover(dir.path());
    catalog.insert("ghost", dir.path().join("ghost.tif"));
    catalog
}

pub fn build_router(dir: &TempDir) -> Router {
    build_router_with_options(dir, TileServiceOptions::default())
}

pub fn build_router_with_options(dir: &TempDir, options: TileServiceOptions) -> Router {
    let registry = SourceRegistry::new(GeoTiffOpener::new(), fixture_catalog(dir));
    let service = TileService::with_options(registry, options).unwrap();
    create_router(service, RouterConfig::new().with_tracing(false))
}

// =============================================================================
// HTTP Helpers
// =============================================================================

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn decode_png(data: &[u8]) -> RgbaImage {
    image::load_from_memory_with_format(data, ImageFormat::Png)
        .unwrap()
        .to_rgba8()
}

/// True if `data` is the 1×1 fully transparent EMPTY tile.
pub fn is_empty_tile(data: &[u8]) -> bool {
    let image = decode_png(data);
    image.dimensions() == (1, 1) && image.get_pixel(0, 0)[3] == 0
}
