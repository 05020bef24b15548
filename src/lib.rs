//! # COG Tile Server
//!
//! A Web-Mercator tile server for GeoTIFF / Cloud-Optimized GeoTIFF rasters.
//!
//! Each request for `/tiles/{source}/{z}/{x}/{y}.png` is answered by cropping
//! the matching window out of a raster already in EPSG:3857, resampling it to
//! its footprint on a 256×256 canvas, alpha-compositing and PNG encoding the
//! result. Encoded tiles are kept in an in-memory LRU cache.
//!
//! ## Features
//!
//! - **Lazy sources**: rasters are opened on first use and memoized, including failures
//! - **Overview-aware reads**: the coarsest overview that still covers the output is used
//! - **Graceful degradation**: tiles outside a raster, or whose read fails, are a
//!   transparent EMPTY tile rather than an error
//! - **Tile caching**: entry-bounded LRU of encoded PNGs
//!
//! ## Architecture
//!
//! - [`raster`] - Dataset traits, the GeoTIFF reader, source catalog and registry
//! - [`tile`] - Grid math, window planning, compositing, caching and encoding
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use cog_tile_server::{create_router, GeoTiffOpener, RouterConfig, SourceCatalog};
//! use cog_tile_server::{SourceRegistry, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = SourceCatalog::discover(std::path::Path::new("rasters"));
//!     let registry = SourceRegistry::new(GeoTiffOpener::new(), catalog);
//!     let service = TileService::new(registry)?;
//!
//!     let router = create_router(service, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod raster;
pub mod server;
pub mod tile;

pub use config::{CheckConfig, Cli, Command, ServeConfig, SourceArgs};
pub use error::{RasterError, TileError};
pub use raster::{
    DatasetOpener, GeoTiffDataset, GeoTiffOpener, RasterDataset, RasterSource, SourceCatalog,
    SourceMapping, SourceRegistry,
};
pub use server::{create_router, AppState, RouterConfig};
pub use tile::{
    tile_bbox, PngCompression, TileAddress, TileBBox, TileCache, TileRequest, TileResponse,
    TileService, TileServiceOptions,
};
