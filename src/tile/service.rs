//! Tile Service for orchestrating tile rendering.
//!
//! The TileService is the main entry point for tile requests:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           TileService                            │
//! │  get_tile(source, z, x, y)                                       │
//! │    1. Validate zoom            5. Resample window (with timeout) │
//! │    2. Check catalog            6. Composite RGBA + alpha         │
//! │    3. Check cache ──hit──▶ ret 7. Encode PNG (or EMPTY)          │
//! │    4. Tile bbox, get source    8. Cache & return                 │
//! └──────────────────────────────────────────────────────────────────┘
//!        │               │                   │                │
//!        ▼               ▼                   ▼                ▼
//!   ┌─────────┐  ┌────────────────┐  ┌────────────────┐  ┌──────────┐
//!   │TileCache│  │ SourceRegistry │  │ WindowResampler│  │PngEncoder│
//!   └─────────┘  └────────────────┘  └────────────────┘  └──────────┘
//! ```
//!
//! Geometric misses and failed raster reads both produce the EMPTY tile and
//! are cached like any other result. Columns or rows off the grid return the
//! EMPTY tile straight after step 2 and are not cached. Only unknown or unopenable sources and
//! encoder failures are errors.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{RasterError, TileError};
use crate::raster::{DatasetOpener, RasterSource, SourceRegistry};

use super::cache::{TileCache, DEFAULT_CACHE_TILES};
use super::compositor::composite;
use super::encoder::{PngCompression, PngTileEncoder};
use super::grid::{TileAddress, MAX_ZOOM};
use super::window::{Resampled, WindowResampler, DEFAULT_READ_TIMEOUT};

/// Default duration above which a rendered tile is logged as slow.
pub const DEFAULT_SLOW_TILE_THRESHOLD: Duration = Duration::from_millis(100);

// =============================================================================
// Tile Request
// =============================================================================

/// A request for one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Source name
    pub source: String,

    /// Zoom level (validated against [`MAX_ZOOM`])
    pub z: i64,

    /// Column; anything outside `[0, 2^z)` is off the grid
    pub x: i64,

    /// Row; anything outside `[0, 2^z)` is off the grid
    pub y: i64,
}

impl TileRequest {
    pub fn new(source: impl Into<String>, z: i64, x: i64, y: i64) -> Self {
        Self {
            source: source.into(),
            z,
            x,
            y,
        }
    }

    /// Validate the zoom and build the cache key.
    ///
    /// Returns `Ok(None)` when the column or row is outside `[0, 2^z)`: the
    /// tile lies outside the world and is always the empty tile.
    pub fn address(&self) -> Result<Option<TileAddress>, TileError> {
        let z = u8::try_from(self.z)
            .ok()
            .filter(|z| *z <= MAX_ZOOM)
            .ok_or(TileError::InvalidZoom {
                zoom: self.z,
                max: MAX_ZOOM,
            })?;

        let tiles = 1i64 << z;
        if !(0..tiles).contains(&self.x) || !(0..tiles).contains(&self.y) {
            return Ok(None);
        }

        // Both are below 2^30 here
        Ok(Some(TileAddress::new(
            self.source.as_str(),
            z,
            self.x as u32,
            self.y as u32,
        )))
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Encoded PNG tile data
    pub data: Bytes,

    /// Whether this tile was served from cache
    pub cache_hit: bool,
}

// =============================================================================
// Options
// =============================================================================

/// Tunables for [`TileService`].
#[derive(Debug, Clone, Copy)]
pub struct TileServiceOptions {
    /// Maximum number of cached tiles
    pub cache_tiles: NonZeroUsize,

    /// Bound on each raster read
    pub read_timeout: Duration,

    /// Rendering time above which a tile is logged as slow
    pub slow_tile_threshold: Duration,

    /// PNG compression effort
    pub compression: PngCompression,
}

impl Default for TileServiceOptions {
    fn default() -> Self {
        Self {
            cache_tiles: DEFAULT_CACHE_TILES,
            read_timeout: DEFAULT_READ_TIMEOUT,
            slow_tile_threshold: DEFAULT_SLOW_TILE_THRESHOLD,
            compression: PngCompression::Default,
        }
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for rendering and caching tiles.
///
/// Constructed once at startup and shared (behind `Arc`) by all handlers.
///
/// # Example
///
/// ```ignore
/// use cog_tile_server::raster::{GeoTiffOpener, SourceCatalog, SourceRegistry};
/// use cog_tile_server::tile::{TileRequest, TileService};
///
/// let catalog = SourceCatalog::discover(Path::new("/data/rasters"));
/// let registry = SourceRegistry::new(GeoTiffOpener::new(), catalog);
/// let service = TileService::new(registry)?;
///
/// let response = service.get_tile(TileRequest::new("satellite", 5, 10, 10)).await?;
/// println!("{} bytes, cache hit: {}", response.data.len(), response.cache_hit);
/// ```
pub struct TileService<O: DatasetOpener> {
    /// Raster sources
    registry: Arc<SourceRegistry<O>>,

    /// Encoded tiles by address
    cache: TileCache,

    /// Window planning and raster reads
    resampler: WindowResampler,

    /// PNG encoder and the shared EMPTY payload
    encoder: PngTileEncoder,

    slow_tile_threshold: Duration,
}

impl<O: DatasetOpener> TileService<O> {
    /// Create a tile service with default options.
    pub fn new(registry: SourceRegistry<O>) -> Result<Self, TileError> {
        Self::with_options(registry, TileServiceOptions::default())
    }

    /// Create a tile service with custom options.
    pub fn with_options(
        registry: SourceRegistry<O>,
        options: TileServiceOptions,
    ) -> Result<Self, TileError> {
        Self::with_shared_registry(Arc::new(registry), options)
    }

    /// Create a tile service over a registry shared with other components.
    pub fn with_shared_registry(
        registry: Arc<SourceRegistry<O>>,
        options: TileServiceOptions,
    ) -> Result<Self, TileError> {
        Ok(Self {
            registry,
            cache: TileCache::with_capacity(options.cache_tiles),
            resampler: WindowResampler::new(options.read_timeout),
            encoder: PngTileEncoder::new(options.compression)?,
            slow_tile_threshold: options.slow_tile_threshold,
        })
    }

    /// Get a tile, using the cache when available.
    ///
    /// # Errors
    ///
    /// - [`TileError::InvalidZoom`] for zoom levels outside `0..=MAX_ZOOM`
    /// - [`TileError::SourceNotFound`] for names outside the catalog
    /// - [`TileError::SourceUnavailable`] if the source could not be opened
    /// - [`TileError::EncodeError`] if PNG encoding fails
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let address = request.address()?;

        if !self.registry.contains(&request.source) {
            return Err(TileError::SourceNotFound {
                source_name: request.source,
            });
        }

        let Some(address) = address else {
            // Off-grid tiles still 404 for a source that cannot be opened
            self.open_source(&request.source).await?;
            debug!(
                source = %request.source,
                z = request.z,
                x = request.x,
                y = request.y,
                "Tile outside the grid"
            );
            return Ok(TileResponse {
                data: self.encoder.empty_tile(),
                cache_hit: false,
            });
        };

        if let Some(data) = self.cache.get(&address).await {
            debug!(tile = %address, "Tile cache hit");
            return Ok(TileResponse {
                data,
                cache_hit: true,
            });
        }

        let started = Instant::now();
        let data = self.render_tile(&address).await?;
        let elapsed = started.elapsed();

        if elapsed > self.slow_tile_threshold {
            warn!(
                tile = %address,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow tile"
            );
        }

        self.cache.put(address, data.clone()).await;

        Ok(TileResponse {
            data,
            cache_hit: false,
        })
    }

    /// Render a tile without consulting or filling the cache.
    pub async fn render_tile(&self, address: &TileAddress) -> Result<Bytes, TileError> {
        let source = self.open_source(&address.source).await?;

        match self.resampler.resample(&source, &address.bbox()).await {
            Resampled::Empty(reason) => {
                debug!(tile = %address, reason = ?reason, "Empty tile");
                Ok(self.encoder.empty_tile())
            }
            Resampled::Block { plan, block } => {
                let rgba = composite(&block, &plan.placement, self.resampler.tile_size());
                self.encoder.encode(&rgba)
            }
        }
    }

    async fn open_source(
        &self,
        name: &str,
    ) -> Result<Arc<RasterSource<O::Dataset>>, TileError> {
        self.registry.get_source(name).await.map_err(|e| match e {
            RasterError::UnknownSource(source_name) => TileError::SourceNotFound { source_name },
            other => TileError::SourceUnavailable {
                source_name: name.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// The shared EMPTY tile payload.
    pub fn empty_tile(&self) -> Bytes {
        self.encoder.empty_tile()
    }

    /// Number of tiles currently cached.
    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    /// Get tile cache statistics.
    ///
    /// Returns `(entry_count, capacity, payload_bytes)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        let count = self.cache.len().await;
        let bytes = self.cache.size().await;
        (count, self.cache.capacity(), bytes)
    }

    /// Clear the tile cache.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Get a reference to the source registry.
    pub fn registry(&self) -> &Arc<SourceRegistry<O>> {
        &self.registry
    }
}

// =============================================================================
// Tests
// =============================================================================
