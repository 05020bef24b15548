//! Source registry: lazily opened, memoized raster sources.
//!
//! The registry owns one handle per catalogued source name. The first request
//! for a name opens the raster; every later request gets the same
//! [`RasterSource`] back without touching the filesystem.
//!
//! Failures are memoized too. A source whose file is missing or unreadable is
//! recorded as unavailable and every later request fails fast with the same
//! error, so a permanently-missing raster costs one open attempt per process.
//!
//! # Concurrency
//!
//! Each name gets a `tokio::sync::OnceCell` stored in a read-mostly map.
//! Concurrent first requests for the same name all wait on the same cell and
//! only one of them runs the open; after that, lookups take the map's read
//! lock and never contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

use crate::error::RasterError;

use super::catalog::SourceCatalog;
use super::dataset::{DatasetOpener, GeoBounds, RasterDataset, RasterGeometry};

// =============================================================================
// RasterSource
// =============================================================================

/// An opened raster source.
///
/// Geometry is captured at open time and never changes afterwards.
#[derive(Debug)]
pub struct RasterSource<D> {
    name: String,
    path: PathBuf,
    geometry: RasterGeometry,
    dataset: D,
}

impl<D: RasterDataset> RasterSource<D> {
    /// Wrap an opened dataset.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, dataset: D) -> Self {
        let geometry = dataset.geometry();
        Self {
            name: name.into(),
            path: path.into(),
            geometry,
            dataset,
        }
    }

    /// Logical source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometry(&self) -> RasterGeometry {
        self.geometry
    }

    /// Projected bounds (west/south/east/north).
    pub fn bounds(&self) -> GeoBounds {
        self.geometry.bounds()
    }

    /// The underlying dataset, for windowed reads.
    pub fn dataset(&self) -> &D {
        &self.dataset
    }
}

// =============================================================================
// SourceRegistry
// =============================================================================

/// Outcome of the one open attempt made for a name.
enum SourceSlot<D> {
    Ready(Arc<RasterSource<D>>),
    Unavailable(RasterError),
}

type SlotCell<D> = Arc<OnceCell<SourceSlot<D>>>;

/// Process-wide registry of raster sources.
pub struct SourceRegistry<O: DatasetOpener> {
    /// Opens datasets from paths
    opener: O,

    /// Names that may be served, and where their files live
    catalog: SourceCatalog,

    /// One cell per requested name, filled by the first open
    slots: RwLock<HashMap<String, SlotCell<O::Dataset>>>,

    /// Number of open attempts made so far
    open_attempts: AtomicUsize,
}

impl<O: DatasetOpener> SourceRegistry<O> {
    /// Create a registry serving the sources in `catalog`.
    ///
    /// Nothing is opened until the first request (or [`warm_up`](Self::warm_up)).
    pub fn new(opener: O, catalog: SourceCatalog) -> Self {
        Self {
            opener,
            catalog,
            slots: RwLock::new(HashMap::new()),
            open_attempts: AtomicUsize::new(0),
        }
    }

    /// Get a source, opening it on first access.
    ///
    /// # Errors
    /// - [`RasterError::UnknownSource`] if `name` is not in the catalog
    /// - the (memoized) open error if the raster could not be opened
    pub async fn get_source(
        &self,
        name: &str,
    ) -> Result<Arc<RasterSource<O::Dataset>>, RasterError> {
        let path = self
            .catalog
            .path(name)
            .ok_or_else(|| RasterError::UnknownSource(name.to_string()))?;

        let cell = self.slot(name).await;
        let slot = cell.get_or_init(|| self.open_source(name, path)).await;

        match slot {
            SourceSlot::Ready(source) => Ok(Arc::clone(source)),
            SourceSlot::Unavailable(err) => Err(err.clone()),
        }
    }

    /// Fetch or create the cell for `name`.
    async fn slot(&self, name: &str) -> SlotCell<O::Dataset> {
        if let Some(cell) = self.slots.read().await.get(name) {
            return Arc::clone(cell);
        }

        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    async fn open_source(&self, name: &str, path: &Path) -> SourceSlot<O::Dataset> {
        self.open_attempts.fetch_add(1, Ordering::Relaxed);

        match self.opener.open(path).await {
            Ok(dataset) => {
                let source = RasterSource::new(name, path, dataset);
                let geometry = source.geometry();
                info!(
                    source = %name,
                    path = %path.display(),
                    width = geometry.width,
                    height = geometry.height,
                    bands = geometry.bands,
                    "Opened raster source"
                );
                SourceSlot::Ready(Arc::new(source))
            }
            Err(err) => {
                warn!(source = %name, error = %err, "Raster source unavailable");
                SourceSlot::Unavailable(err)
            }
        }
    }

    /// Open every catalogued source, in name order.
    ///
    /// Returns each name with its open result. Failures are memoized exactly
    /// as they would be for a tile request.
    pub async fn warm_up(
        &self,
    ) -> Vec<(String, Result<Arc<RasterSource<O::Dataset>>, RasterError>)> {
        let mut results = Vec::with_capacity(self.catalog.len());
        for name in self.catalog.names() {
            let result = self.get_source(&name).await;
            results.push((name, result));
        }
        results
    }

    /// The catalog this registry serves.
    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    /// Catalogued source names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.catalog.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalog.contains(name)
    }

    /// Number of sources opened successfully so far.
    pub async fn opened_count(&self) -> usize {
        let slots = self.slots.read().await;
        slots
            .values()
            .filter(|cell| matches!(cell.get(), Some(SourceSlot::Ready(_))))
            .count()
    }

    /// Number of open attempts made so far (successful or not).
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
