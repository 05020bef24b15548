use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the raster primitives (opening, geometry, windowed reads).
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// The raster file does not exist
    #[error("Raster file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be opened or parsed as a raster
    #[error("Failed to open raster {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },

    /// The raster has no embedded pixel-to-geographic transform
    #[error("Raster {} has no geotransform (ModelTransformation or ModelTiepoint + ModelPixelScale)", .0.display())]
    MissingGeotransform(PathBuf),

    /// The raster uses a layout or sample type this server cannot read
    #[error("Unsupported raster: {0}")]
    Unsupported(String),

    /// A windowed read failed
    #[error("Raster read failed: {0}")]
    Read(String),

    /// A windowed read did not finish within the configured timeout
    #[error("Raster read timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// A pixel block does not have the size implied by its shape
    #[error("Invalid pixel block: expected {expected} bytes, got {actual}")]
    InvalidBlock { expected: usize, actual: usize },

    /// The name is not part of the source catalog
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

/// Errors that can occur while serving a tile request.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The source name is not in the catalog
    #[error("Unknown source: {source_name}")]
    SourceNotFound { source_name: String },

    /// The source is catalogued but its raster could not be opened
    #[error("Source not available: {source_name}: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// The tile path does not have the `{source}/{z}/{x}/{y}.png` shape
    #[error("Invalid tile path: {0}")]
    InvalidPath(String),

    /// A coordinate segment is not a non-negative integer
    #[error("Invalid tile coordinates: {0}")]
    InvalidCoordinates(String),

    /// The zoom level is above the supported maximum
    #[error("Invalid zoom level {zoom} (maximum is {max})")]
    InvalidZoom { zoom: i64, max: u8 },

    /// PNG encoding failed
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },
}
