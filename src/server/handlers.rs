//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /tiles/{source}/{z}/{x}/{y}.png` - Serve a tile
//! - `GET /sources` - List sources and the tile URL template
//! - `GET /sources/{source}` - Geometry of one source
//! - `GET /health` - Health check endpoint

use std::num::IntErrorKind;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{RasterError, TileError};
use crate::raster::DatasetOpener;
use crate::tile::{TileRequest, TileService};

/// Tile URL template advertised by `/sources`.
pub const TILE_URL_TEMPLATE: &str = "/tiles/{source}/{z}/{x}/{y}.png";

/// Default Cache-Control max-age for tiles (one day).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 86_400;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<O: DatasetOpener> {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<O>>,

    /// Cache-Control max-age in seconds for tile responses
    pub cache_max_age: u32,
}

impl<O: DatasetOpener> AppState<O> {
    /// Create a new application state with the default one-day max-age.
    pub fn new(tile_service: TileService<O>) -> Self {
        Self::with_cache_max_age(tile_service, DEFAULT_CACHE_MAX_AGE)
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(tile_service: TileService<O>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

impl<O: DatasetOpener> Clone for AppState<O> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{source}/{z}/{x}/{filename}` where filename is
/// `{y}` or `{y}.png`. Coordinates are taken as strings so malformed values
/// get a JSON 400 instead of the extractor's plain-text rejection.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Source name
    pub source: String,

    /// Zoom level
    pub z: String,

    /// Tile column
    pub x: String,

    /// Tile row with optional .png extension (e.g., "0" or "0.png")
    pub filename: String,
}

impl TilePathParams {
    /// Parse the path into a tile request.
    pub fn to_request(&self) -> Result<TileRequest, TileError> {
        let y = self
            .filename
            .strip_suffix(".png")
            .unwrap_or(&self.filename);

        let z = parse_coordinate("z", &self.z)?;
        let x = parse_coordinate("x", &self.x)?;
        let y = parse_coordinate("y", y)?;

        Ok(TileRequest::new(self.source.as_str(), z, x, y))
    }
}

/// Parse a signed integer coordinate.
///
/// Integers too large for `i64` saturate; they are off the grid either way.
fn parse_coordinate(name: &str, value: &str) -> Result<i64, TileError> {
    value.parse::<i64>().or_else(|e| match e.kind() {
        IntErrorKind::PosOverflow => Ok(i64::MAX),
        IntErrorKind::NegOverflow => Ok(i64::MIN),
        _ => Err(TileError::InvalidCoordinates(format!(
            "{} = '{}'",
            name, value
        ))),
    })
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Catalogued source names
    pub sources: Vec<String>,

    /// Number of cached tiles
    pub cache_size: usize,

    /// Number of sources opened so far
    pub opened_sources: usize,

    /// Service version
    pub version: String,
}

/// Response from the sources list endpoint.
#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    /// Catalogued source names
    pub sources: Vec<String>,

    /// Tile URL template
    #[serde(rename = "tileUrl")]
    pub tile_url: String,
}

/// Projected bounds of a source.
#[derive(Debug, Serialize)]
pub struct BoundsResponse {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Response from the source metadata endpoint.
#[derive(Debug, Serialize)]
pub struct SourceMetadataResponse {
    /// Source name
    pub source: String,

    /// Raster width in pixels
    pub width: u32,

    /// Raster height in pixels
    pub height: u32,

    /// Number of bands
    pub bands: usize,

    /// Pixel size in projected units (x, y)
    pub pixel_size: [f64; 2],

    /// Projected bounds
    pub bounds: BoundsResponse,

    /// Tile URL template with the source filled in
    #[serde(rename = "tileUrl")]
    pub tile_url: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// This implementation logs errors appropriately based on their severity:
/// - 404s at DEBUG level (common and expected)
/// - other 4xx errors at WARN level (client errors)
/// - 5xx errors at ERROR level (server errors)
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            // 404 Not Found
            TileError::SourceNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            TileError::SourceUnavailable { .. } => (StatusCode::NOT_FOUND, "source_unavailable"),

            // 400 Bad Request
            TileError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "invalid_path"),
            TileError::InvalidCoordinates(_) => (StatusCode::BAD_REQUEST, "invalid_coordinates"),
            TileError::InvalidZoom { .. } => (StatusCode::BAD_REQUEST, "invalid_zoom"),

            // 500 Internal Server Error
            TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{source}/{z}/{x}/{y}.png`
///
/// # Path Parameters
///
/// - `source`: Source name
/// - `z`: Zoom level (0-30)
/// - `x`: Tile column
/// - `y`: Tile row, with or without the `.png` suffix
///
/// # Response
///
/// - `200 OK`: PNG tile (a 1×1 transparent PNG when the tile has no data)
/// - `400 Bad Request`: Coordinates are not non-negative integers, or zoom > 30
/// - `404 Not Found`: Unknown or unavailable source
/// - `500 Internal Server Error`: Encoding error
///
/// # Headers
///
/// - `Content-Type: image/png`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Cache: HIT|MISS`
pub async fn tile_handler<O: DatasetOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, TileError> {
    let request = params.to_request()?;
    let response = state.tile_service.get_tile(request).await?;

    let cache_status = if response.cache_hit { "HIT" } else { "MISS" };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
            (X_CACHE, cache_status.to_string()),
        ],
        response.data,
    )
        .into_response())
}

/// Health check endpoint.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `{"status": "ok", "sources": [...], "cache_size": N, "version": "..."}`
pub async fn health_handler<O: DatasetOpener + 'static>(
    State(state): State<AppState<O>>,
) -> Json<HealthResponse> {
    let service = &state.tile_service;

    Json(HealthResponse {
        status: "ok".to_string(),
        sources: service.registry().names(),
        cache_size: service.cache_len().await,
        opened_sources: service.registry().opened_count().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List available sources.
///
/// # Endpoint
///
/// `GET /sources`
///
/// # Response
///
/// `{"sources": [...], "tileUrl": "/tiles/{source}/{z}/{x}/{y}.png"}`
pub async fn sources_handler<O: DatasetOpener + 'static>(
    State(state): State<AppState<O>>,
) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.tile_service.registry().names(),
        tile_url: TILE_URL_TEMPLATE.to_string(),
    })
}

/// Get the geometry of one source, opening it if needed.
///
/// # Endpoint
///
/// `GET /sources/{source}`
///
/// # Response
///
/// - `200 OK`: size, band count, pixel size and projected bounds
/// - `404 Not Found`: Unknown or unavailable source
pub async fn source_metadata_handler<O: DatasetOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(name): Path<String>,
) -> Result<Json<SourceMetadataResponse>, TileError> {
    let source = state
        .tile_service
        .registry()
        .get_source(&name)
        .await
        .map_err(|e| match e {
            RasterError::UnknownSource(source_name) => TileError::SourceNotFound { source_name },
            other => TileError::SourceUnavailable {
                source_name: name.clone(),
                reason: other.to_string(),
            },
        })?;

    let geometry = source.geometry();
    let bounds = source.bounds();

    Ok(Json(SourceMetadataResponse {
        source: name.clone(),
        width: geometry.width,
        height: geometry.height,
        bands: geometry.bands,
        pixel_size: [
            geometry.transform.pixel_width,
            geometry.transform.pixel_height,
        ],
        bounds: BoundsResponse {
            west: bounds.west,
            south: bounds.south,
            east: bounds.east,
            north: bounds.north,
        },
        tile_url: TILE_URL_TEMPLATE.replace("{source}", &name),
    }))
}

/// Fallback for unmatched routes.
///
/// Paths under `/tiles/` that do not have the `{source}/{z}/{x}/{y}` shape are
/// malformed tile requests (400); anything else is a JSON 404.
pub async fn fallback_handler(uri: Uri) -> Response {
    let path = uri.path();

    if path.starts_with("/tiles/") || path == "/tiles" {
        return TileError::InvalidPath(path.to_string()).into_response();
    }

    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::with_status(
            "not_found",
            format!("No route for {}", path),
            StatusCode::NOT_FOUND,
        )),
    )
        .into_response()
}

// =============================================================================
// Tests
// =============================================================================
