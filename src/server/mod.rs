//! HTTP server layer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │            GET /tiles/{source}/{z}/{x}/{y}.png                  │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (tiles, sources, health) │  │ (router, CORS, tracing)     │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    fallback_handler, health_handler, source_metadata_handler, sources_handler, tile_handler,
    AppState, BoundsResponse, ErrorResponse, HealthResponse, SourceMetadataResponse,
    SourcesResponse, TilePathParams, DEFAULT_CACHE_MAX_AGE, TILE_URL_TEMPLATE,
};
pub use routes::{create_router, RouterConfig};
