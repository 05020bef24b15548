//! Tile pipeline.
//!
//! Turns a `z/x/y` address into an encoded PNG tile:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌───────────┐ ┌──────────┐ ┌────────┐  │
//! │  │ TileCache │ │ Resampler│ │  PNG   │  │
//! │  │   (LRU)   │ │+Composite│ │Encoder │  │
//! │  └───────────┘ └──────────┘ └────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             SourceRegistry              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`tile_bbox`] / [`TileAddress`]: Web-Mercator grid math and the cache key
//! - [`plan_window`] / [`WindowResampler`]: source window, canvas placement, reads
//! - [`composite`]: RGBA canvas with the pure-black no-data heuristic
//! - [`TileCache`]: entry-bounded LRU of encoded tiles
//! - [`PngTileEncoder`]: PNG encoding and the shared EMPTY tile
//! - [`TileService`]: the request pipeline tying them together

mod cache;
mod compositor;
mod encoder;
mod grid;
mod service;
mod window;

pub use cache::{TileCache, DEFAULT_CACHE_TILES};
pub use compositor::composite;
pub use encoder::{PngCompression, PngTileEncoder};
pub use grid::{tile_bbox, TileAddress, TileBBox, MAX_ZOOM, TILE_SIZE, WORLD_HALF_EXTENT};
pub use service::{
    TileRequest, TileResponse, TileService, TileServiceOptions, DEFAULT_SLOW_TILE_THRESHOLD,
};
pub use window::{
    plan_window, EmptyReason, Placement, Resampled, WindowPlan, WindowResampler,
    DEFAULT_READ_TIMEOUT, MAX_BANDS,
};
