//! Web-Mercator tile grid.
//!
//! The projected world is the square `[-H, H] × [-H, H]` with `H` the
//! Web-Mercator half extent. Zoom `z` splits it into `2^z × 2^z` tiles; column
//! `x` grows eastward and row `y` grows southward.

use std::fmt;
use std::sync::Arc;

/// Half width of the projected Web-Mercator world, in metres.
pub const WORLD_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Output tile edge length in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level served.
pub const MAX_ZOOM: u8 = 30;

/// Address of one tile of one source.
///
/// Immutable; used as the tile cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileAddress {
    /// Source name
    pub source: Arc<str>,

    /// Zoom level
    pub z: u8,

    /// Column, counted from the west edge
    pub x: u32,

    /// Row, counted from the north edge
    pub y: u32,
}

impl TileAddress {
    pub fn new(source: impl Into<Arc<str>>, z: u8, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            z,
            x,
            y,
        }
    }

    /// Projected bounding box of this tile.
    pub fn bbox(&self) -> TileBBox {
        tile_bbox(self.z, self.x, self.y)
    }

    /// Whether x and y fall inside the grid at this zoom.
    pub fn in_grid(&self) -> bool {
        let tiles = 1u64 << self.z;
        u64::from(self.x) < tiles && u64::from(self.y) < tiles
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.source, self.z, self.x, self.y)
    }
}

/// Projected bounds of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Bounding box of tile `(z, x, y)`.
///
/// Tile edges are exact at the world boundary for every zoom: `2^z` is a power
/// of two, so dividing and multiplying back loses nothing.
pub fn tile_bbox(z: u8, x: u32, y: u32) -> TileBBox {
    let tile_size = 2.0 * WORLD_HALF_EXTENT / 2f64.powi(i32::from(z));
    let (x, y) = (f64::from(x), f64::from(y));

    TileBBox {
        west: -WORLD_HALF_EXTENT + x * tile_size,
        east: -WORLD_HALF_EXTENT + (x + 1.0) * tile_size,
        north: WORLD_HALF_EXTENT - y * tile_size,
        south: WORLD_HALF_EXTENT - (y + 1.0) * tile_size,
    }
}
