//! Tile windowing and resampling.
//!
//! Given a tile's projected bbox and a source's geometry, [`plan_window`]
//! works out which source pixels the tile covers and where they land on the
//! tile canvas. [`WindowResampler`] then reads that window at the output
//! resolution.
//!
//! Every way a tile can come up empty (no overlap, a window or placement that
//! collapses to nothing, a failed or timed-out read) is reported as
//! [`Resampled::Empty`]; none of them is an error for the caller.

use std::time::Duration;

use tracing::warn;

use crate::error::RasterError;
use crate::raster::{PixelBlock, PixelWindow, RasterDataset, RasterGeometry, RasterSource};

use super::grid::{TileBBox, TILE_SIZE};

/// Bands read from a source: RGB, or the single band of a greyscale raster.
pub const MAX_BANDS: usize = 3;

/// Default bound on a single raster read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination rectangle on the tile canvas, as `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Placement {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Placement covering the whole canvas.
    pub fn full(tile_size: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: tile_size,
            y1: tile_size,
        }
    }
}

/// Source window to read and where it goes on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub window: PixelWindow,
    pub placement: Placement,
}

/// Why a tile came out empty.
#[derive(Debug, Clone)]
pub enum EmptyReason {
    /// The tile bbox does not intersect the source bounds
    NoOverlap,

    /// The clipped pixel window has no area
    EmptyWindow,

    /// The destination rectangle rounds to nothing
    EmptyPlacement,

    /// The raster read failed or timed out
    ReadFailed(RasterError),
}

/// Compute the pixel window and canvas placement for `bbox`.
///
/// The unclipped fractional window spans the whole `tile_size` canvas; the
/// part that survives clipping to the raster keeps its relative position, so
/// a tile hanging off the edge of a source only gets data where the source
/// has it.
pub fn plan_window(
    geometry: &RasterGeometry,
    bbox: &TileBBox,
    tile_size: u32,
) -> Result<WindowPlan, EmptyReason> {
    let bounds = geometry.bounds();
    if bbox.west >= bounds.east
        || bbox.east <= bounds.west
        || bbox.south >= bounds.north
        || bbox.north <= bounds.south
    {
        return Err(EmptyReason::NoOverlap);
    }

    let transform = &geometry.transform;
    let (px0, py0) = transform.to_pixel(bbox.west, bbox.north);
    let (px1, py1) = transform.to_pixel(bbox.east, bbox.south);

    let width = f64::from(geometry.width);
    let height = f64::from(geometry.height);

    let col0 = px0.floor().clamp(0.0, width);
    let row0 = py0.floor().clamp(0.0, height);
    let col1 = px1.ceil().clamp(0.0, width);
    let row1 = py1.ceil().clamp(0.0, height);

    if col1 <= col0 || row1 <= row0 {
        return Err(EmptyReason::EmptyWindow);
    }

    let size = f64::from(tile_size);
    let span_x = px1 - px0;
    let span_y = py1 - py0;
    let to_canvas = |offset: f64, span: f64| -> u32 {
        // Half-pixel ties round to even
        (offset / span * size).round_ties_even().clamp(0.0, size) as u32
    };

    let placement = Placement {
        x0: to_canvas(col0 - px0, span_x),
        y0: to_canvas(row0 - py0, span_y),
        x1: to_canvas(col1 - px0, span_x),
        y1: to_canvas(row1 - py0, span_y),
    };

    if placement.is_empty() {
        return Err(EmptyReason::EmptyPlacement);
    }

    Ok(WindowPlan {
        window: PixelWindow::new(
            col0 as u32,
            row0 as u32,
            (col1 - col0) as u32,
            (row1 - row0) as u32,
        ),
        placement,
    })
}

/// Result of resampling one tile.
#[derive(Debug)]
pub enum Resampled {
    /// Nothing to draw
    Empty(EmptyReason),

    /// Pixels to draw at `plan.placement`; `block` is placement-sized
    Block { plan: WindowPlan, block: PixelBlock },
}

/// Reads the source pixels behind a tile.
#[derive(Debug, Clone)]
pub struct WindowResampler {
    tile_size: u32,
    read_timeout: Duration,
}

impl WindowResampler {
    /// Create a resampler with the given bound on each raster read.
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            tile_size: TILE_SIZE,
            read_timeout,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Resample the part of `source` under `bbox`.
    pub async fn resample<D: RasterDataset>(
        &self,
        source: &RasterSource<D>,
        bbox: &TileBBox,
    ) -> Resampled {
        let geometry = source.geometry();
        let plan = match plan_window(&geometry, bbox, self.tile_size) {
            Ok(plan) => plan,
            Err(reason) => return Resampled::Empty(reason),
        };

        let bands = geometry.bands.min(MAX_BANDS);
        let (out_width, out_height) = (plan.placement.width(), plan.placement.height());

        let read = source
            .dataset()
            .read_window(plan.window, out_width, out_height, bands);

        let result = match tokio::time::timeout(self.read_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(RasterError::Timeout {
                millis: self.read_timeout.as_millis() as u64,
            }),
        };

        let result = result.and_then(|block| {
            if block.width() == out_width && block.height() == out_height {
                Ok(block)
            } else {
                Err(RasterError::Read(format!(
                    "expected {}x{} block, got {}x{}",
                    out_width,
                    out_height,
                    block.width(),
                    block.height()
                )))
            }
        });

        match result {
            Ok(block) => Resampled::Block { plan, block },
            Err(err) => {
                warn!(
                    source = %source.name(),
                    window = ?plan.window,
                    error = %err,
                    "Raster read failed, serving empty tile"
                );
                Resampled::Empty(EmptyReason::ReadFailed(err))
            }
        }
    }
}
