//! RGBA tile assembly.
//!
//! The resampled block is copied into a transparent `tile_size²` canvas at its
//! placement, and alpha is derived per pixel.
//!
//! # No-data heuristic
//!
//! A pixel is opaque unless its R, G and B are all exactly zero, in which case
//! it is treated as no-data and left transparent. Sources do not carry a
//! no-data value through this pipeline, so genuinely black pixels are
//! indistinguishable from no-data and render transparent. This is a known
//! limitation and is kept as-is for compatibility with existing tile sets.

use image::{Rgba, RgbaImage};

use crate::raster::PixelBlock;

use super::window::Placement;

/// Build the RGBA tile for `block` drawn at `placement`.
///
/// Band mapping: one band is replicated to R, G and B; with two bands the
/// first two fill R and G and blue stays zero; otherwise bands 0..3 map to
/// R, G, B. Pixels outside the placement stay transparent black.
pub fn composite(block: &PixelBlock, placement: &Placement, tile_size: u32) -> RgbaImage {
    let mut canvas = RgbaImage::new(tile_size, tile_size);

    let (red, green, blue) = match (block.band(0), block.band(1), block.band(2)) {
        (Some(gray), None, _) => (gray, gray, Some(gray)),
        (Some(red), Some(green), blue) => (red, green, blue),
        _ => return canvas,
    };

    let width = placement
        .width()
        .min(block.width())
        .min(tile_size.saturating_sub(placement.x0));
    let height = placement
        .height()
        .min(block.height())
        .min(tile_size.saturating_sub(placement.y0));
    let stride = block.width() as usize;

    for row in 0..height {
        for col in 0..width {
            let i = row as usize * stride + col as usize;
            let (r, g, b) = (red[i], green[i], blue.map_or(0, |band| band[i]));
            let alpha = if r == 0 && g == 0 && b == 0 { 0 } else { 255 };

            canvas.put_pixel(
                placement.x0 + col,
                placement.y0 + row,
                Rgba([r, g, b, alpha]),
            );
        }
    }

    canvas
}
