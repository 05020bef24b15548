//! PNG tile encoder.
//!
//! Tiles are RGBA, so the output format has to be lossless with an alpha
//! channel; PNG at the default zlib level is the usual speed/size trade-off
//! for map tiles.
//!
//! The encoder also owns the canonical empty tile: a 1×1 fully transparent
//! PNG, encoded once at construction and returned for every tile that has
//! nothing to draw.

use bytes::Bytes;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::TileError;

/// PNG compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PngCompression {
    /// Fastest encoding, larger files
    Fast,

    /// Moderate compression
    #[default]
    Default,

    /// Smallest files, slowest encoding
    Best,
}

impl From<PngCompression> for CompressionType {
    fn from(value: PngCompression) -> Self {
        match value {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        }
    }
}

/// Encodes RGBA tiles to PNG.
#[derive(Debug, Clone)]
pub struct PngTileEncoder {
    compression: PngCompression,
    empty_tile: Bytes,
}

impl PngTileEncoder {
    /// Create an encoder, pre-encoding the empty tile.
    pub fn new(compression: PngCompression) -> Result<Self, TileError> {
        let empty_tile = encode_png(&RgbaImage::new(1, 1), compression)?;
        Ok(Self {
            compression,
            empty_tile,
        })
    }

    /// Encode an RGBA tile.
    pub fn encode(&self, tile: &RgbaImage) -> Result<Bytes, TileError> {
        encode_png(tile, self.compression)
    }

    /// The shared 1×1 transparent tile. Cloning is a reference-count bump.
    pub fn empty_tile(&self) -> Bytes {
        self.empty_tile.clone()
    }

    pub fn compression(&self) -> PngCompression {
        self.compression
    }
}

fn encode_png(image: &RgbaImage, compression: PngCompression) -> Result<Bytes, TileError> {
    let mut output = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut output, compression.into(), FilterType::Adaptive);

    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| TileError::EncodeError {
            message: e.to_string(),
        })?;

    Ok(Bytes::from(output))
}

// =============================================================================
// Tests
// =============================================================================
