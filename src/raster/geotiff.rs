//! GeoTIFF / Cloud-Optimized GeoTIFF datasets backed by the `tiff` crate.
//!
//! # Geotransform
//!
//! The pixel-to-projected transform is taken from the GeoTIFF model tags:
//!
//! - `ModelTransformation` (34264), a 4×4 affine matrix, when present;
//! - otherwise `ModelTiepoint` (33922) + `ModelPixelScale` (33550).
//!
//! Rotated transforms are rejected; rasters without either form cannot be
//! served at all.
//!
//! # Overviews
//!
//! COGs carry reduced-resolution copies of the image in subsequent IFDs.
//! Every non-mask IFD that is strictly smaller than the previous level is
//! recorded as an overview, and downsampled reads use the coarsest level that
//! still has at least as many pixels as the requested output.
//!
//! # Concurrency
//!
//! A `tiff::decoder::Decoder` needs `&mut` access to its reader, so each
//! level keeps a small pool of decoders. A read checks a decoder out, decodes
//! on a blocking thread, and returns it; the pool lock is held only for the
//! push/pop, never across I/O.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::error::RasterError;

use super::dataset::{
    DatasetOpener, GeoTransform, PixelBlock, PixelWindow, RasterDataset, RasterGeometry,
};

/// GeoTIFF `ModelPixelScaleTag`.
pub const MODEL_PIXEL_SCALE_TAG: u16 = 33550;

/// GeoTIFF `ModelTiepointTag`.
pub const MODEL_TIEPOINT_TAG: u16 = 33922;

/// GeoTIFF `ModelTransformationTag`.
pub const MODEL_TRANSFORMATION_TAG: u16 = 34264;

/// `Compression` codes whose decoder converts YCbCr to RGB (new and old JPEG).
const JPEG_COMPRESSION: [u16; 2] = [7, 6];

/// `NewSubfileType` bit marking a transparency mask IFD.
const SUBFILE_TYPE_MASK: u32 = 0x4;

/// Idle decoders kept per level.
const MAX_POOLED_DECODERS: usize = 4;

type TiffDecoder = Decoder<BufReader<File>>;

// =============================================================================
// Opener
// =============================================================================

/// Opens GeoTIFF files from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOpener;

impl GeoTiffOpener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatasetOpener for GeoTiffOpener {
    type Dataset = GeoTiffDataset;

    async fn open(&self, path: &Path) -> Result<GeoTiffDataset, RasterError> {
        let path = path.to_path_buf();
        let task_path = path.clone();

        tokio::task::spawn_blocking(move || GeoTiffDataset::open_blocking(&task_path))
            .await
            .map_err(|e| open_error(&path, e))?
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// One resolution level (IFD) of the file.
#[derive(Debug, Clone, Copy)]
struct Level {
    ifd_index: usize,
    width: u32,
    height: u32,
    chunk_width: u32,
    chunk_height: u32,
}

impl Level {
    fn chunks_across(&self) -> u32 {
        self.width.div_ceil(self.chunk_width)
    }
}

/// A decoded strip or tile.
struct Chunk {
    /// Pixel width of the decoded data (edge chunks may be narrower)
    width: usize,
    samples: Vec<u8>,
}

struct GeoTiffInner {
    path: PathBuf,
    geometry: RasterGeometry,
    levels: Vec<Level>,
    pools: Vec<Mutex<Vec<TiffDecoder>>>,
}

/// An opened GeoTIFF raster.
///
/// Cheap to clone; clones share the decoder pools.
#[derive(Clone)]
pub struct GeoTiffDataset {
    inner: Arc<GeoTiffInner>,
}

impl std::fmt::Debug for GeoTiffDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffDataset")
            .field("path", &self.inner.path)
            .field("geometry", &self.inner.geometry)
            .field("levels", &self.inner.levels.len())
            .finish()
    }
}

impl GeoTiffDataset {
    /// Open a GeoTIFF synchronously, reading its geometry and overview layout.
    pub fn open_blocking(path: &Path) -> Result<Self, RasterError> {
        let mut decoder = open_decoder(path)?;

        let (width, height) = decoder.dimensions().map_err(|e| open_error(path, e))?;
        let color = decoder.colortype().map_err(|e| open_error(path, e))?;
        let compression = decoder
            .find_tag_unsigned::<u16>(Tag::Compression)
            .map_err(|e| open_error(path, e))?
            .unwrap_or(1);
        let bands = samples_per_pixel(color, compression)?;

        let planar = decoder
            .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
            .map_err(|e| open_error(path, e))?
            .unwrap_or(1);
        if planar != 1 {
            return Err(RasterError::Unsupported(
                "planar (band-separate) layout".to_string(),
            ));
        }

        let transform = read_geotransform(&mut decoder, path)?;
        if !transform.is_valid() {
            return Err(RasterError::Unsupported(format!(
                "degenerate geotransform {:?}",
                transform
            )));
        }
        if transform.pixel_width < 0.0 || transform.pixel_height > 0.0 {
            return Err(RasterError::Unsupported(
                "geotransform is not north-up".to_string(),
            ));
        }

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let mut levels = vec![Level {
            ifd_index: 0,
            width,
            height,
            chunk_width,
            chunk_height,
        }];

        let mut ifd_index = 0;
        while decoder.more_images() {
            decoder.next_image().map_err(|e| open_error(path, e))?;
            ifd_index += 1;

            let subfile_type = decoder
                .find_tag_unsigned::<u32>(Tag::NewSubfileType)
                .map_err(|e| open_error(path, e))?
                .unwrap_or(0);
            if subfile_type & SUBFILE_TYPE_MASK != 0 {
                continue;
            }

            let (w, h) = decoder.dimensions().map_err(|e| open_error(path, e))?;
            let previous = levels[levels.len() - 1];
            if w >= previous.width || h >= previous.height || w == 0 || h == 0 {
                continue;
            }
            if decoder.colortype().map_err(|e| open_error(path, e))? != color {
                continue;
            }

            let (chunk_width, chunk_height) = decoder.chunk_dimensions();
            levels.push(Level {
                ifd_index,
                width: w,
                height: h,
                chunk_width,
                chunk_height,
            });
        }

        debug!(
            path = %path.display(),
            width,
            height,
            bands,
            overviews = levels.len() - 1,
            "Opened GeoTIFF"
        );

        let pools = levels.iter().map(|_| Mutex::new(Vec::new())).collect();

        Ok(Self {
            inner: Arc::new(GeoTiffInner {
                path: path.to_path_buf(),
                geometry: RasterGeometry {
                    width,
                    height,
                    bands,
                    transform,
                },
                levels,
                pools,
            }),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Number of reduced-resolution levels besides the full image.
    pub fn overview_count(&self) -> usize {
        self.inner.levels.len() - 1
    }
}

#[async_trait]
impl RasterDataset for GeoTiffDataset {
    fn geometry(&self) -> RasterGeometry {
        self.inner.geometry
    }

    async fn read_window(
        &self,
        window: PixelWindow,
        out_width: u32,
        out_height: u32,
        bands: usize,
    ) -> Result<PixelBlock, RasterError> {
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || {
            inner.read_window_blocking(window, out_width, out_height, bands)
        })
        .await
        .map_err(|e| RasterError::Read(format!("read task failed: {}", e)))?
    }
}

impl GeoTiffInner {
    fn read_window_blocking(
        &self,
        window: PixelWindow,
        out_width: u32,
        out_height: u32,
        bands: usize,
    ) -> Result<PixelBlock, RasterError> {
        if window.is_empty() || out_width == 0 || out_height == 0 {
            return Err(RasterError::Read(format!(
                "empty read: window {:?} into {}x{}",
                window, out_width, out_height
            )));
        }

        let right = u64::from(window.col) + u64::from(window.width);
        let bottom = u64::from(window.row) + u64::from(window.height);
        if right > u64::from(self.geometry.width) || bottom > u64::from(self.geometry.height) {
            return Err(RasterError::Read(format!(
                "window {:?} exceeds raster size {}x{}",
                window, self.geometry.width, self.geometry.height
            )));
        }

        let bands = bands.clamp(1, self.geometry.bands);
        let level_index = self.select_level(window, out_width, out_height);

        let mut decoder = self.checkout(level_index)?;
        let block = self.sample(&mut decoder, level_index, window, out_width, out_height, bands)?;
        self.checkin(level_index, decoder);

        Ok(block)
    }

    /// Coarsest level whose copy of `window` is at least the output size.
    fn select_level(&self, window: PixelWindow, out_width: u32, out_height: u32) -> usize {
        let full_width = f64::from(self.geometry.width);
        let full_height = f64::from(self.geometry.height);

        self.levels
            .iter()
            .enumerate()
            .rev()
            .find(|(_, level)| {
                let level_w = f64::from(window.width) * f64::from(level.width) / full_width;
                let level_h = f64::from(window.height) * f64::from(level.height) / full_height;
                level_w >= f64::from(out_width) && level_h >= f64::from(out_height)
            })
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    /// Nearest-neighbour sample `window` at pixel centres.
    fn sample(
        &self,
        decoder: &mut TiffDecoder,
        level_index: usize,
        window: PixelWindow,
        out_width: u32,
        out_height: u32,
        bands: usize,
    ) -> Result<PixelBlock, RasterError> {
        let level = self.levels[level_index];
        let samples_per_pixel = self.geometry.bands;

        let scale_x = f64::from(level.width) / f64::from(self.geometry.width);
        let scale_y = f64::from(level.height) / f64::from(self.geometry.height);
        let step_x = f64::from(window.width) / f64::from(out_width);
        let step_y = f64::from(window.height) / f64::from(out_height);

        let columns: Vec<u32> = (0..out_width)
            .map(|ox| {
                let x = f64::from(window.col) + (f64::from(ox) + 0.5) * step_x;
                clamp_index(x * scale_x, level.width)
            })
            .collect();
        let rows: Vec<u32> = (0..out_height)
            .map(|oy| {
                let y = f64::from(window.row) + (f64::from(oy) + 0.5) * step_y;
                clamp_index(y * scale_y, level.height)
            })
            .collect();

        let plane = out_width as usize * out_height as usize;
        let mut data = vec![0u8; bands * plane];
        let mut chunks: HashMap<u32, Chunk> = HashMap::new();

        for (oy, &ly) in rows.iter().enumerate() {
            for (ox, &lx) in columns.iter().enumerate() {
                let index =
                    (ly / level.chunk_height) * level.chunks_across() + lx / level.chunk_width;

                let chunk = match chunks.entry(index) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(decode_chunk(decoder, index)?),
                };

                let local_x = (lx % level.chunk_width) as usize;
                let local_y = (ly % level.chunk_height) as usize;
                let base = (local_y * chunk.width + local_x) * samples_per_pixel;
                let out = oy * out_width as usize + ox;

                for band in 0..bands {
                    data[band * plane + out] = chunk.samples.get(base + band).copied().unwrap_or(0);
                }
            }
        }

        PixelBlock::new(bands, out_width, out_height, data)
    }

    fn checkout(&self, level_index: usize) -> Result<TiffDecoder, RasterError> {
        let pooled = self.pools[level_index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        if let Some(decoder) = pooled {
            return Ok(decoder);
        }

        let mut decoder = open_decoder(&self.path)?;
        let ifd_index = self.levels[level_index].ifd_index;
        if ifd_index > 0 {
            decoder
                .seek_to_image(ifd_index)
                .map_err(|e| RasterError::Read(e.to_string()))?;
        }
        Ok(decoder)
    }

    fn checkin(&self, level_index: usize, decoder: TiffDecoder) {
        let mut pool = self.pools[level_index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if pool.len() < MAX_POOLED_DECODERS {
            pool.push(decoder);
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn open_error(path: &Path, err: impl Display) -> RasterError {
    RasterError::Open {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn decoder_limits() -> Limits {
    // COG offset tables for large rasters exceed the default IFD value limit
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 256 * 1024 * 1024;
    limits.intermediate_buffer_size = 256 * 1024 * 1024;
    limits.ifd_value_size = 64 * 1024 * 1024;
    limits
}

fn open_decoder(path: &Path) -> Result<TiffDecoder, RasterError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RasterError::NotFound(path.to_path_buf())
        } else {
            open_error(path, e)
        }
    })?;

    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| open_error(path, e))?;
    Ok(decoder.with_limits(decoder_limits()))
}

/// The tag number as the decoder's [`Tag`] (GeoTIFF tags have named variants).
pub fn model_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Samples per pixel for a readable color layout.
///
/// YCbCr is only readable when JPEG-compressed: the JPEG decoder hands back
/// RGB, raw YCbCr chunks would be sampled as if they were RGB.
fn samples_per_pixel(color: ColorType, compression: u16) -> Result<usize, RasterError> {
    let (samples, bit_depth) = match color {
        ColorType::Gray(bits) => (1, bits),
        ColorType::GrayA(bits) => (2, bits),
        ColorType::RGB(bits) => (3, bits),
        ColorType::YCbCr(bits) if JPEG_COMPRESSION.contains(&compression) => (3, bits),
        ColorType::YCbCr(_) => {
            return Err(RasterError::Unsupported(format!(
                "YCbCr samples with compression {}",
                compression
            )))
        }
        ColorType::RGBA(bits) => (4, bits),
        ColorType::CMYK(bits) => (4, bits),
        other => {
            return Err(RasterError::Unsupported(format!(
                "color type {:?}",
                other
            )))
        }
    };

    if !matches!(bit_depth, 8 | 16 | 32) {
        return Err(RasterError::Unsupported(format!(
            "{}-bit samples",
            bit_depth
        )));
    }

    Ok(samples)
}

fn read_geotransform(
    decoder: &mut TiffDecoder,
    path: &Path,
) -> Result<GeoTransform, RasterError> {
    if let Ok(matrix) = decoder.get_tag_f64_vec(model_tag(MODEL_TRANSFORMATION_TAG)) {
        if matrix.len() >= 16 {
            if matrix[1] != 0.0 || matrix[4] != 0.0 {
                return Err(RasterError::Unsupported(
                    "rotated geotransform".to_string(),
                ));
            }
            return Ok(GeoTransform::new(matrix[3], matrix[7], matrix[0], matrix[5]));
        }
    }

    let tiepoint = decoder.get_tag_f64_vec(model_tag(MODEL_TIEPOINT_TAG));
    let scale = decoder.get_tag_f64_vec(model_tag(MODEL_PIXEL_SCALE_TAG));

    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint is [I, J, K, X, Y, Z]: raster (I, J) sits at model (X, Y)
            let (i, j) = (tiepoint[0], tiepoint[1]);
            let (x, y) = (tiepoint[3], tiepoint[4]);
            let (scale_x, scale_y) = (scale[0], scale[1]);

            return Ok(GeoTransform::new(
                x - i * scale_x,
                y + j * scale_y,
                scale_x,
                -scale_y,
            ));
        }
    }

    Err(RasterError::MissingGeotransform(path.to_path_buf()))
}

fn decode_chunk(decoder: &mut TiffDecoder, index: u32) -> Result<Chunk, RasterError> {
    let (width, _) = decoder.chunk_data_dimensions(index);
    let result = decoder
        .read_chunk(index)
        .map_err(|e| RasterError::Read(format!("chunk {}: {}", index, e)))?;

    Ok(Chunk {
        width: width as usize,
        samples: to_bytes(result)?,
    })
}

/// Convert decoded samples to bytes, clamping wider types into 0..=255.
fn to_bytes(result: DecodingResult) -> Result<Vec<u8>, RasterError> {
    match result {
        DecodingResult::U8(samples) => Ok(samples),
        DecodingResult::U16(samples) => Ok(samples.into_iter().map(|s| s.min(255) as u8).collect()),
        DecodingResult::U32(samples) => Ok(samples.into_iter().map(|s| s.min(255) as u8).collect()),
        DecodingResult::F32(samples) => Ok(samples
            .into_iter()
            .map(|s| s.clamp(0.0, 255.0).round() as u8)
            .collect()),
        _ => Err(RasterError::Unsupported("sample format".to_string())),
    }
}

#[inline]
fn clamp_index(position: f64, size: u32) -> u32 {
    let index = position.floor();
    if index <= 0.0 {
        0
    } else {
        (index as u32).min(size - 1)
    }
}

// =============================================================================
// Tests
// =============================================================================
