//! Configuration management for the tile server.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with the `TILE_` prefix (plus `RASTER_DIR`)
//! - Sensible defaults for all settings
//!
//! # Commands
//!
//! - `serve` (the default when no subcommand is given): run the HTTP server
//! - `check`: open every catalogued source and report its geometry
//!
//! # Environment Variables
//!
//! - `TILE_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILE_PORT` - Server port (default: 3001)
//! - `RASTER_DIR` - Directory scanned for `*.tif` / `*_cog.tif` rasters (default: ./rasters)
//! - `TILE_SOURCES` - Explicit `name=path` mappings, comma-separated
//! - `TILE_CACHE_TILES` - Max tiles to cache (default: 2000)
//! - `TILE_READ_TIMEOUT_MS` - Bound on one raster read (default: 10000)
//! - `TILE_SLOW_TILE_MS` - Slow-tile log threshold (default: 100)
//! - `TILE_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 86400)
//! - `TILE_PNG_COMPRESSION` - fast, default or best (default: default)
//! - `TILE_CORS_ORIGINS` - Allowed CORS origins, comma-separated (default: any)

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::raster::{SourceCatalog, SourceMapping};
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::tile::{PngCompression, TileServiceOptions, DEFAULT_CACHE_TILES};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default raster directory.
pub const DEFAULT_RASTER_DIR: &str = "rasters";

/// Default raster read timeout in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Default slow-tile threshold in milliseconds.
pub const DEFAULT_SLOW_TILE_MS: u64 = 100;

// =============================================================================
// CLI Arguments
// =============================================================================

/// COG Tile Server - Web-Mercator tiles from GeoTIFF / COG rasters.
///
/// Crops, resamples and alpha-composites 256×256 PNG tiles on demand from
/// geo-referenced rasters already in the Web-Mercator projection.
#[derive(Parser, Debug, Clone)]
#[command(name = "cog-tile-server")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Server options when no subcommand is given
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// Resolve the command to run, defaulting to `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the tile server
    Serve(ServeConfig),

    /// Open every source and print its geometry
    Check(CheckConfig),
}

/// Where rasters come from.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct SourceArgs {
    /// Directory scanned for raster files.
    ///
    /// `name.tif` and `name_cog.tif` are both served as `name`.
    #[arg(long, default_value = DEFAULT_RASTER_DIR, env = "RASTER_DIR")]
    pub raster_dir: PathBuf,

    /// Explicit source as `name=path` (repeatable; overrides discovered files).
    #[arg(long = "source", env = "TILE_SOURCES", value_delimiter = ',')]
    pub sources: Vec<SourceMapping>,
}

impl SourceArgs {
    /// Build the source catalog: directory discovery plus explicit mappings.
    pub fn catalog(&self) -> SourceCatalog {
        SourceCatalog::discover(&self.raster_dir).with_mappings(&self.sources)
    }
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILE_PORT")]
    pub port: u16,

    // =========================================================================
    // Sources
    // =========================================================================
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Skip opening every source at startup.
    #[arg(long, default_value_t = false)]
    pub no_warmup: bool,

    // =========================================================================
    // Tile Pipeline
    // =========================================================================
    /// Maximum number of encoded tiles to cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_TILES.get(), env = "TILE_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Timeout for a single raster read, in milliseconds.
    ///
    /// A read that takes longer produces an empty tile.
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS, env = "TILE_READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    /// Tiles taking longer than this to render are logged, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_SLOW_TILE_MS, env = "TILE_SLOW_TILE_MS")]
    pub slow_tile_ms: u64,

    /// PNG compression effort.
    #[arg(long, value_enum, default_value_t = PngCompression::Default, env = "TILE_PNG_COMPRESSION")]
    pub png_compression: PngCompression,

    // =========================================================================
    // HTTP
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILE_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        if self.read_timeout_ms == 0 {
            return Err("read_timeout_ms must be greater than 0".to_string());
        }
        validate_mappings(&self.sources.sources)
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn slow_tile_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_tile_ms)
    }

    /// Tile service options derived from this configuration.
    pub fn tile_service_options(&self) -> Result<TileServiceOptions, String> {
        let cache_tiles = NonZeroUsize::new(self.cache_tiles)
            .ok_or_else(|| "cache_tiles must be greater than 0".to_string())?;

        Ok(TileServiceOptions {
            cache_tiles,
            read_timeout: self.read_timeout(),
            slow_tile_threshold: self.slow_tile_threshold(),
            compression: self.png_compression,
        })
    }
}

/// Options for the `check` command.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct CheckConfig {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_mappings(&self.sources.sources)
    }
}

/// Reject mappings that name the same source twice.
fn validate_mappings(mappings: &[SourceMapping]) -> Result<(), String> {
    for (i, mapping) in mappings.iter().enumerate() {
        if mappings[..i].iter().any(|m| m.name == mapping.name) {
            return Err(format!("source '{}' is mapped more than once", mapping.name));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
