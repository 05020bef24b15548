//! COG Tile Server - Web-Mercator tiles from GeoTIFF / COG rasters.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cog_tile_server::{
    config::{CheckConfig, Cli, Command, ServeConfig},
    raster::{GeoTiffDataset, GeoTiffOpener, RasterSource, SourceRegistry},
    server::{create_router, RouterConfig, TILE_URL_TEMPLATE},
    tile::TileService,
    RasterError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let options = match config.tile_service_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_banner();

    info!("Configuration:");
    info!("  Raster dir: {}", config.sources.raster_dir.display());
    info!(
        "  Cache: {} tiles, max-age {}s",
        config.cache_tiles, config.cache_max_age
    );
    info!(
        "  Read timeout: {}ms, slow tile threshold: {}ms",
        config.read_timeout_ms, config.slow_tile_ms
    );
    info!("  PNG compression: {:?}", config.png_compression);

    let catalog = config.sources.catalog();
    if catalog.is_empty() {
        warn!("  No sources found; every tile request will return 404");
    } else {
        info!("  Sources: {}", catalog.len());
    }

    let registry = SourceRegistry::new(GeoTiffOpener::new(), catalog);

    if !config.no_warmup {
        info!("");
        info!("Opening sources...");
        for (name, result) in registry.warm_up().await {
            log_source(&name, &result);
        }
        info!(
            "  {} of {} source(s) ready",
            registry.opened_count().await,
            registry.names().len()
        );
    }

    let tile_service = match TileService::with_options(registry, options) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to create tile service: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/sources", addr);
    info!("");
    info!("  Tile URL template:");
    info!("    http://{}{}", addr, TILE_URL_TEMPLATE);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!(" ██████╗ ██████╗  ██████╗     ████████╗██╗██╗     ███████╗███████╗");
    info!("██╔════╝██╔═══██╗██╔════╝     ╚══██╔══╝██║██║     ██╔════╝██╔════╝");
    info!("██║     ██║   ██║██║  ███╗       ██║   ██║██║     █████╗  ███████╗");
    info!("██║     ██║   ██║██║   ██║       ██║   ██║██║     ██╔══╝  ╚════██║");
    info!("╚██████╗╚██████╔╝╚██████╔╝       ██║   ██║███████╗███████╗███████║");
    info!(" ╚═════╝ ╚═════╝  ╚═════╝        ╚═╝   ╚═╝╚══════╝╚══════╝╚══════╝");
    info!("");
    info!("                              v{}", version);
}

/// Log one warm-up result.
fn log_source(name: &str, result: &Result<Arc<RasterSource<GeoTiffDataset>>, RasterError>) {
    match result {
        Ok(source) => info!("  [OK] {}", describe_source(source)),
        Err(RasterError::NotFound(path)) => {
            warn!("  [MISSING] {} ({})", name, path.display())
        }
        Err(e) => warn!("  [ERROR] {}: {}", name, e),
    }
}

/// One-line summary: name, size, bands, pixel size, overviews, file size.
fn describe_source(source: &RasterSource<GeoTiffDataset>) -> String {
    let geometry = source.geometry();
    format!(
        "{}: {}x{} px, {} band(s), {:.2} m/px, {} overview(s), {}",
        source.name(),
        geometry.width,
        geometry.height,
        geometry.bands,
        geometry.transform.pixel_width,
        source.dataset().overview_count(),
        file_size(source.path())
    )
}

fn file_size(path: &Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) => format!("{:.1} MB", meta.len() as f64 / (1024.0 * 1024.0)),
        Err(_) => "unknown size".to_string(),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "cog_tile_server=debug,tower_http=debug"
    } else {
        "cog_tile_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("COG Tile Server Configuration Check");
    println!("═══════════════════════════════════");
    println!();

    if let Err(e) = config.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let raster_dir = &config.sources.raster_dir;
    if raster_dir.is_dir() {
        println!("✓ Raster dir: {}", raster_dir.display());
    } else {
        println!("✗ Raster dir: {} (not a directory)", raster_dir.display());
    }

    let catalog = config.sources.catalog();
    if catalog.is_empty() {
        println!("✗ No sources found");
        return ExitCode::FAILURE;
    }

    println!();
    println!("Sources:");
    println!("────────");

    let registry = SourceRegistry::new(GeoTiffOpener::new(), catalog);
    let mut failures = 0;

    for (name, result) in registry.warm_up().await {
        match result {
            Ok(source) => println!("  ✓ {}", describe_source(&source)),
            Err(e) => {
                failures += 1;
                println!("  ✗ {}: {}", name, e);
            }
        }
    }

    println!();
    if failures > 0 {
        println!(
            "{} of {} source(s) failed to open",
            failures,
            registry.names().len()
        );
        return ExitCode::FAILURE;
    }

    println!("All {} source(s) OK", registry.names().len());
    ExitCode::SUCCESS
}
