//! Watermark Cache - serves watermarked copies of origin images.
//!
//! This binary loads the overlay, wires the origin, cache and router
//! together and starts the HTTP server.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watermark_cache::{
    config::{AnchorKind, Config},
    origin::{HttpOrigin, OriginSource},
    server::{create_router, RouterConfig},
    watermark::{OverlayAsset, WatermarkService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let overlay = match load_overlay(&config.overlay_path).await {
        Ok(overlay) => overlay,
        Err(e) => {
            error!("Failed to load overlay {}: {}", config.overlay_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let origin = match HttpOrigin::new(&config.origin_url, config.origin_timeout()) {
        Ok(origin) => origin.with_max_body_bytes(config.max_source_bytes()),
        Err(e) => {
            error!("Invalid origin: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache_root = match prepare_cache_dir(&config.cache_dir).await {
        Ok(root) => root,
        Err(e) => {
            error!(
                "Cache directory {} is not usable: {}",
                config.cache_dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    log_configuration(&config, &overlay, &origin, &cache_root);

    let service = WatermarkService::new(origin, overlay, config.service_settings(cache_root));
    let router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);
    let router = create_router(Arc::new(service), router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!(
        "  Try: curl -o out.jpg http://{}{}/<path>.jpg",
        addr,
        config.content_prefix.trim_end_matches('/')
    );

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Read and decode the overlay once at startup.
async fn load_overlay(path: &Path) -> Result<OverlayAsset, String> {
    let data = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    OverlayAsset::from_bytes(&data).map_err(|e| e.to_string())
}

/// Create the cache directory and return its canonical form.
async fn prepare_cache_dir(dir: &Path) -> std::io::Result<std::path::PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::canonicalize(dir).await
}

fn log_configuration(
    config: &Config,
    overlay: &OverlayAsset,
    origin: &HttpOrigin,
    cache_root: &Path,
) {
    let (overlay_width, overlay_height) = overlay.dimensions();

    info!("Watermark Cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Origin: {} (timeout {}s)", origin.describe(), config.origin_timeout_secs);
    info!("  Prefix: {}", config.content_prefix);
    info!("  Cache: {}", cache_root.display());
    info!(
        "  Overlay: {} ({}x{})",
        config.overlay_path.display(),
        overlay_width,
        overlay_height
    );
    info!(
        "  Policy: fraction {}, opacity {}, blend {:?}, quality {}, output {:?}",
        config.overlay_fraction,
        config.opacity,
        config.blend,
        config.jpeg_quality,
        config.output_format
    );
    match config.anchor {
        AnchorKind::Center => info!("  Anchor: center"),
        AnchorKind::BottomRight => {
            info!("  Anchor: bottom-right ({}% margin)", config.margin_percent)
        }
    }
    match config.max_source_dimensions() {
        Some((w, h)) => info!("  Max source: {}x{}", w, h),
        None => info!("  Max source: unlimited"),
    }
    match config.max_source_bytes() {
        Some(bytes) => info!("  Max source body: {} bytes", bytes),
        None => info!("  Max source body: unlimited"),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "watermark_cache=debug,tower_http=debug"
    } else {
        "watermark_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
