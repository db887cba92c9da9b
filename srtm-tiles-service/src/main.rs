//! srtm-tiles Service - HTTP microservice for SRTM elevation queries.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SRTM_CACHE_DIR` | Directory holding downloaded archives | Current directory |
//! | `SRTM_AREA_DIR` | Directory with the six area lists | `SRTM_CACHE_DIR` |
//! | `SRTM_BASE_URL` | Base URL of the remote archive | ArduPilot SRTM3 |
//! | `SRTM_CACHE_SIZE` | Maximum tiles in memory, 0 for unbounded | 100 |
//! | `SRTM_PORT` | HTTP server port | 8080 |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /elevation?lat=X&lon=Y` - Get elevation at coordinates
//! - `POST /elevation` - Batch elevation query with `{"points": [[lat, lon], ...]}`
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use srtm_tiles::ElevationProviderBuilder;
use srtm_tiles_service::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "srtm_tiles_service=info,srtm_tiles=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load port from environment (service-specific config)
    let port: u16 = std::env::var("SRTM_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The HTTP client of the provider is blocking, keep it off the executor
    let provider = tokio::task::spawn_blocking(|| {
        let builder = match ElevationProviderBuilder::from_env() {
            Ok(builder) => builder,
            Err(_) => {
                // Fallback: SRTM_CACHE_DIR not set, use current directory
                tracing::warn!("SRTM_CACHE_DIR not set, using current directory");
                ElevationProviderBuilder::new(".")
            }
        };
        builder.build()
    })
    .await??;

    tracing::info!(
        cache_dir = %provider.cache_dir().display(),
        cache_capacity = provider.cache_capacity(),
        areas = provider.areas().len(),
        base_url = provider.fetcher().base_url(),
        port = port,
        "Starting elevation service"
    );

    let app = router(Arc::new(AppState { provider }));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
