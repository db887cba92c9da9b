//! srtm-tiles Service Library
//!
//! HTTP handlers, router and OpenAPI document for the SRTM elevation
//! service. Used by both the srtm-tiles-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use srtm_tiles::ElevationProvider;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Elevation provider answering every query.
    pub provider: ElevationProvider,
}

/// OpenAPI documentation for the elevation service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "SRTM Elevation Service",
        version = "0.1.0",
        description = "REST API for point elevation queries over the SRTM3 dataset.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::get_elevation,
        handlers::post_elevation,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::ElevationResponse,
            handlers::BatchRequest,
            handlers::BatchResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Elevation query endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the service router with docs, tracing and CORS.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/elevation",
            get(handlers::get_elevation).post(handlers::post_elevation),
        )
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

// Re-export commonly used types for convenience
pub use handlers::{
    BatchRequest, BatchResponse, ElevationQuery, ElevationResponse, ErrorResponse,
    HealthResponse, StatsResponse,
};
