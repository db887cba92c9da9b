//! HTTP request handlers for the elevation service.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use srtm_tiles::SrtmError;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Query parameters for elevation endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
}

/// Successful elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationResponse {
    /// Elevation in meters, `null` where the dataset has no data.
    pub elevation: Option<f64>,
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
}

/// Batch elevation request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Coordinates as `[lat, lon]` pairs.
    #[schema(value_type = Vec<Vec<f64>>, example = json!([[52.882391, 4.63623]]))]
    pub points: Vec<[f64; 2]>,
}

/// Batch elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    /// Elevations in meters in request order, `null` for void samples.
    pub elevations: Vec<Option<f64>>,
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Cache statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of tiles in cache.
    pub cached_tiles: u64,
    /// Maximum number of tiles in cache, 0 when unbounded.
    pub cache_capacity: u64,
    /// Cache hit count.
    pub cache_hits: u64,
    /// Cache miss count.
    pub cache_misses: u64,
    /// Cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

/// Void samples come back as NaN and are reported as `null`.
fn to_json_elevation(elevation: f64) -> Option<f64> {
    (!elevation.is_nan()).then_some(elevation)
}

/// Run a provider query off the async executor; loading a tile may block on
/// a download and a decode.
async fn with_provider<T, F>(state: Arc<AppState>, query: F) -> Result<T, SrtmError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, SrtmError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || query(&state))
        .await
        .map_err(|e| SrtmError::Configuration(format!("Query task failed: {}", e)))?
}

/// Get elevation for given coordinates.
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Elevation found", body = ElevationResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 404, description = "No tile covers the coordinates", body = ErrorResponse),
        (status = 502, description = "Tile archive could not be downloaded", body = ErrorResponse),
        (status = 500, description = "Unexpected error", body = ErrorResponse)
    )
)]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Response {
    let ElevationQuery { lat, lon } = query;
    tracing::debug!(lat, lon, "Elevation query");

    match with_provider(state, move |s| s.provider.elevation_at(lat, lon)).await {
        Ok(elevation) => {
            let elevation = to_json_elevation(elevation);
            tracing::info!(lat, lon, elevation = ?elevation, "Elevation found");
            (
                StatusCode::OK,
                Json(ElevationResponse {
                    elevation,
                    lat,
                    lon,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(lat, lon, error = %e, "Elevation query failed");
            error_response(e)
        }
    }
}

/// Get elevations for a batch of coordinates.
///
/// Points are grouped by tile, so each tile is loaded once. The whole batch
/// fails on the first point that cannot be answered.
#[utoipa::path(
    post,
    path = "/elevation",
    tag = "elevation",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Elevations found", body = BatchResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 404, description = "No tile covers a point", body = ErrorResponse),
        (status = 502, description = "Tile archive could not be downloaded", body = ErrorResponse),
        (status = 500, description = "Unexpected error", body = ErrorResponse)
    )
)]
pub async fn post_elevation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Response {
    let coords: Vec<(f64, f64)> = request
        .points
        .iter()
        .map(|&[lat, lon]| (lat, lon))
        .collect();
    let count = coords.len();
    tracing::debug!(points = count, "Batch elevation query");

    match with_provider(state, move |s| s.provider.elevations_at(&coords)).await {
        Ok(elevations) => {
            tracing::info!(points = count, "Batch elevations found");
            let elevations = elevations.into_iter().map(to_json_elevation).collect();
            (StatusCode::OK, Json(BatchResponse { elevations })).into_response()
        }
        Err(e) => {
            tracing::warn!(points = count, error = %e, "Batch elevation query failed");
            error_response(e)
        }
    }
}

/// HTTP status for a failed query.
fn error_status(e: &SrtmError) -> StatusCode {
    if e.is_out_of_bounds() {
        StatusCode::BAD_REQUEST
    } else if e.is_area_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_retrieval() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Create an error response for elevation queries.
fn error_response(e: SrtmError) -> Response {
    (
        error_status(&e),
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get cache statistics.
///
/// Returns information about the tile cache.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Cache statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.provider.cache_stats();

    Json(StatsResponse {
        cached_tiles: stats.entry_count,
        cache_capacity: state.provider.cache_capacity(),
        cache_hits: stats.hit_count,
        cache_misses: stats.miss_count,
        hit_rate: stats.hit_rate(),
    })
}
