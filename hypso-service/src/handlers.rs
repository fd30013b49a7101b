//! HTTP request handlers for the elevation service.
//!
//! Points the engine cannot answer (outside coverage, missing tile, no-data
//! sample, read failure) come back with a `null` elevation and status 200.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hypso::profile::DEFAULT_PROFILE_POINTS;
use hypso::GeoPoint;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;

/// Largest accepted profile request.
pub const MAX_PROFILE_POINTS: usize = 10_000;

/// A coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl From<Coordinate> for GeoPoint {
    fn from(c: Coordinate) -> Self {
        GeoPoint::new(c.lat, c.lon)
    }
}

/// Single-point elevation response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ElevationResponse {
    /// Elevation in meters, or null when unknown.
    pub elevation: Option<f64>,
}

/// Batch elevation request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub points: Vec<Coordinate>,
}

/// A coordinate with its elevation.
#[derive(Debug, Serialize, ToSchema)]
pub struct PointElevation {
    pub lat: f64,
    pub lon: f64,
    /// Elevation in meters, or null when unknown.
    pub elevation: Option<f64>,
}

/// Batch elevation response, in request order.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub points: Vec<PointElevation>,
}

/// Elevation profile request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub start: Coordinate,
    pub end: Coordinate,
    /// Number of samples including both endpoints (default 100).
    pub num_points: Option<usize>,
}

/// One profile sample.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileSample {
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    /// Meters from the start.
    pub distance: f64,
}

/// Profile summary.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    /// Great-circle distance between the endpoints in meters.
    pub total_distance: f64,
    pub num_points: usize,
    pub start: Coordinate,
    pub end: Coordinate,
}

/// Elevation profile response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub points: Vec<ProfileSample>,
    pub metadata: ProfileMetadata,
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
    /// Number of tiles open.
    pub open_tiles: u64,
    pub tile_hits: u64,
    pub tile_misses: u64,
    /// Number of chunks resident in the chunk cache.
    pub cached_chunks: u64,
    pub chunk_capacity: usize,
    pub chunk_hits: u64,
    pub chunk_misses: u64,
    pub chunk_evictions: u64,
    /// Chunk cache hit rate (0.0 to 1.0).
    pub chunk_hit_rate: f64,
}

/// A request-level failure rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status, error = %self.message, "request failed");
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Get elevation at a single point.
#[utoipa::path(
    get,
    path = "/api/elevation/{lat}/{lon}",
    params(
        ("lat" = f64, Path, description = "Latitude in decimal degrees"),
        ("lon" = f64, Path, description = "Longitude in decimal degrees")
    ),
    responses(
        (status = 200, description = "Elevation, null when unknown", body = ElevationResponse),
        (status = 400, description = "Coordinates are not numbers")
    ),
    tag = "elevation"
)]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Path((lat, lon)): Path<(f64, f64)>,
) -> Result<Json<ElevationResponse>, ApiError> {
    // A chunk miss decodes part of a tile, which blocks.
    let elevation = tokio::task::spawn_blocking(move || state.engine.query_elevation(lat, lon))
        .await
        .map_err(|e| ApiError::internal(format!("elevation query failed: {e}")))?;

    tracing::debug!(lat, lon, elevation = ?elevation, "Elevation query");
    Ok(Json(ElevationResponse { elevation }))
}

/// Get elevations for many points.
#[utoipa::path(
    post,
    path = "/api/elevation/batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Elevations in request order", body = BatchResponse),
        (status = 422, description = "Malformed request body")
    ),
    tag = "elevation"
)]
pub async fn post_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let count = request.points.len();
    let points = tokio::task::spawn_blocking(move || {
        request
            .points
            .into_iter()
            .map(|p| PointElevation {
                lat: p.lat,
                lon: p.lon,
                elevation: state.engine.query_elevation(p.lat, p.lon),
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| ApiError::internal(format!("batch query failed: {e}")))?;

    tracing::info!(
        points = count,
        known = points.iter().filter(|p| p.elevation.is_some()).count(),
        "Batch query"
    );
    Ok(Json(BatchResponse { points }))
}

/// Sample an elevation profile between two points.
#[utoipa::path(
    post,
    path = "/api/elevation/profile",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "Profile samples and metadata", body = ProfileResponse),
        (status = 400, description = "numPoints out of range", body = ErrorResponse),
        (status = 422, description = "Malformed request body")
    ),
    tag = "elevation"
)]
pub async fn post_profile(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let num_points = request.num_points.unwrap_or(DEFAULT_PROFILE_POINTS);
    if !(2..=MAX_PROFILE_POINTS).contains(&num_points) {
        return Err(ApiError::bad_request(format!(
            "numPoints must be between 2 and {MAX_PROFILE_POINTS}, got {num_points}"
        )));
    }

    let (start, end) = (request.start, request.end);
    let profile = tokio::task::spawn_blocking(move || {
        state.engine.profile(start.into(), end.into(), num_points)
    })
    .await
    .map_err(|e| ApiError::internal(format!("profile query failed: {e}")))?
    .map_err(|e| ApiError::bad_request(e.to_string()))?;

    tracing::info!(
        num_points,
        total_distance = profile.total_distance,
        "Profile query"
    );

    Ok(Json(ProfileResponse {
        points: profile
            .points
            .iter()
            .map(|p| ProfileSample {
                lat: p.lat,
                lon: p.lon,
                elevation: p.elevation,
                distance: p.distance,
            })
            .collect(),
        metadata: ProfileMetadata {
            total_distance: profile.total_distance,
            num_points,
            start,
            end,
        },
    }))
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "system"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get cache statistics.
#[utoipa::path(
    get,
    path = "/stats",
    responses((status = 200, description = "Tile and chunk cache statistics", body = StatsResponse)),
    tag = "system"
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let tiles = state.engine.tile_stats();
    let chunks = state.engine.chunk_stats();

    Json(StatsResponse {
        open_tiles: tiles.entry_count,
        tile_hits: tiles.hit_count,
        tile_misses: tiles.miss_count,
        cached_chunks: chunks.entry_count,
        chunk_capacity: state.engine.chunk_cache().capacity(),
        chunk_hits: chunks.hit_count,
        chunk_misses: chunks.miss_count,
        chunk_evictions: chunks.eviction_count,
        chunk_hit_rate: chunks.hit_rate(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_request_deserialize() {
        let json = r#"{"start": {"lat": 35.0, "lon": -106.6}, "end": {"lat": 35.7, "lon": -105.9}, "numPoints": 25}"#;
        let request: ProfileRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.start, Coordinate { lat: 35.0, lon: -106.6 });
        assert_eq!(request.num_points, Some(25));

        let json = r#"{"start": {"lat": 35.0, "lon": -106.6}, "end": {"lat": 35.7, "lon": -105.9}}"#;
        let request: ProfileRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.num_points, None);
    }

    #[test]
    fn test_unknown_elevation_serializes_as_null() {
        let json = serde_json::to_string(&ElevationResponse { elevation: None }).unwrap();
        assert_eq!(json, r#"{"elevation":null}"#);
    }

    #[test]
    fn test_metadata_is_camel_case() {
        let metadata = ProfileMetadata {
            total_distance: 1.5,
            num_points: 2,
            start: Coordinate { lat: 0.0, lon: 0.0 },
            end: Coordinate { lat: 1.0, lon: 1.0 },
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["totalDistance"], 1.5);
        assert_eq!(json["numPoints"], 2);
    }
}
