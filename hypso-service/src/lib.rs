//! Hypso Service Library
//!
//! HTTP handlers, router and OpenAPI document for the elevation lookup
//! service. Used by both the hypso-service binary and integration tests.

pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use hypso::ElevationEngine;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Engine answering elevation queries.
    pub engine: Arc<ElevationEngine>,
}

impl AppState {
    pub fn new(engine: ElevationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

// Re-export commonly used types for convenience
pub use handlers::{
    BatchRequest, BatchResponse, Coordinate, ElevationResponse, ErrorResponse, HealthResponse,
    ProfileRequest, ProfileResponse, StatsResponse,
};

/// OpenAPI documentation for the Hypso service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hypso Elevation Service",
        version = "0.1.0",
        description = "Point, batch and profile elevation lookups over chunked raster tiles.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::get_elevation,
        handlers::post_batch,
        handlers::post_profile,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::Coordinate,
            handlers::ElevationResponse,
            handlers::BatchRequest,
            handlers::BatchResponse,
            handlers::PointElevation,
            handlers::ProfileRequest,
            handlers::ProfileResponse,
            handlers::ProfileSample,
            handlers::ProfileMetadata,
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

/// Build the service router.
///
/// When `static_dir` is set, unmatched paths are served from that directory.
pub fn router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/elevation/batch", post(handlers::post_batch))
        .route("/api/elevation/profile", post(handlers::post_profile))
        .route("/api/elevation/:lat/:lon", get(handlers::get_elevation))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats));

    // Added before the layers so static responses are traced and get CORS headers.
    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
