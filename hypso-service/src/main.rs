//! Hypso Service - HTTP microservice for raster elevation queries.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HYPSO_DATA_DIR` | Directory containing the quadrant tiles | Current directory |
//! | `HYPSO_CHUNK_SIZE` | Chunk edge length in pixels | 256 |
//! | `HYPSO_CHUNK_CAPACITY` | Maximum cached chunks | 10 |
//! | `HYPSO_NODATA_THRESHOLD` | Samples at or below this are no-data | -9999 |
//! | `HYPSO_PORT` | HTTP server port | 3000 |
//! | `HYPSO_STATIC_DIR` | Directory served for unmatched paths | None |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /api/elevation/{lat}/{lon}` - Elevation at a point
//! - `POST /api/elevation/batch` - Elevations for a list of points
//! - `POST /api/elevation/profile` - Elevation profile between two points
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use hypso::{ElevationEngineBuilder, ElevationError};
use hypso_service::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hypso=info,hypso_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = std::env::var("HYPSO_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let static_dir = std::env::var_os("HYPSO_STATIC_DIR").map(PathBuf::from);

    // The library handles HYPSO_DATA_DIR, HYPSO_CHUNK_SIZE,
    // HYPSO_CHUNK_CAPACITY and HYPSO_NODATA_THRESHOLD
    let builder = match ElevationEngineBuilder::from_env() {
        Ok(builder) => builder,
        Err(ElevationError::InvalidArgument(reason)) if std::env::var_os("HYPSO_DATA_DIR").is_none() => {
            tracing::warn!(%reason, "HYPSO_DATA_DIR not set, using current directory");
            ElevationEngineBuilder::new(".")
        }
        Err(e) => return Err(e.into()),
    };
    let engine = builder.build()?;

    tracing::info!(
        coverage = %engine.index().coverage(),
        chunk_size = engine.chunk_cache().chunk_size(),
        chunk_capacity = engine.chunk_cache().capacity(),
        nodata_threshold = engine.nodata_threshold(),
        static_dir = ?static_dir,
        port,
        "Starting Hypso service"
    );

    let app = router(Arc::new(AppState::new(engine)), static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
