//! Error types for the Hypso library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when reading rasters or acquiring elevations.
#[derive(Error, Debug)]
pub enum ElevationError {
    /// IO error when reading files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The point is not inside any tile of the index.
    #[error("Coordinates out of coverage: lat={lat}, lon={lon}")]
    OutOfCoverage { lat: f64, lon: f64 },

    /// The backing file of a tile is missing or unreadable.
    #[error("Tile unavailable: {path}: {reason}")]
    TileUnavailable { path: PathBuf, reason: String },

    /// Reading a chunk window from a tile failed.
    #[error("Failed to read chunk ({chunk_x}, {chunk_y}) of {tile}: {reason}")]
    ChunkReadFailed {
        tile: String,
        chunk_x: u32,
        chunk_y: u32,
        reason: String,
    },

    /// Pixel math placed the point outside the tile's raster extent.
    #[error(
        "Pixel ({x}, {y}) outside {width}x{height} raster of {tile} (lat={lat}, lon={lon})"
    )]
    OutOfTileBounds {
        tile: String,
        lat: f64,
        lon: f64,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    /// A pixel window does not fit inside the raster.
    #[error("Window {x},{y} {window_width}x{window_height} exceeds {width}x{height} raster")]
    WindowOutOfRange {
        x: u32,
        y: u32,
        window_width: u32,
        window_height: u32,
        width: u32,
        height: u32,
    },

    /// The remote elevation service failed or returned no usable value.
    #[error("Elevation fetch failed for lat={lat}, lon={lon}: {reason}")]
    FetchFailed { lat: f64, lon: f64, reason: String },

    /// Writing the point cache or progress record failed.
    #[error("Failed to persist {path}: {reason}")]
    PersistenceFailed { path: PathBuf, reason: String },

    /// Region edges are inconsistent.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// A caller-supplied argument or configuration value is invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using [`ElevationError`].
pub type Result<T> = std::result::Result<T, ElevationError>;
