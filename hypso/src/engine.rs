//! Elevation query engine.
//!
//! [`ElevationEngine`] resolves a coordinate to its quadrant tile, maps it to a
//! pixel, fetches the owning chunk and reads the sample.
//!
//! Two entry points are provided:
//!
//! - [`ElevationEngine::try_query`] reports every raster-layer failure as an
//!   [`ElevationError`].
//! - [`ElevationEngine::query_elevation`] folds all failures into `None` and
//!   logs them, so batches and profiles never stop on one bad point.
//!
//! ```ignore
//! use hypso::ElevationEngine;
//!
//! let engine = ElevationEngine::builder("/data/dem").build()?;
//!
//! match engine.query_elevation(35.0844, -106.6504) {
//!     Some(meters) => println!("Albuquerque: {meters} m"),
//!     None => println!("no data"),
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::chunks::{ChunkCache, DEFAULT_CHUNK_CAPACITY, DEFAULT_CHUNK_SIZE};
use crate::error::{ElevationError, Result};
use crate::raster::{FileRasterOpener, RasterOpener};
use crate::region::{Quadrant, TileIndex};
use crate::tiles::{CacheStats, TileCache, TileHandle};

/// Default no-data threshold: samples at or below it carry no elevation.
pub const DEFAULT_NODATA_THRESHOLD: f64 = -9999.0;

/// A coordinate resolved to a pixel of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelLocation {
    pub tile: Quadrant,
    pub x: u32,
    pub y: u32,
    pub chunk_x: u32,
    pub chunk_y: u32,
}

/// Summary of an open tile, for tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileInfo {
    pub quadrant: Quadrant,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub chunks_across: u32,
    pub chunks_down: u32,
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Point elevation lookups over a quadrant tile set.
pub struct ElevationEngine {
    tiles: TileCache,
    chunks: ChunkCache,
    nodata_threshold: f64,
}

impl ElevationEngine {
    /// Create a builder reading tiles from `data_dir`.
    pub fn builder<P: AsRef<Path>>(data_dir: P) -> ElevationEngineBuilder {
        ElevationEngineBuilder::new(data_dir)
    }

    /// Elevation in meters at `(lat, lon)`, or `None` when unknown.
    ///
    /// Any raster-layer failure (point outside coverage, missing tile, read
    /// error, pixel outside the raster) is logged and reported as `None`,
    /// exactly like a no-data sample.
    pub fn query_elevation(&self, lat: f64, lon: f64) -> Option<f64> {
        match self.try_query(lat, lon) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(lat, lon, error = %e, "elevation lookup failed");
                None
            }
        }
    }

    /// Elevation at `(lat, lon)` with failures reported.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(elevation))` - sample value in the source's units
    /// - `Ok(None)` - the sample is a no-data value
    /// - `Err(...)` - coverage, tile, chunk or bounds failure
    pub fn try_query(&self, lat: f64, lon: f64) -> Result<Option<f64>> {
        let quadrant = self.tiles.index().locate_tile(lat, lon)?;
        let tile = self.tiles.open(quadrant)?;
        let location = self.locate_pixel(&tile, lat, lon)?;

        let chunk = self
            .chunks
            .get_chunk(&tile, location.chunk_x, location.chunk_y)?;
        let size = self.chunks.chunk_size();
        let local_x = location.x - location.chunk_x * size;
        let local_y = location.y - location.chunk_y * size;

        let sample = chunk
            .sample(local_x, local_y)
            .ok_or_else(|| ElevationError::ChunkReadFailed {
                tile: tile.filename().to_string(),
                chunk_x: location.chunk_x,
                chunk_y: location.chunk_y,
                reason: format!("no sample at local pixel ({local_x}, {local_y})"),
            })?;

        Ok(self.classify(sample, tile.raster().nodata()))
    }

    /// Elevations for many points, in input order.
    pub fn query_batch(&self, points: &[(f64, f64)]) -> Vec<Option<f64>> {
        points
            .iter()
            .map(|&(lat, lon)| self.query_elevation(lat, lon))
            .collect()
    }

    /// Resolve `(lat, lon)` to its tile pixel and chunk without reading samples.
    pub fn pixel_for(&self, lat: f64, lon: f64) -> Result<PixelLocation> {
        let quadrant = self.tiles.index().locate_tile(lat, lon)?;
        let tile = self.tiles.open(quadrant)?;
        self.locate_pixel(&tile, lat, lon)
    }

    fn locate_pixel(&self, tile: &TileHandle, lat: f64, lon: f64) -> Result<PixelLocation> {
        let region = tile.region();
        let width = tile.width();
        let height = tile.height();

        // Rows increase southward, columns eastward.
        let fx = (lon - region.west) / region.lon_span() * f64::from(width);
        let fy = (region.north - lat) / region.lat_span() * f64::from(height);
        let x = fx.floor() as i64;
        let y = fy.floor() as i64;

        if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
            return Err(ElevationError::OutOfTileBounds {
                tile: tile.filename().to_string(),
                lat,
                lon,
                x,
                y,
                width,
                height,
            });
        }

        let (x, y) = (x as u32, y as u32);
        let size = self.chunks.chunk_size();
        Ok(PixelLocation {
            tile: tile.quadrant(),
            x,
            y,
            chunk_x: x / size,
            chunk_y: y / size,
        })
    }

    /// Apply the no-data rules to a raw sample: `None` if it is NaN, at or
    /// below the threshold, or equal to the tile's declared no-data value.
    pub fn classify(&self, sample: f64, tile_nodata: Option<f64>) -> Option<f64> {
        if sample.is_nan() || sample <= self.nodata_threshold {
            return None;
        }
        if tile_nodata.is_some_and(|nodata| sample == nodata) {
            return None;
        }
        Some(sample)
    }

    /// Open `quadrant` and describe it.
    pub fn tile_info(&self, quadrant: Quadrant) -> Result<TileInfo> {
        let tile = self.tiles.open(quadrant)?;
        let (chunks_across, chunks_down) =
            self.chunks.grid_dimensions(tile.width(), tile.height());
        let region = tile.region();
        Ok(TileInfo {
            quadrant,
            filename: tile.filename().to_string(),
            width: tile.width(),
            height: tile.height(),
            chunks_across,
            chunks_down,
            north: region.north,
            south: region.south,
            east: region.east,
            west: region.west,
        })
    }

    /// The open handle for `quadrant`.
    pub fn tile(&self, quadrant: Quadrant) -> Result<Arc<TileHandle>> {
        self.tiles.open(quadrant)
    }

    pub fn index(&self) -> &TileIndex {
        self.tiles.index()
    }

    pub fn chunk_cache(&self) -> &ChunkCache {
        &self.chunks
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tiles
    }

    pub fn tile_stats(&self) -> CacheStats {
        self.tiles.stats()
    }

    pub fn chunk_stats(&self) -> CacheStats {
        self.chunks.stats()
    }

    pub fn nodata_threshold(&self) -> f64 {
        self.nodata_threshold
    }

    /// Drop all open tiles and resident chunks.
    pub fn clear_caches(&self) {
        self.chunks.clear();
        self.tiles.clear();
    }
}

/// Builder for [`ElevationEngine`].
///
/// ```ignore
/// use hypso::ElevationEngineBuilder;
///
/// let engine = ElevationEngineBuilder::new("/data/dem")
///     .chunk_size(512)
///     .chunk_capacity(4)
///     .build()?;
/// ```
pub struct ElevationEngineBuilder {
    data_dir: PathBuf,
    chunk_size: u32,
    chunk_capacity: usize,
    nodata_threshold: f64,
    index: TileIndex,
    opener: Option<Arc<dyn RasterOpener>>,
}

impl ElevationEngineBuilder {
    /// Create a new builder with the specified data directory.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            nodata_threshold: DEFAULT_NODATA_THRESHOLD,
            index: TileIndex::new_mexico(),
            opener: None,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `HYPSO_DATA_DIR` | Directory containing tile files | Required |
    /// | `HYPSO_CHUNK_SIZE` | Chunk side length in pixels | 256 |
    /// | `HYPSO_CHUNK_CAPACITY` | Maximum resident chunks | 10 |
    /// | `HYPSO_NODATA_THRESHOLD` | Samples at or below are no-data | -9999 |
    ///
    /// # Errors
    ///
    /// Returns an error if `HYPSO_DATA_DIR` is not set or a numeric variable
    /// does not parse.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("HYPSO_DATA_DIR").map_err(|_| {
            ElevationError::InvalidArgument(
                "HYPSO_DATA_DIR environment variable not set".to_string(),
            )
        })?;

        let mut builder = Self::new(data_dir);
        if let Some(size) = env_parse("HYPSO_CHUNK_SIZE")? {
            builder.chunk_size = size;
        }
        if let Some(capacity) = env_parse("HYPSO_CHUNK_CAPACITY")? {
            builder.chunk_capacity = capacity;
        }
        if let Some(threshold) = env_parse("HYPSO_NODATA_THRESHOLD")? {
            builder.nodata_threshold = threshold;
        }
        Ok(builder)
    }

    /// Set the data directory.
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the chunk side length in pixels. Default is 256.
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the maximum number of resident chunks. Default is 10.
    pub fn chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity;
        self
    }

    /// Samples at or below this value are no-data. Default is -9999.
    pub fn nodata_threshold(mut self, threshold: f64) -> Self {
        self.nodata_threshold = threshold;
        self
    }

    /// Replace the tile layout.
    pub fn tile_index(mut self, index: TileIndex) -> Self {
        self.index = index;
        self
    }

    /// Open rasters through `opener` instead of the data directory.
    pub fn opener(mut self, opener: Arc<dyn RasterOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Build the [`ElevationEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if the chunk size or
    /// capacity is zero.
    pub fn build(self) -> Result<ElevationEngine> {
        let opener = self
            .opener
            .unwrap_or_else(|| Arc::new(FileRasterOpener::new(&self.data_dir)));
        Ok(ElevationEngine {
            tiles: TileCache::new(self.index, opener),
            chunks: ChunkCache::new(self.chunk_size, self.chunk_capacity)?,
            nodata_threshold: self.nodata_threshold,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            ElevationError::InvalidArgument(format!("{name} has invalid value {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}
