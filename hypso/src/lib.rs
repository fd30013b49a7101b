//! # Hypso - Chunked Raster Elevation Library
//!
//! Point elevation lookups over a set of large raster tiles, plus a resumable
//! pipeline for bulk acquisition of elevation points from a remote service.
//!
//! ## Features
//!
//! - **Quadrant tiles**: a coverage rectangle split into four tiles, opened
//!   lazily and kept open
//! - **Chunked reads**: only the square chunk containing a pixel is decoded,
//!   and recently used chunks stay in a bounded FIFO cache
//! - **Formats**: GeoTIFF (strips or tiles) and SRTM `.hgt`
//! - **Acquisition** (feature `acquire`): batched, concurrency-limited
//!   fetching with retries and crash-safe resume
//!
//! ## Quick Start
//!
//! ```
//! use hypso::{Quadrant, TileIndex};
//!
//! let index = TileIndex::new_mexico();
//! assert_eq!(index.locate_tile(35.0844, -106.6504).unwrap(), Quadrant::NorthWest);
//! assert_eq!(index.filename(Quadrant::SouthEast), "nm_dem_southeast.tiff");
//! assert!(index.locate_tile(40.0, -106.0).is_err());
//! ```
//!
//! ```ignore
//! use hypso::ElevationEngine;
//!
//! let engine = ElevationEngine::builder("/data/dem").build()?;
//! if let Some(meters) = engine.query_elevation(35.0844, -106.6504) {
//!     println!("Elevation: {meters} m");
//! }
//! ```
//!
//! ## No-data
//!
//! A sample carries no elevation when it is NaN, at or below the engine's
//! no-data threshold (default -9999), or equal to the tile's declared no-data
//! value (for example -32768 in SRTM voids). Such points read as `None`.

pub mod chunks;
pub mod engine;
pub mod error;
pub mod geotiff;
pub mod grid;
pub mod hgt;
pub mod profile;
pub mod raster;
pub mod region;
pub mod store;
pub mod tiles;

#[cfg(feature = "acquire")]
pub mod fetch;
#[cfg(feature = "acquire")]
pub mod pipeline;
#[cfg(feature = "acquire")]
pub mod retry;

// Re-export main types at crate root for convenience
pub use chunks::{Chunk, ChunkCache, ChunkKey, DEFAULT_CHUNK_CAPACITY, DEFAULT_CHUNK_SIZE};
pub use engine::{
    ElevationEngine, ElevationEngineBuilder, PixelLocation, TileInfo, DEFAULT_NODATA_THRESHOLD,
};
pub use error::{ElevationError, Result};
pub use grid::{AcquisitionGrid, WorkUnit};
pub use profile::{haversine_distance, GeoPoint, Profile, ProfilePoint};
pub use raster::{
    FileRasterOpener, MemoryRaster, MemoryRasterOpener, PixelWindow, RasterOpener, RasterSource,
};
pub use region::{Quadrant, Region, TileIndex};
pub use store::{AcquisitionStore, PointCache, PointKey, ProgressRecord};
pub use tiles::{CacheStats, TileCache, TileHandle};

#[cfg(feature = "acquire")]
pub use fetch::{ElevationSource, EpqsClient, EpqsConfig};
#[cfg(feature = "acquire")]
pub use pipeline::{AcquisitionPipeline, PipelineConfig, RunStatus, RunSummary, UnitReport};
#[cfg(feature = "acquire")]
pub use retry::{Jitter, RetryPolicy};
