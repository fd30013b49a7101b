//! Tile handle cache.
//!
//! Opening a quadrant tile parses its header and maps or buffers the file, so
//! each tile is opened at most once per cache lifetime and shared through an
//! [`Arc<TileHandle>`]. A failed open is returned to the caller but never
//! memoized; the next request tries again.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;

use crate::error::{ElevationError, Result};
use crate::raster::{RasterOpener, RasterSource};
use crate::region::{Quadrant, Region, TileIndex};

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently resident.
    pub entry_count: u64,
    /// Number of requests served from the cache.
    pub hit_count: u64,
    /// Number of requests that had to load.
    pub miss_count: u64,
    /// Number of entries evicted to make room.
    pub eviction_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// An opened tile: its raster, geographic bounds and identity.
pub struct TileHandle {
    quadrant: Quadrant,
    filename: String,
    region: Region,
    raster: Arc<dyn RasterSource>,
}

impl TileHandle {
    pub fn quadrant(&self) -> Quadrant {
        self.quadrant
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn raster(&self) -> &dyn RasterSource {
        self.raster.as_ref()
    }
}

impl std::fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileHandle")
            .field("quadrant", &self.quadrant)
            .field("filename", &self.filename)
            .field("region", &self.region)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Memoizes one open [`TileHandle`] per quadrant.
pub struct TileCache {
    index: TileIndex,
    opener: Arc<dyn RasterOpener>,
    handles: Cache<Quadrant, Arc<TileHandle>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl TileCache {
    pub fn new(index: TileIndex, opener: Arc<dyn RasterOpener>) -> Self {
        Self {
            index,
            opener,
            // Capacity equals the tile count, so nothing is ever evicted.
            handles: Cache::builder()
                .max_capacity(Quadrant::ALL.len() as u64)
                .build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Return the handle for `quadrant`, opening the tile on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::TileUnavailable`] if the backing file is
    /// missing or unreadable.
    pub fn open(&self, quadrant: Quadrant) -> Result<Arc<TileHandle>> {
        if let Some(handle) = self.handles.get(&quadrant) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(handle);
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);

        // try_get_with coalesces concurrent opens and does not cache errors.
        self.handles
            .try_get_with(quadrant, || self.load(quadrant))
            .map_err(|e: Arc<ElevationError>| match e.as_ref() {
                ElevationError::TileUnavailable { path, reason } => {
                    ElevationError::TileUnavailable {
                        path: path.clone(),
                        reason: reason.clone(),
                    }
                }
                other => ElevationError::TileUnavailable {
                    path: PathBuf::from(self.index.filename(quadrant)),
                    reason: other.to_string(),
                },
            })
    }

    fn load(&self, quadrant: Quadrant) -> Result<Arc<TileHandle>> {
        let filename = self.index.filename(quadrant);
        let raster = self.opener.open(&filename).inspect_err(|e| {
            tracing::warn!(tile = %filename, error = %e, "failed to open tile");
        })?;

        tracing::info!(
            tile = %filename,
            width = raster.width(),
            height = raster.height(),
            "opened tile"
        );

        Ok(Arc::new(TileHandle {
            quadrant,
            region: self.index.region(quadrant),
            filename,
            raster,
        }))
    }

    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    /// Quadrants whose tiles are currently open, in index order.
    pub fn opened_tiles(&self) -> Vec<Quadrant> {
        Quadrant::ALL
            .into_iter()
            .filter(|q| self.handles.contains_key(q))
            .collect()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.opened_tiles().len() as u64,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            eviction_count: 0,
        }
    }

    /// Drop all open handles; tiles are reopened on next use.
    pub fn clear(&self) {
        self.handles.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{MemoryRaster, MemoryRasterOpener, PixelWindow};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn raster(value: f64) -> MemoryRaster {
        MemoryRaster::new(2, 2, vec![value; 4]).unwrap()
    }

    /// Counts opens and fails until `available` is set.
    struct FlakyOpener {
        opens: AtomicUsize,
        available: Mutex<bool>,
    }

    impl RasterOpener for FlakyOpener {
        fn open(&self, filename: &str) -> Result<Arc<dyn RasterSource>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if *self.available.lock().unwrap() {
                Ok(Arc::new(raster(1.0)))
            } else {
                Err(ElevationError::TileUnavailable {
                    path: filename.into(),
                    reason: "missing".to_string(),
                })
            }
        }
    }

    #[test]
    fn test_open_once_per_tile() {
        let opener = Arc::new(FlakyOpener {
            opens: AtomicUsize::new(0),
            available: Mutex::new(true),
        });
        let cache = TileCache::new(TileIndex::new_mexico(), opener.clone());

        let a = cache.open(Quadrant::NorthWest).unwrap();
        let b = cache.open(Quadrant::NorthWest).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(cache.opened_tiles(), vec![Quadrant::NorthWest]);
    }

    #[test]
    fn test_failed_open_not_cached() {
        let opener = Arc::new(FlakyOpener {
            opens: AtomicUsize::new(0),
            available: Mutex::new(false),
        });
        let cache = TileCache::new(TileIndex::new_mexico(), opener.clone());

        match cache.open(Quadrant::SouthEast) {
            Err(ElevationError::TileUnavailable { path, .. }) => {
                assert_eq!(path, PathBuf::from("nm_dem_southeast.tiff"));
            }
            other => panic!("expected TileUnavailable, got {other:?}"),
        }
        assert!(cache.open(Quadrant::SouthEast).is_err());
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
        assert!(cache.opened_tiles().is_empty());

        *opener.available.lock().unwrap() = true;
        assert!(cache.open(Quadrant::SouthEast).is_ok());
        assert_eq!(opener.opens.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handle_carries_region_and_dimensions() {
        let opener = MemoryRasterOpener::new().with(
            "nm_dem_northeast.tiff",
            MemoryRaster::new(3, 2, vec![0.0; 6]).unwrap(),
        );
        let cache = TileCache::new(TileIndex::new_mexico(), Arc::new(opener));

        let handle = cache.open(Quadrant::NorthEast).unwrap();
        assert_eq!(handle.width(), 3);
        assert_eq!(handle.height(), 2);
        assert_eq!(handle.filename(), "nm_dem_northeast.tiff");
        assert_eq!(handle.region().west, -106.0);
        assert_eq!(
            handle
                .raster()
                .read_window(PixelWindow::new(0, 0, 1, 1))
                .unwrap(),
            vec![0.0]
        );
    }

    #[test]
    fn test_clear_reopens() {
        let opener = Arc::new(FlakyOpener {
            opens: AtomicUsize::new(0),
            available: Mutex::new(true),
        });
        let cache = TileCache::new(TileIndex::new_mexico(), opener.clone());

        cache.open(Quadrant::NorthWest).unwrap();
        cache.clear();
        cache.open(Quadrant::NorthWest).unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            entry_count: 5,
            hit_count: 80,
            miss_count: 20,
            eviction_count: 0,
        };
        assert_eq!(stats.hit_rate(), 0.8);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
