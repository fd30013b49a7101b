//! Fixed-size pixel chunks with a strict FIFO resident set.
//!
//! A tile's pixel grid is cut into `S × S` chunks; chunks on the right and
//! bottom edges are clipped to the tile's true extent. At most `capacity`
//! chunks stay resident. When an insertion exceeds the bound, the chunk
//! inserted earliest is dropped. Hits do not refresh a chunk's position.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{ElevationError, Result};
use crate::raster::PixelWindow;
use crate::region::Quadrant;
use crate::tiles::{CacheStats, TileHandle};

/// Default chunk side length in pixels.
pub const DEFAULT_CHUNK_SIZE: u32 = 256;

/// Default number of resident chunks.
pub const DEFAULT_CHUNK_CAPACITY: usize = 10;

/// Identity of a chunk: tile plus chunk column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub tile: Quadrant,
    pub chunk_x: u32,
    pub chunk_y: u32,
}

/// An immutable block of samples read from one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    key: ChunkKey,
    window: PixelWindow,
    data: Vec<f64>,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    /// Pixel window of the tile this chunk covers.
    pub fn window(&self) -> PixelWindow {
        self.window
    }

    /// Clipped width in pixels.
    pub fn width(&self) -> u32 {
        self.window.width
    }

    /// Clipped height in pixels.
    pub fn height(&self) -> u32 {
        self.window.height
    }

    /// Sample at chunk-local `(x, y)`.
    pub fn sample(&self, local_x: u32, local_y: u32) -> Option<f64> {
        if local_x >= self.window.width || local_y >= self.window.height {
            return None;
        }
        self.data
            .get(local_y as usize * self.window.width as usize + local_x as usize)
            .copied()
    }

    /// All samples, row-major.
    pub fn samples(&self) -> &[f64] {
        &self.data
    }
}

#[derive(Default)]
struct Resident {
    chunks: HashMap<ChunkKey, Arc<Chunk>>,
    order: VecDeque<ChunkKey>,
}

/// Bounded FIFO cache of [`Chunk`]s.
pub struct ChunkCache {
    chunk_size: u32,
    capacity: usize,
    resident: Mutex<Resident>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
}

impl ChunkCache {
    /// Create a cache for `chunk_size`-pixel chunks holding at most
    /// `capacity` of them.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if either value is zero.
    pub fn new(chunk_size: u32, capacity: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ElevationError::InvalidArgument(
                "chunk size must be positive".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(ElevationError::InvalidArgument(
                "chunk capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            capacity,
            resident: Mutex::new(Resident::default()),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
        })
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of chunk columns and rows covering a `width × height` tile.
    pub fn grid_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.div_ceil(self.chunk_size),
            height.div_ceil(self.chunk_size),
        )
    }

    /// Return chunk `(chunk_x, chunk_y)` of `tile`, reading it on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::ChunkReadFailed`] if the chunk lies outside
    /// the tile or the underlying read fails. Nothing is cached on failure.
    pub fn get_chunk(&self, tile: &TileHandle, chunk_x: u32, chunk_y: u32) -> Result<Arc<Chunk>> {
        let key = ChunkKey {
            tile: tile.quadrant(),
            chunk_x,
            chunk_y,
        };

        if let Some(chunk) = self.lock().chunks.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(chunk));
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let chunk = Arc::new(self.read_chunk(tile, key)?);

        let mut resident = self.lock();
        // Another caller may have read the same chunk while the lock was free.
        if let Some(existing) = resident.chunks.get(&key) {
            return Ok(Arc::clone(existing));
        }
        resident.chunks.insert(key, Arc::clone(&chunk));
        resident.order.push_back(key);
        while resident.order.len() > self.capacity {
            if let Some(oldest) = resident.order.pop_front() {
                resident.chunks.remove(&oldest);
                self.eviction_count.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(?oldest, "evicted chunk");
            }
        }

        Ok(chunk)
    }

    fn read_chunk(&self, tile: &TileHandle, key: ChunkKey) -> Result<Chunk> {
        let failed = |reason: String| ElevationError::ChunkReadFailed {
            tile: tile.filename().to_string(),
            chunk_x: key.chunk_x,
            chunk_y: key.chunk_y,
            reason,
        };

        let x = u64::from(key.chunk_x) * u64::from(self.chunk_size);
        let y = u64::from(key.chunk_y) * u64::from(self.chunk_size);
        if x >= u64::from(tile.width()) || y >= u64::from(tile.height()) {
            return Err(failed(format!(
                "chunk origin ({x}, {y}) outside {}x{} tile",
                tile.width(),
                tile.height()
            )));
        }
        // Both origins are below a u32 dimension here.
        let (x, y) = (x as u32, y as u32);
        let window = PixelWindow::new(
            x,
            y,
            self.chunk_size.min(tile.width() - x),
            self.chunk_size.min(tile.height() - y),
        );

        let data = tile
            .raster()
            .read_window(window)
            .map_err(|e| failed(e.to_string()))?;
        if data.len() != window.len() {
            return Err(failed(format!(
                "expected {} samples, got {}",
                window.len(),
                data.len()
            )));
        }

        tracing::debug!(tile = %tile.filename(), ?window, "read chunk");
        Ok(Chunk { key, window, data })
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys, oldest first.
    pub fn keys_in_order(&self) -> Vec<ChunkKey> {
        self.lock().order.iter().copied().collect()
    }

    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.lock().chunks.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len() as u64,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
        }
    }

    /// Drop all resident chunks.
    pub fn clear(&self) {
        let mut resident = self.lock();
        resident.chunks.clear();
        resident.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Resident> {
        self.resident.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{MemoryRaster, MemoryRasterOpener, RasterOpener, RasterSource};
    use crate::region::TileIndex;
    use crate::tiles::TileCache;
    use std::sync::atomic::AtomicUsize;

    /// Wraps a memory raster and counts window reads.
    struct CountingRaster {
        inner: MemoryRaster,
        reads: Arc<AtomicUsize>,
    }

    impl RasterSource for CountingRaster {
        fn width(&self) -> u32 {
            self.inner.width()
        }
        fn height(&self) -> u32 {
            self.inner.height()
        }
        fn read_window(&self, window: PixelWindow) -> Result<Vec<f64>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_window(window)
        }
    }

    struct CountingOpener {
        reads: Arc<AtomicUsize>,
        width: u32,
        height: u32,
    }

    impl RasterOpener for CountingOpener {
        fn open(&self, _filename: &str) -> Result<Arc<dyn RasterSource>> {
            let inner =
                MemoryRaster::from_fn(self.width, self.height, |x, y| (y * 10_000 + x) as f64)?;
            Ok(Arc::new(CountingRaster {
                inner,
                reads: Arc::clone(&self.reads),
            }))
        }
    }

    fn counting_tile(width: u32, height: u32) -> (Arc<TileHandle>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let opener = CountingOpener {
            reads: Arc::clone(&reads),
            width,
            height,
        };
        let tiles = TileCache::new(TileIndex::new_mexico(), Arc::new(opener));
        (tiles.open(Quadrant::NorthWest).unwrap(), reads)
    }

    fn key(chunk_x: u32, chunk_y: u32) -> ChunkKey {
        ChunkKey {
            tile: Quadrant::NorthWest,
            chunk_x,
            chunk_y,
        }
    }

    #[test]
    fn test_rejects_zero_parameters() {
        assert!(ChunkCache::new(0, 10).is_err());
        assert!(ChunkCache::new(256, 0).is_err());
    }

    #[test]
    fn test_hit_does_not_reread() {
        let (tile, reads) = counting_tile(40, 40);
        let cache = ChunkCache::new(16, 4).unwrap();

        let a = cache.get_chunk(&tile, 1, 1).unwrap();
        let b = cache.get_chunk(&tile, 1, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hit_count, 1);
        assert_eq!(cache.stats().miss_count, 1);
    }

    #[test]
    fn test_edge_chunks_are_clipped() {
        let (tile, _) = counting_tile(40, 35);
        let cache = ChunkCache::new(16, 10).unwrap();
        assert_eq!(cache.grid_dimensions(40, 35), (3, 3));

        let interior = cache.get_chunk(&tile, 0, 0).unwrap();
        assert_eq!((interior.width(), interior.height()), (16, 16));

        let corner = cache.get_chunk(&tile, 2, 2).unwrap();
        assert_eq!((corner.width(), corner.height()), (8, 3));
        assert_eq!(corner.samples().len(), 24);
        // Last pixel of the tile at local (7, 2).
        assert_eq!(corner.sample(7, 2), Some((34 * 10_000 + 39) as f64));
        assert_eq!(corner.sample(8, 0), None);
    }

    #[test]
    fn test_fifo_eviction_order() {
        let (tile, _) = counting_tile(64, 64);
        let cache = ChunkCache::new(16, 3).unwrap();

        cache.get_chunk(&tile, 0, 0).unwrap();
        cache.get_chunk(&tile, 1, 0).unwrap();
        cache.get_chunk(&tile, 2, 0).unwrap();
        // A hit on the oldest chunk does not refresh it.
        cache.get_chunk(&tile, 0, 0).unwrap();

        cache.get_chunk(&tile, 3, 0).unwrap();
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&key(0, 0)));
        assert_eq!(cache.keys_in_order(), vec![key(1, 0), key(2, 0), key(3, 0)]);

        cache.get_chunk(&tile, 0, 1).unwrap();
        assert_eq!(cache.keys_in_order(), vec![key(2, 0), key(3, 0), key(0, 1)]);
        assert_eq!(cache.stats().eviction_count, 2);
    }

    #[test]
    fn test_bound_holds_after_every_insert() {
        let (tile, _) = counting_tile(160, 160);
        let cache = ChunkCache::new(16, 10).unwrap();

        for cy in 0..10 {
            for cx in 0..10 {
                cache.get_chunk(&tile, cx, cy).unwrap();
                assert!(cache.len() <= 10);
            }
        }
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn test_out_of_range_chunk_fails_and_is_not_cached() {
        let (tile, reads) = counting_tile(40, 40);
        let cache = ChunkCache::new(16, 4).unwrap();

        match cache.get_chunk(&tile, 3, 0) {
            Err(ElevationError::ChunkReadFailed {
                chunk_x, chunk_y, ..
            }) => {
                assert_eq!((chunk_x, chunk_y), (3, 0));
            }
            other => panic!("expected ChunkReadFailed, got {other:?}"),
        }
        assert!(cache.is_empty());
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_read_error_propagates() {
        struct BrokenRaster;
        impl RasterSource for BrokenRaster {
            fn width(&self) -> u32 {
                32
            }
            fn height(&self) -> u32 {
                32
            }
            fn read_window(&self, _window: PixelWindow) -> Result<Vec<f64>> {
                Err(ElevationError::Io(std::io::Error::other("disk on fire")))
            }
        }
        struct BrokenOpener;
        impl RasterOpener for BrokenOpener {
            fn open(&self, _filename: &str) -> Result<Arc<dyn RasterSource>> {
                Ok(Arc::new(BrokenRaster))
            }
        }

        let tiles = TileCache::new(TileIndex::new_mexico(), Arc::new(BrokenOpener));
        let tile = tiles.open(Quadrant::NorthWest).unwrap();
        let cache = ChunkCache::new(16, 4).unwrap();

        match cache.get_chunk(&tile, 0, 0) {
            Err(ElevationError::ChunkReadFailed { reason, .. }) => {
                assert!(reason.contains("disk on fire"));
            }
            other => panic!("expected ChunkReadFailed, got {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_chunk_samples_match_full_read() {
        let opener = MemoryRasterOpener::new().with(
            "nm_dem_northwest.tiff",
            MemoryRaster::from_fn(50, 30, |x, y| (x * 3 + y * 7) as f64).unwrap(),
        );
        let tiles = TileCache::new(TileIndex::new_mexico(), Arc::new(opener));
        let tile = tiles.open(Quadrant::NorthWest).unwrap();
        let cache = ChunkCache::new(16, 2).unwrap();

        let full = tile
            .raster()
            .read_window(PixelWindow::new(0, 0, 50, 30))
            .unwrap();
        for y in 0..30u32 {
            for x in 0..50u32 {
                let chunk = cache.get_chunk(&tile, x / 16, y / 16).unwrap();
                let sample = chunk.sample(x % 16, y % 16).unwrap();
                assert_eq!(sample, full[(y * 50 + x) as usize], "pixel ({x}, {y})");
            }
        }
    }
}
