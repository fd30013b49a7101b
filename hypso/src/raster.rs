//! Windowed raster access.
//!
//! Every backing tile is exposed as a [`RasterSource`]: a single elevation band
//! with known pixel dimensions that can read a rectangular [`PixelWindow`].
//! Sources are produced by a [`RasterOpener`], which lets the tile cache open
//! files on disk ([`FileRasterOpener`]) or in-memory fakes
//! ([`MemoryRasterOpener`]) through the same interface.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ElevationError, Result};
use crate::geotiff::GeoTiffRaster;
use crate::hgt::HgtRaster;

/// A rectangular pixel window: origin `(x, y)` at the top-left, `width`
/// columns by `height` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelWindow {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check that the window lies inside a `width x height` raster.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::WindowOutOfRange`] if the window is empty or
    /// extends past the raster edge.
    pub fn check_within(&self, width: u32, height: u32) -> Result<()> {
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        if self.is_empty() || right > u64::from(width) || bottom > u64::from(height) {
            return Err(ElevationError::WindowOutOfRange {
                x: self.x,
                y: self.y,
                window_width: self.width,
                window_height: self.height,
                width,
                height,
            });
        }
        Ok(())
    }
}

/// A single-band elevation raster with windowed reads.
pub trait RasterSource: Send + Sync {
    /// Raster width in pixels.
    fn width(&self) -> u32;

    /// Raster height in pixels.
    fn height(&self) -> u32;

    /// The raster's own no-data value, if the format declares one.
    fn nodata(&self) -> Option<f64> {
        None
    }

    /// Read a window of samples, row-major, `window.len()` values long.
    fn read_window(&self, window: PixelWindow) -> Result<Vec<f64>>;
}

/// Opens raster sources by filename.
pub trait RasterOpener: Send + Sync {
    /// Open the raster stored under `filename` (relative to the opener's root).
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::TileUnavailable`] if the raster is missing or
    /// cannot be decoded.
    fn open(&self, filename: &str) -> Result<Arc<dyn RasterSource>>;
}

/// Opens raster files from a data directory, choosing the decoder by
/// extension: `.tif`/`.tiff` as GeoTIFF, `.hgt` as SRTM.
#[derive(Debug, Clone)]
pub struct FileRasterOpener {
    data_dir: std::path::PathBuf,
}

impl FileRasterOpener {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl RasterOpener for FileRasterOpener {
    fn open(&self, filename: &str) -> Result<Arc<dyn RasterSource>> {
        let path = self.data_dir.join(filename);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let opened: Result<Arc<dyn RasterSource>> = match extension.as_deref() {
            Some("tif") | Some("tiff") => {
                GeoTiffRaster::open(&path).map(|r| Arc::new(r) as Arc<dyn RasterSource>)
            }
            Some("hgt") => HgtRaster::open(&path).map(|r| Arc::new(r) as Arc<dyn RasterSource>),
            _ => {
                return Err(ElevationError::TileUnavailable {
                    path,
                    reason: "unsupported raster format".to_string(),
                })
            }
        };

        opened.map_err(|e| match e {
            ElevationError::TileUnavailable { .. } => e,
            other => ElevationError::TileUnavailable {
                path: path.clone(),
                reason: other.to_string(),
            },
        })
    }
}

/// An in-memory raster, used for synthetic tiles and tests.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    width: u32,
    height: u32,
    data: Vec<f64>,
    nodata: Option<f64>,
}

impl MemoryRaster {
    /// Create a raster from row-major samples.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if `data.len()` is not
    /// `width * height` or either dimension is zero.
    pub fn new(width: u32, height: u32, data: Vec<f64>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ElevationError::InvalidArgument(format!(
                "raster dimensions must be positive, got {width}x{height}"
            )));
        }
        if data.len() != width as usize * height as usize {
            return Err(ElevationError::InvalidArgument(format!(
                "expected {} samples for {width}x{height}, got {}",
                width as usize * height as usize,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            nodata: None,
        })
    }

    /// Create a raster whose samples are computed from `(x, y)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f64) -> Result<Self> {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(width, height, data)
    }

    /// Declare a format-level no-data value.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Direct sample access, bypassing windowing.
    pub fn sample(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

impl RasterSource for MemoryRaster {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn read_window(&self, window: PixelWindow) -> Result<Vec<f64>> {
        window.check_within(self.width, self.height)?;

        let stride = self.width as usize;
        let mut out = Vec::with_capacity(window.len());
        for row in window.y..window.y + window.height {
            let start = row as usize * stride + window.x as usize;
            out.extend_from_slice(&self.data[start..start + window.width as usize]);
        }
        Ok(out)
    }
}

/// Serves [`MemoryRaster`]s by filename; unknown names are unavailable.
#[derive(Debug, Clone, Default)]
pub struct MemoryRasterOpener {
    rasters: HashMap<String, Arc<MemoryRaster>>,
}

impl MemoryRasterOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raster under `filename`.
    pub fn insert(&mut self, filename: impl Into<String>, raster: MemoryRaster) {
        self.rasters.insert(filename.into(), Arc::new(raster));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, filename: impl Into<String>, raster: MemoryRaster) -> Self {
        self.insert(filename, raster);
        self
    }
}

impl RasterOpener for MemoryRasterOpener {
    fn open(&self, filename: &str) -> Result<Arc<dyn RasterSource>> {
        self.rasters
            .get(filename)
            .map(|r| Arc::clone(r) as Arc<dyn RasterSource>)
            .ok_or_else(|| ElevationError::TileUnavailable {
                path: filename.into(),
                reason: "no such raster".to_string(),
            })
    }
}
