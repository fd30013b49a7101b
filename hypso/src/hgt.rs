//! SRTM `.hgt` raster backend.
//!
//! An `.hgt` file is a square grid of 16-bit big-endian signed samples, north
//! row first. The grid size is detected from the file length.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{ElevationError, Result};
use crate::raster::{PixelWindow, RasterSource};

/// File size for SRTM1 (1 arc-second, ~30m resolution): 3601 × 3601 × 2 bytes
const SRTM1_SIZE: usize = 3601 * 3601 * 2;

/// File size for SRTM3 (3 arc-second, ~90m resolution): 1201 × 1201 × 2 bytes
const SRTM3_SIZE: usize = 1201 * 1201 * 2;

const SRTM1_SAMPLES: u32 = 3601;
const SRTM3_SAMPLES: u32 = 1201;

/// Value indicating no data (void) in SRTM files
pub const VOID_VALUE: i16 = -32768;

/// Resolution type of an SRTM grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtmResolution {
    /// SRTM1: 1 arc-second (~30m) resolution
    Srtm1,
    /// SRTM3: 3 arc-second (~90m) resolution
    Srtm3,
}

impl SrtmResolution {
    /// Returns the number of samples per row/column for this resolution.
    pub fn samples(&self) -> u32 {
        match self {
            SrtmResolution::Srtm1 => SRTM1_SAMPLES,
            SrtmResolution::Srtm3 => SRTM3_SAMPLES,
        }
    }

    /// Returns the approximate resolution in meters.
    pub fn meters(&self) -> f64 {
        match self {
            SrtmResolution::Srtm1 => 30.0,
            SrtmResolution::Srtm3 => 90.0,
        }
    }
}

/// A memory-mapped `.hgt` grid.
pub struct HgtRaster {
    data: Mmap,
    samples: u32,
    resolution: SrtmResolution,
}

impl HgtRaster {
    /// Map an `.hgt` file.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::TileUnavailable`] if the file cannot be
    /// opened or its size matches neither SRTM1 nor SRTM3.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let unavailable = |reason: String| ElevationError::TileUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| unavailable(e.to_string()))?;

        let (samples, resolution) = match mmap.len() {
            SRTM1_SIZE => (SRTM1_SAMPLES, SrtmResolution::Srtm1),
            SRTM3_SIZE => (SRTM3_SAMPLES, SrtmResolution::Srtm3),
            size => {
                return Err(unavailable(format!(
                    "invalid .hgt size {size} bytes (expected {SRTM1_SIZE} or {SRTM3_SIZE})"
                )))
            }
        };

        Ok(Self {
            data: mmap,
            samples,
            resolution,
        })
    }

    /// Returns the resolution of this grid.
    pub fn resolution(&self) -> SrtmResolution {
        self.resolution
    }

    fn sample_at(&self, row: u32, col: u32) -> i16 {
        // 2 bytes per sample, row-major
        let offset = (row as usize * self.samples as usize + col as usize) * 2;
        i16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }
}

impl RasterSource for HgtRaster {
    fn width(&self) -> u32 {
        self.samples
    }

    fn height(&self) -> u32 {
        self.samples
    }

    fn nodata(&self) -> Option<f64> {
        Some(f64::from(VOID_VALUE))
    }

    fn read_window(&self, window: PixelWindow) -> Result<Vec<f64>> {
        window.check_within(self.samples, self.samples)?;

        let mut out = Vec::with_capacity(window.len());
        for row in window.y..window.y + window.height {
            for col in window.x..window.x + window.width {
                out.push(f64::from(self.sample_at(row, col)));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Create a test SRTM3 file with known elevation values
    fn create_test_srtm3_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let mut data = vec![0u8; SRTM3_SIZE];
        let samples = SRTM3_SAMPLES as usize;

        // Row 0, Col 0 (northwest corner) = 1000m
        data[0..2].copy_from_slice(&1000i16.to_be_bytes());

        // Row 600, Col 600 (center) = 500m
        let center = (600 * samples + 600) * 2;
        data[center..center + 2].copy_from_slice(&500i16.to_be_bytes());

        // Row 600, Col 601 = void
        let void = (600 * samples + 601) * 2;
        data[void..void + 2].copy_from_slice(&VOID_VALUE.to_be_bytes());

        // Row 1200, Col 1200 (southeast corner) = -12m
        let se = (1200 * samples + 1200) * 2;
        data[se..se + 2].copy_from_slice(&(-12i16).to_be_bytes());

        file.write_all(&data).unwrap();
        file
    }

    #[test]
    fn test_load_srtm3_file() {
        let file = create_test_srtm3_file();
        let raster = HgtRaster::open(file.path()).unwrap();

        assert_eq!(raster.resolution(), SrtmResolution::Srtm3);
        assert_eq!(raster.width(), 1201);
        assert_eq!(raster.height(), 1201);
        assert_eq!(raster.nodata(), Some(-32768.0));
    }

    #[test]
    fn test_invalid_file_size() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 1000]).unwrap();

        match HgtRaster::open(file.path()) {
            Err(ElevationError::TileUnavailable { reason, .. }) => {
                assert!(reason.contains("1000"));
            }
            Err(e) => panic!("Expected TileUnavailable, got {e}"),
            Ok(_) => panic!("Expected TileUnavailable error"),
        }
    }

    #[test]
    fn test_read_window_values() {
        let file = create_test_srtm3_file();
        let raster = HgtRaster::open(file.path()).unwrap();

        let nw = raster.read_window(PixelWindow::new(0, 0, 2, 1)).unwrap();
        assert_eq!(nw, vec![1000.0, 0.0]);

        let center = raster.read_window(PixelWindow::new(600, 600, 2, 1)).unwrap();
        assert_eq!(center, vec![500.0, -32768.0]);

        let se = raster
            .read_window(PixelWindow::new(1199, 1199, 2, 2))
            .unwrap();
        assert_eq!(se, vec![0.0, 0.0, 0.0, -12.0]);
    }

    #[test]
    fn test_read_window_out_of_range() {
        let file = create_test_srtm3_file();
        let raster = HgtRaster::open(file.path()).unwrap();
        assert!(raster
            .read_window(PixelWindow::new(1200, 0, 2, 1))
            .is_err());
    }

    #[test]
    fn test_resolution_info() {
        assert_eq!(SrtmResolution::Srtm1.samples(), 3601);
        assert_eq!(SrtmResolution::Srtm3.samples(), 1201);
        assert_eq!(SrtmResolution::Srtm1.meters(), 30.0);
        assert_eq!(SrtmResolution::Srtm3.meters(), 90.0);
    }
}
