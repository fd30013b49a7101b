//! GeoTIFF raster backend.
//!
//! Only the TIFF strips or tiles that intersect a requested window are
//! decoded, so a 256×256 chunk of a multi-gigabyte quadrant costs a handful
//! of strip reads rather than the whole image. The first band is used.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::Result;
use crate::raster::{PixelWindow, RasterSource};

/// GDAL_NODATA private tag, stored as an ASCII string.
const GDAL_NODATA_TAG: u16 = 42113;

/// Planar configuration value for band-separate storage.
const PLANAR_SEPARATE: u32 = 2;

/// A GeoTIFF opened for windowed reads.
pub struct GeoTiffRaster {
    decoder: Mutex<Decoder<BufReader<File>>>,
    width: u32,
    height: u32,
    chunk_width: u32,
    chunk_height: u32,
    chunks_across: u32,
    samples_per_pixel: usize,
    nodata: Option<f64>,
}

impl GeoTiffRaster {
    /// Open a GeoTIFF and read its layout. Pixel data is not decoded here.
    ///
    /// # Errors
    ///
    /// Returns an I/O or TIFF error if the file cannot be opened or its header
    /// is not a decodable TIFF.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        // Quadrant DEMs are large; lift the default decoding limits.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunks_across = width.div_ceil(chunk_width.max(1));

        let samples_per_pixel = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1);
        let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1);
        let samples_per_pixel = if planar == PLANAR_SEPARATE {
            1
        } else {
            samples_per_pixel.max(1) as usize
        };

        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA_TAG))
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

        tracing::debug!(
            path = %path.as_ref().display(),
            width,
            height,
            chunk_width,
            chunk_height,
            samples_per_pixel,
            ?nodata,
            "opened GeoTIFF"
        );

        Ok(Self {
            decoder: Mutex::new(decoder),
            width,
            height,
            chunk_width: chunk_width.max(1),
            chunk_height: chunk_height.max(1),
            chunks_across,
            samples_per_pixel,
            nodata,
        })
    }

    /// Internal TIFF strip/tile dimensions.
    pub fn storage_chunk_dimensions(&self) -> (u32, u32) {
        (self.chunk_width, self.chunk_height)
    }
}

impl RasterSource for GeoTiffRaster {
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

        let out_width = window.width as usize;
        let mut out = vec![0.0f64; window.len()];

        let right = window.x + window.width;
        let bottom = window.y + window.height;
        let first_cx = window.x / self.chunk_width;
        let last_cx = (right - 1) / self.chunk_width;
        let first_cy = window.y / self.chunk_height;
        let last_cy = (bottom - 1) / self.chunk_height;

        let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);

        for cy in first_cy..=last_cy {
            for cx in first_cx..=last_cx {
                let index = cy * self.chunks_across + cx;
                let (data_width, data_height) = decoder.chunk_data_dimensions(index);
                let samples = decode_samples(decoder.read_chunk(index)?);

                let chunk_x0 = cx * self.chunk_width;
                let chunk_y0 = cy * self.chunk_height;

                // Overlap of this storage chunk with the requested window.
                let x0 = window.x.max(chunk_x0);
                let x1 = right.min(chunk_x0 + data_width);
                let y0 = window.y.max(chunk_y0);
                let y1 = bottom.min(chunk_y0 + data_height);

                let row_stride = data_width as usize * self.samples_per_pixel;
                for y in y0..y1 {
                    let src_row = (y - chunk_y0) as usize * row_stride;
                    let dst_row = (y - window.y) as usize * out_width;
                    for x in x0..x1 {
                        let src = src_row + (x - chunk_x0) as usize * self.samples_per_pixel;
                        out[dst_row + (x - window.x) as usize] =
                            samples.get(src).copied().unwrap_or(f64::NAN);
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Widen any TIFF sample type to `f64`. 64-bit integers beyond 2^53 lose
/// precision; every other type converts exactly.
fn decode_samples(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::F64(data) => data,
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
    }
}
