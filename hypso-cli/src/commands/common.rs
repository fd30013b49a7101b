use anyhow::{Context, Result};
use hypso::{ElevationEngine, ElevationEngineBuilder};
use std::path::{Path, PathBuf};

/// Engine settings shared by every raster command.
pub struct EngineOptions {
    pub data_dir: Option<PathBuf>,
    pub chunk_size: u32,
    pub chunk_capacity: usize,
    pub nodata_threshold: f64,
}

impl EngineOptions {
    pub fn data_dir(&self) -> Result<&Path> {
        self.data_dir.as_deref().context(
            "HYPSO_DATA_DIR environment variable not set. Use --data-dir or set HYPSO_DATA_DIR",
        )
    }

    pub fn build(&self) -> Result<ElevationEngine> {
        ElevationEngineBuilder::new(self.data_dir()?)
            .chunk_size(self.chunk_size)
            .chunk_capacity(self.chunk_capacity)
            .nodata_threshold(self.nodata_threshold)
            .build()
            .context("Failed to create elevation engine")
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Elevation cell text: the value, or `void` when unknown.
pub fn format_elevation(elevation: Option<f64>) -> String {
    elevation
        .map(|e| format!("{:.2}", e))
        .unwrap_or_else(|| "void".to_string())
}
