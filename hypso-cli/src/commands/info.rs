use anyhow::{Context, Result};
use hypso::{ElevationEngine, PixelWindow, Quadrant, TileInfo};

use super::common::EngineOptions;

pub fn run(
    options: &EngineOptions,
    quadrant: Option<String>,
    point: Option<(f64, f64)>,
    stats: bool,
) -> Result<()> {
    let engine = options.build()?;

    let quadrants: Vec<Quadrant> = match (quadrant, point) {
        (Some(name), _) => vec![name
            .parse()
            .with_context(|| format!("Unknown quadrant: {name}"))?],
        (None, Some((lat, lon))) => vec![engine
            .index()
            .locate_tile(lat, lon)
            .context("No tile covers this point")?],
        (None, None) => Quadrant::ALL.to_vec(),
    };

    for (i, quadrant) in quadrants.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        let info = match engine.tile_info(quadrant) {
            Ok(info) => info,
            Err(e) => {
                println!("Tile: {} ({})", engine.index().filename(quadrant), quadrant);
                println!("Unavailable: {e}");
                continue;
            }
        };
        print_info(&info);

        if stats {
            let summary = scan(&engine, quadrant)?;
            if let (Some(min), Some(max)) = (summary.min, summary.max) {
                println!("Min elevation: {:.2}m", min);
                println!("Max elevation: {:.2}m", max);
            }
            if summary.void > 0 {
                let void_pct = summary.void as f64 / summary.total as f64 * 100.0;
                println!("No-data samples: {} ({:.1}%)", summary.void, void_pct);
            }
        }
    }

    Ok(())
}

fn print_info(info: &TileInfo) {
    println!("Tile: {} ({})", info.filename, info.quadrant);
    println!(
        "Coverage: lat {} to {}, lon {} to {}",
        info.south, info.north, info.west, info.east
    );
    println!("Size: {}x{} pixels", info.width, info.height);
    println!(
        "Chunks: {}x{} ({} total)",
        info.chunks_across,
        info.chunks_down,
        u64::from(info.chunks_across) * u64::from(info.chunks_down)
    );
    let lon_step = (info.east - info.west) / f64::from(info.width);
    let lat_step = (info.north - info.south) / f64::from(info.height);
    println!("Pixel size: {:.6}° x {:.6}°", lon_step, lat_step);
}

#[derive(Debug, Default, PartialEq)]
struct ScanSummary {
    min: Option<f64>,
    max: Option<f64>,
    void: u64,
    total: u64,
}

/// Read the tile one chunk row at a time and classify every sample.
fn scan(engine: &ElevationEngine, quadrant: Quadrant) -> Result<ScanSummary> {
    let tile = engine.tile(quadrant)?;
    let raster = tile.raster();
    let nodata = raster.nodata();
    let band = engine.chunk_cache().chunk_size();

    let mut summary = ScanSummary::default();
    let mut y = 0;
    while y < tile.height() {
        let height = band.min(tile.height() - y);
        let samples = raster
            .read_window(PixelWindow::new(0, y, tile.width(), height))
            .with_context(|| format!("Failed to read rows {y}..{}", y + height))?;

        for sample in samples {
            summary.total += 1;
            match engine.classify(sample, nodata) {
                Some(elevation) => {
                    summary.min = Some(summary.min.map_or(elevation, |m| m.min(elevation)));
                    summary.max = Some(summary.max.map_or(elevation, |m| m.max(elevation)));
                }
                None => summary.void += 1,
            }
        }
        y += height;
    }

    Ok(summary)
}
