use anyhow::{Context, Result};
use hypso::Quadrant;
use std::fs;

use super::common::{format_size, EngineOptions};

pub fn run(options: &EngineOptions) -> Result<()> {
    let dir = options.data_dir()?;
    if !dir.exists() {
        anyhow::bail!("Data directory does not exist: {}", dir.display());
    }

    let engine = options.build()?;
    let index = engine.index();

    println!(
        "{:<10} {:<22} {:>10} {:>12}  {}",
        "QUAD", "FILE", "SIZE", "PIXELS", "COVERAGE"
    );
    println!("{}", "-".repeat(96));

    let mut present = 0;
    let mut total_size: u64 = 0;
    for quadrant in Quadrant::ALL {
        let filename = index.filename(quadrant);
        let region = index.region(quadrant);
        let size = fs::metadata(dir.join(&filename)).map(|m| m.len()).ok();

        let pixels = match size {
            Some(bytes) => {
                present += 1;
                total_size += bytes;
                match engine.tile(quadrant) {
                    Ok(tile) => format!("{}x{}", tile.width(), tile.height()),
                    Err(_) => "unreadable".to_string(),
                }
            }
            None => "missing".to_string(),
        };

        println!(
            "{:<10} {:<22} {:>10} {:>12}  {}",
            quadrant.name(),
            filename,
            size.map(format_size).unwrap_or_else(|| "-".to_string()),
            pixels,
            region
        );
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Tiles present: {}/{}", present, Quadrant::ALL.len());
    println!("  Total size: {}", format_size(total_size));
    println!(
        "  Data directory: {}",
        fs::canonicalize(dir)
            .context("Failed to resolve data directory")?
            .display()
    );

    Ok(())
}
