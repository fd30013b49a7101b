//! Basic example demonstrating hypso library usage.
//!
//! Run with: cargo run --example basic -- /path/to/nm_dem/tiles

use hypso::{ElevationEngine, ElevationError, GeoPoint};
use std::env;

fn main() -> Result<(), ElevationError> {
    // Get data directory from command line
    let data_dir = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/nm_dem/tiles");
        std::process::exit(1);
    });

    let engine = ElevationEngine::builder(&data_dir).build()?;

    let locations = [
        ("Albuquerque", 35.0844, -106.6504),
        ("Santa Fe", 35.6870, -105.9378),
        ("Wheeler Peak", 36.5568, -105.4169),
        ("Las Cruces", 32.3199, -106.7637),
        ("Denver (outside coverage)", 39.7392, -104.9903),
    ];

    println!("Elevation queries:");
    println!("{:-<50}", "");

    for (name, lat, lon) in &locations {
        match engine.try_query(*lat, *lon) {
            Ok(Some(elevation)) => println!("{name}: {elevation:.1}m"),
            Ok(None) => println!("{name}: no data"),
            Err(ElevationError::TileUnavailable { path, .. }) => {
                println!("{name}: tile {} not available locally", path.display());
            }
            Err(e) => println!("{name}: {e}"),
        }
    }

    let profile = engine.profile(
        GeoPoint::new(35.0844, -106.6504),
        GeoPoint::new(35.6870, -105.9378),
        50,
    )?;
    println!(
        "\nAlbuquerque -> Santa Fe: {:.1} km, max {:?} m, min {:?} m",
        profile.total_distance / 1000.0,
        profile.max_elevation(),
        profile.min_elevation()
    );

    // Show cache statistics
    let tiles = engine.tile_stats();
    let chunks = engine.chunk_stats();
    println!("\nCache statistics:");
    println!("  Open tiles: {}", tiles.entry_count);
    println!("  Cached chunks: {}", chunks.entry_count);
    println!("  Chunk hit rate: {:.1}%", chunks.hit_rate() * 100.0);

    Ok(())
}
