use anyhow::{Context, Result};
use hypso::GeoPoint;

use super::common::{format_elevation, EngineOptions};

pub fn run(
    options: &EngineOptions,
    from: (f64, f64),
    to: (f64, f64),
    points: usize,
    json: bool,
) -> Result<()> {
    let engine = options.build()?;
    let start = GeoPoint::new(from.0, from.1);
    let end = GeoPoint::new(to.0, to.1);

    let profile = engine
        .profile(start, end, points)
        .context("Failed to sample profile")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    println!(
        "{:>10} {:>11} {:>12} {:>10}",
        "DIST_KM", "LAT", "LON", "ELEV_M"
    );
    println!("{}", "-".repeat(46));
    for point in &profile.points {
        println!(
            "{:>10.3} {:>11.6} {:>12.6} {:>10}",
            point.distance / 1000.0,
            point.lat,
            point.lon,
            format_elevation(point.elevation)
        );
    }

    let known = profile.points.iter().filter(|p| p.elevation.is_some()).count();
    println!();
    println!("Total distance: {:.3} km", profile.total_distance / 1000.0);
    println!("Samples: {} ({} with data)", profile.points.len(), known);
    if let (Some(min), Some(max)) = (profile.min_elevation(), profile.max_elevation()) {
        println!("Min elevation: {:.2}m", min);
        println!("Max elevation: {:.2}m", max);
    }

    Ok(())
}
