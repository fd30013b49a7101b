use anyhow::{Context, Result};
use hypso::PixelLocation;
use serde::Serialize;

use super::common::{format_elevation, EngineOptions};

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pixel: Option<PixelLocation>,
}

pub fn run(options: &EngineOptions, lat: f64, lon: f64, json: bool) -> Result<()> {
    let engine = options.build()?;

    let elevation = engine
        .try_query(lat, lon)
        .with_context(|| format!("Failed to get elevation at ({lat}, {lon})"))?;

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
            pixel: engine.pixel_for(lat, lon).ok(),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("{}", format_elevation(elevation));
    }

    Ok(())
}
