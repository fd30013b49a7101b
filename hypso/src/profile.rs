//! Elevation profiles along a straight path.
//!
//! A profile samples evenly spaced points between two endpoints (both
//! included) and reports each point's elevation and its distance from the
//! start, measured along the great circle between the endpoints.

use serde::{Deserialize, Serialize};

use crate::engine::ElevationEngine;
use crate::error::{ElevationError, Result};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default number of samples in a profile.
pub const DEFAULT_PROFILE_POINTS: usize = 100;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One sample of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfilePoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    /// Meters from the start of the path.
    pub distance: f64,
}

/// A sampled elevation profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub start: GeoPoint,
    pub end: GeoPoint,
    /// Great-circle distance between the endpoints in meters.
    pub total_distance: f64,
    pub points: Vec<ProfilePoint>,
}

impl Profile {
    /// Highest known elevation along the profile.
    pub fn max_elevation(&self) -> Option<f64> {
        self.points
            .iter()
            .filter_map(|p| p.elevation)
            .reduce(f64::max)
    }

    /// Lowest known elevation along the profile.
    pub fn min_elevation(&self) -> Option<f64> {
        self.points
            .iter()
            .filter_map(|p| p.elevation)
            .reduce(f64::min)
    }
}

/// Haversine distance between two points in meters.
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// `num_points` evenly spaced points from `start` to `end`, inclusive.
///
/// # Errors
///
/// Returns [`ElevationError::InvalidArgument`] if `num_points < 2`.
pub fn sample_path(start: GeoPoint, end: GeoPoint, num_points: usize) -> Result<Vec<GeoPoint>> {
    if num_points < 2 {
        return Err(ElevationError::InvalidArgument(format!(
            "a profile needs at least 2 points, got {num_points}"
        )));
    }

    let last = (num_points - 1) as f64;
    Ok((0..num_points)
        .map(|i| {
            let fraction = i as f64 / last;
            GeoPoint {
                lat: start.lat + (end.lat - start.lat) * fraction,
                lon: start.lon + (end.lon - start.lon) * fraction,
            }
        })
        .collect())
}

impl ElevationEngine {
    /// Sample an elevation profile from `start` to `end`.
    ///
    /// Points without a known elevation are kept with `elevation: None`.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if `num_points < 2`.
    pub fn profile(&self, start: GeoPoint, end: GeoPoint, num_points: usize) -> Result<Profile> {
        let path = sample_path(start, end, num_points)?;
        let total_distance = haversine_distance(start, end);
        let step = total_distance / (num_points - 1) as f64;

        let points = path
            .into_iter()
            .enumerate()
            .map(|(i, p)| ProfilePoint {
                lat: p.lat,
                lon: p.lon,
                elevation: self.query_elevation(p.lat, p.lon),
                distance: step * i as f64,
            })
            .collect();

        Ok(Profile {
            start,
            end,
            total_distance,
            points,
        })
    }
}
